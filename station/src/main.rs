//! Teamfunk Station – Einstiegspunkt
//!
//! Laedt die Konfiguration, initialisiert das Logging und startet die
//! Station.

use anyhow::Result;
use teamfunk_station::{config::StationKonfig, Station};

#[tokio::main]
async fn main() -> Result<()> {
    // Konfigurationsdatei-Pfad aus Umgebungsvariable oder Standard
    let konfig_pfad =
        std::env::var("TEAMFUNK_CONFIG").unwrap_or_else(|_| "teamfunk.toml".into());

    // Konfiguration laden (Standardwerte falls Datei fehlt)
    let konfig = StationKonfig::laden(&konfig_pfad)?;

    // Logging initialisieren
    logging_initialisieren(&konfig.logging.level, &konfig.logging.format);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        konfig = %konfig_pfad,
        "Teamfunk Station wird initialisiert"
    );

    // Station starten
    let station = Station::neu(konfig);
    station.starten().await?;

    Ok(())
}

/// Initialisiert tracing-subscriber mit dem konfigurierten Level und Format
///
/// `TF_LOG_LEVEL` und `TF_LOG_FORMAT` aus der Umgebung haben Vorrang vor
/// der Konfigurationsdatei.
fn logging_initialisieren(level: &str, format: &str) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_env("TF_LOG_LEVEL")
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let format = std::env::var("TF_LOG_FORMAT").unwrap_or_else(|_| format.to_string());

    match format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt().with_env_filter(filter).with_target(true).init();
        }
    }
}
