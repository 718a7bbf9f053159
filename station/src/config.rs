//! Stations-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass die Station ohne Konfigurationsdatei
//! lauffaehig ist.

use serde::{Deserialize, Serialize};
use teamfunk_pairing::PairingKonfig;
use teamfunk_team::RotationsKonfig;

/// Vollstaendige Stations-Konfiguration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StationKonfig {
    /// Allgemeine Geraete-Einstellungen
    pub station: StationEinstellungen,
    /// Netzwerk-Einstellungen (UDP-Traeger fuer Mesh und Pairing)
    pub netzwerk: NetzwerkEinstellungen,
    /// Team-Einstellungen (Name, optional vorverteilter PSK)
    pub team: TeamEinstellungen,
    /// Rotations-Richtlinie
    pub rotation: RotationsKonfig,
    /// Pairing-Zeitparameter
    pub pairing: PairingKonfig,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
}

impl StationKonfig {
    /// Laedt die Konfiguration; fehlt die Datei, gelten die Standardwerte
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        match std::fs::read_to_string(pfad) {
            Ok(inhalt) => Ok(toml::from_str(&inhalt)?),
            Err(fehler) if fehler.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(pfad, "Keine Konfigurationsdatei, Standardwerte aktiv");
                Ok(Self::default())
            }
            Err(fehler) => Err(fehler.into()),
        }
    }
}

/// Rolle der Station beim Start
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StationsRolle {
    /// Erstellt ein Team und oeffnet ein Pairing-Fenster
    Leader,
    /// Sucht per Pairing nach einem Team
    #[default]
    Mitglied,
}

/// Allgemeine Geraete-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StationEinstellungen {
    /// Anzeigename der Station
    pub name: String,
    /// Funk-Knoten-Kennung (0 = zufaellig)
    pub member_id: u32,
    /// Rolle beim Start
    pub rolle: StationsRolle,
    /// Poll-Intervall der kooperativen Schleife in Millisekunden
    pub poll_intervall_ms: u64,
    /// Intervall fuer periodische Status-Meldungen in Sekunden
    pub status_intervall_s: u64,
    /// Frisch gepairte Geraete automatisch aufnehmen (Leader)
    pub auto_annehmen: bool,
}

impl Default for StationEinstellungen {
    fn default() -> Self {
        Self {
            name: "Teamfunk Station".into(),
            member_id: 0,
            rolle: StationsRolle::default(),
            poll_intervall_ms: 100,
            status_intervall_s: 30,
            auto_annehmen: true,
        }
    }
}

/// Netzwerk-Einstellungen
///
/// Im Desktop-Betrieb ersetzt ein UDP-Segment den Funk-Traeger: ein Port
/// fuer den Mesh-Verkehr, einer fuer den Pairing-Handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetzwerkEinstellungen {
    /// Bind-Adresse fuer beide UDP-Sockets
    pub bind_adresse: String,
    /// Broadcast-Adresse des lokalen Segments
    pub broadcast_adresse: String,
    /// UDP-Port des Mesh-Traegers
    pub mesh_port: u16,
    /// UDP-Port des Pairing-Handshakes
    pub pairing_port: u16,
}

impl Default for NetzwerkEinstellungen {
    fn default() -> Self {
        Self {
            bind_adresse: "0.0.0.0".into(),
            broadcast_adresse: "255.255.255.255".into(),
            mesh_port: 17404,
            pairing_port: 17405,
        }
    }
}

/// Team-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamEinstellungen {
    /// Anzeigename des Teams (Leader)
    pub name: String,
    /// Vorverteilter PSK (Base64, max. 16 Bytes); ueberspringt das Pairing
    pub psk_base64: Option<String>,
    /// Team-ID als Hex-String (16 Zeichen), nur mit `psk_base64`
    pub team_id_hex: Option<String>,
    /// Epoch des vorverteilten Materials
    pub epoch: u32,
    /// Leader-Kennung des vorverteilten Materials
    pub leader_id: u32,
}

impl Default for TeamEinstellungen {
    fn default() -> Self {
        Self {
            name: "Team".into(),
            psk_base64: None,
            team_id_hex: None,
            epoch: 1,
            leader_id: 0,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level (trace/debug/info/warn/error)
    pub level: String,
    /// Format (text/json)
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_konfiguration_ist_lauffaehig() {
        let konfig = StationKonfig::default();
        assert_eq!(konfig.station.rolle, StationsRolle::Mitglied);
        assert_eq!(konfig.netzwerk.mesh_port, 17404);
        assert!(konfig.team.psk_base64.is_none());
    }

    #[test]
    fn fehlende_datei_ergibt_standardwerte() {
        let konfig = StationKonfig::laden("/nicht/vorhanden/teamfunk.toml").unwrap();
        assert_eq!(konfig.station.poll_intervall_ms, 100);
    }

    #[test]
    fn toml_roundtrip() {
        let konfig = StationKonfig::default();
        let toml_text = toml::to_string(&konfig).unwrap();
        let zurueck: StationKonfig = toml::from_str(&toml_text).unwrap();
        assert_eq!(zurueck.station.name, konfig.station.name);
        assert_eq!(zurueck.netzwerk.pairing_port, konfig.netzwerk.pairing_port);
    }

    #[test]
    fn teil_konfiguration_wird_mit_standardwerten_aufgefuellt() {
        let konfig: StationKonfig = toml::from_str(
            r#"
            [station]
            rolle = "leader"
            member_id = 7
            "#,
        )
        .unwrap();
        assert_eq!(konfig.station.rolle, StationsRolle::Leader);
        assert_eq!(konfig.station.member_id, 7);
        assert_eq!(konfig.netzwerk.mesh_port, 17404);
    }
}
