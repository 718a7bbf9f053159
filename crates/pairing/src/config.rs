//! Zeitparameter des Pairing-Handshakes

use serde::{Deserialize, Serialize};

/// Zeitparameter fuer Leader und Mitglied
///
/// Alle Zeiten in Millisekunden; die Zustandsmaschinen bekommen die
/// aktuelle Zeit explizit uebergeben und lesen selbst keine Uhr.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingKonfig {
    /// Abstand zwischen zwei Beacons des Leaders
    pub beacon_intervall_ms: u64,
    /// Beitritts-Fenster des Leaders
    pub fenster_ms: u64,
    /// Wie lange ein Mitglied nach Beacons sucht
    pub scan_frist_ms: u64,
    /// Kurze Haltezeit zwischen Join-Versand und Warten auf den Key
    pub halte_ms: u64,
    /// Abstand zwischen zwei Join-Wiederholungen
    pub versuch_intervall_ms: u64,
    /// Maximale Join-Sendungen inkl. Erstversand
    pub max_versuche: u8,
    /// Absolute Frist des Mitglieds ab Join-Versand
    pub antwort_frist_ms: u64,
}

impl Default for PairingKonfig {
    fn default() -> Self {
        Self {
            beacon_intervall_ms: 1_000,
            fenster_ms: 60_000,
            scan_frist_ms: 30_000,
            halte_ms: 500,
            versuch_intervall_ms: 2_000,
            max_versuche: 5,
            antwort_frist_ms: 15_000,
        }
    }
}
