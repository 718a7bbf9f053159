//! Identifikationstypen fuer Teamfunk
//!
//! Alle IDs verwenden das Newtype-Pattern um Verwechslungen zwischen
//! verschiedenen ID-Arten zur Compilezeit auszuschliessen. Die Groessen
//! sind durch das Funk-Protokoll fest vorgegeben (8 Byte Team-ID,
//! 4 Byte Mitglieds-ID) und werden unveraendert auf die Leitung gelegt.

use serde::{Deserialize, Serialize};

/// Opake 8-Byte Team-Kennung
///
/// Wird bei der Team-Erstellung zufaellig erzeugt und danach nie mehr
/// geaendert. Zwei Teams mit gleicher Kennung gelten als dasselbe Team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct TeamId(pub [u8; 8]);

impl TeamId {
    pub const LAENGE: usize = 8;

    /// Erstellt eine TeamId aus rohen Bytes
    pub fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Gibt die rohen Bytes zurueck
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl std::fmt::Display for TeamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "team:")?;
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Eindeutige 4-Byte Mitglieds-ID (Funk-Knoten-Kennung)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct MemberId(pub u32);

impl MemberId {
    /// Broadcast-Adresse – erreicht alle Knoten im Funknetz
    pub const BROADCAST: MemberId = MemberId(0xFFFF_FFFF);

    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Gibt den inneren Wert zurueck
    pub fn inner(&self) -> u32 {
        self.0
    }

    /// Prueft ob dies die Broadcast-Adresse ist
    pub fn ist_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl std::fmt::Display for MemberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "mitglied:{:08x}", self.0)
    }
}

/// Pre-Shared-Key Material wie es auf der Leitung transportiert wird
///
/// Maximal 16 Bytes mit expliziter Laenge. Aus dem PSK werden die
/// eigentlichen Kanal-Schluessel per Key-Derivation abgeleitet; der PSK
/// selbst verlaesst das Geraet nur innerhalb verschluesselter
/// Key-Distribution-Nachrichten oder des Pairing-Handshakes.
#[derive(Clone, PartialEq, Eq)]
pub struct Psk {
    laenge: u8,
    bytes: [u8; Self::KAPAZITAET],
}

impl Psk {
    /// Feste Puffer-Kapazitaet in Bytes
    pub const KAPAZITAET: usize = 16;

    /// Erstellt einen PSK aus einem Slice
    ///
    /// Gibt `None` zurueck wenn der Slice laenger als die Kapazitaet ist.
    /// Es wird nie stillschweigend abgeschnitten.
    pub fn aus_slice(daten: &[u8]) -> Option<Self> {
        if daten.len() > Self::KAPAZITAET {
            return None;
        }
        let mut bytes = [0u8; Self::KAPAZITAET];
        bytes[..daten.len()].copy_from_slice(daten);
        Some(Self {
            laenge: daten.len() as u8,
            bytes,
        })
    }

    /// Gibt das Schluesselmaterial zurueck
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes[..self.laenge as usize]
    }

    /// Anzahl der belegten Bytes
    pub fn laenge(&self) -> usize {
        self.laenge as usize
    }

    pub fn is_empty(&self) -> bool {
        self.laenge == 0
    }
}

impl Default for Psk {
    /// Leerer PSK (kein Material)
    fn default() -> Self {
        Self {
            laenge: 0,
            bytes: [0u8; Self::KAPAZITAET],
        }
    }
}

impl Drop for Psk {
    fn drop(&mut self) {
        self.bytes.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for Psk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Psk([REDACTED] {} bytes)", self.laenge)
    }
}

/// Kontext der an jedes dekodierte Ereignis angehaengt wird
///
/// Die Empfangsschicht fuellt diese Felder bevor das Ereignis an die
/// Senke weitergereicht wird. Der Zeitstempel stammt aus der Poll-Schleife
/// (Unix-ms), nicht aus dem Protokoll-Kern selbst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContext {
    /// Team aus dem Umschlag
    pub team_id: TeamId,
    /// Epoch aus dem Umschlag
    pub epoch: u32,
    /// Absender-Knoten
    pub from: MemberId,
    /// Empfangszeitpunkt (Unix-ms)
    pub timestamp_ms: u64,
}

impl EventContext {
    pub fn new(team_id: TeamId, epoch: u32, from: MemberId, timestamp_ms: u64) -> Self {
        Self {
            team_id,
            epoch,
            from,
            timestamp_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn team_id_display_hex() {
        let id = TeamId([0xAB, 0xCD, 0, 0, 0, 0, 0, 0x01]);
        assert_eq!(id.to_string(), "team:abcd000000000001");
    }

    #[test]
    fn member_id_display() {
        let id = MemberId(0xDEADBEEF);
        assert_eq!(id.to_string(), "mitglied:deadbeef");
    }

    #[test]
    fn broadcast_erkennung() {
        assert!(MemberId::BROADCAST.ist_broadcast());
        assert!(!MemberId(42).ist_broadcast());
    }

    #[test]
    fn ids_sind_serde_kompatibel() {
        let id = TeamId([1, 2, 3, 4, 5, 6, 7, 8]);
        let json = serde_json::to_string(&id).unwrap();
        let id2: TeamId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, id2);
    }

    #[test]
    fn psk_aus_slice_mit_laenge() {
        let psk = Psk::aus_slice(&[1, 2, 3]).unwrap();
        assert_eq!(psk.laenge(), 3);
        assert_eq!(psk.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn psk_zu_lang_wird_abgelehnt() {
        assert!(Psk::aus_slice(&[0u8; 17]).is_none());
    }

    #[test]
    fn psk_debug_redacted() {
        let psk = Psk::aus_slice(&[0xAA; 16]).unwrap();
        let debug = format!("{:?}", psk);
        assert!(!debug.contains("aa"), "Schluesselmaterial darf nicht im Debug-Output landen");
    }

    #[test]
    fn event_context_roundtrip() {
        let ctx = EventContext::new(TeamId([9; 8]), 3, MemberId(7), 1234);
        let json = serde_json::to_string(&ctx).unwrap();
        let ctx2: EventContext = serde_json::from_str(&json).unwrap();
        assert_eq!(ctx, ctx2);
    }
}
