//! Bootstrap-Transport-Schnittstelle
//!
//! Der Pairing-Handshake braucht nur Best-Effort Broadcast- und
//! Unicast-Datagramme auf einem lokalen Segment. Die Adress-Form ist
//! Sache der Implementierung (UDP-Socket-Adresse, BLE-Handle, ...).

/// Schnittstelle zum Bootstrap-Transport
pub trait BootstrapTransport {
    /// Transport-spezifische Absender/Empfaenger-Adresse
    type Adresse: Clone + PartialEq + std::fmt::Debug;

    /// Sendet ein Datagramm an alle Geraete im Segment
    fn broadcast(&mut self, daten: &[u8]) -> bool;

    /// Sendet ein Datagramm an eine bestimmte Adresse
    fn unicast(&mut self, ziel: &Self::Adresse, daten: &[u8]) -> bool;

    /// Holt nicht-blockierend das naechste eingegangene Datagramm ab
    fn poll(&mut self) -> Option<(Self::Adresse, Vec<u8>)>;
}
