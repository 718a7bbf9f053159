//! Mesh-Transport-Schnittstelle
//!
//! Der Kern fasst die Funk-Hardware nie direkt an; er sieht nur diese
//! Schnittstelle. Senden blockiert nie: ist die Sende-Queue voll, kommt
//! sofort `false` zurueck und der Aufrufer entscheidet.

use teamfunk_core::MemberId;

/// Ziel eines ausgehenden Mesh-Pakets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeshZiel {
    /// An alle Knoten im Funknetz
    Broadcast,
    /// An einen bestimmten Knoten
    Knoten(MemberId),
}

/// Ein eingegangenes Mesh-Paket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeshEingang {
    /// Anwendungs-Portnummer des Mesh-Framings
    pub portnum: u16,
    /// Absender-Knoten
    pub from: MemberId,
    /// Roher logischer Kanal (siehe `TeamChannel::from_u8`)
    pub kanal: u8,
    /// Nutzlast (der verschluesselte Umschlag)
    pub payload: Vec<u8>,
}

/// Schnittstelle zum Funk-Transport
pub trait MeshTransport {
    /// Reiht ein Paket zum Senden ein
    ///
    /// Gibt `false` zurueck wenn der Transport das Paket nicht annimmt
    /// (Queue voll, Funk aus). Blockiert und wiederholt nie.
    fn senden(
        &mut self,
        kanal: u8,
        portnum: u16,
        daten: &[u8],
        ziel: MeshZiel,
        want_ack: bool,
    ) -> bool;

    /// Holt nicht-blockierend das naechste eingegangene Paket ab
    fn poll_eingang(&mut self) -> Option<MeshEingang>;
}
