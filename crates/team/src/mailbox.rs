//! Einzelplatz-Briefkasten fuer den Empfangspfad
//!
//! Der Empfangspfad des Transports laeuft unter Umstaenden in einem
//! anderen Ausfuehrungskontext (Interrupt, Worker-Task) als die
//! kooperative Poll-Schleife. Der Briefkasten entkoppelt beide Seiten:
//! ein Slot, kurze kritische Sektion, nicht-blockierendes Abholen.
//! Das ist Message-Passing, kein geteilter veraenderlicher Zustand.

use parking_lot::Mutex;

use crate::transport::MeshEingang;

/// Einzelplatz-Briefkasten, sicher aus zwei Kontexten benutzbar
#[derive(Debug, Default)]
pub struct Mailbox {
    slot: Mutex<Option<MeshEingang>>,
}

impl Mailbox {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Legt ein Paket ein (Empfangs-Kontext)
    ///
    /// Gibt `false` zurueck wenn der Slot noch belegt ist – das Paket
    /// wird dann verworfen. Ein voller Slot heisst: die Poll-Schleife
    /// kommt nicht hinterher, aeltere Daten gewinnen.
    pub fn einlegen(&self, eingang: MeshEingang) -> bool {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return false;
        }
        *slot = Some(eingang);
        true
    }

    /// Holt nicht-blockierend das anliegende Paket ab (Poll-Schleife)
    pub fn abholen(&self) -> Option<MeshEingang> {
        self.slot.lock().take()
    }

    /// Prueft ob ein Paket anliegt ohne es zu entnehmen
    pub fn belegt(&self) -> bool {
        self.slot.lock().is_some()
    }
}
