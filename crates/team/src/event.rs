//! Team-Ereignisse und die Ereignis-Senke
//!
//! Pro dekodiertem Domaenen-Ereignis ruft der Dienst die Senke genau
//! einmal auf. Was die Senke damit macht (Anzeige, Persistenz, Logging)
//! ist ihr ueberlassen – der Kern nimmt dazu nichts an.

use serde::{Deserialize, Serialize};
use teamfunk_core::{EventContext, MemberId};
use teamfunk_protocol::message::{
    Advertise, JoinConfirm, JoinDecision, JoinRequest, Kick, Status, TransferLeader,
};
use teamfunk_protocol::TeamChannel;

/// Empfangs-Fehlklassen die an die Senke gemeldet werden
///
/// Rein strukturell kaputte Bytes werden still verworfen; alles andere
/// wird mit Team/Epoch/Kanal-Kontext gemeldet, denn wiederholte
/// `Entschluesselung`/`SchluesselMismatch`-Fehler sind das einzige
/// Signal fuer einen Widerruf – eine explizite Widerrufs-Nachricht gibt
/// es bewusst nicht.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiveFailure {
    /// Umschlag- oder Nachrichten-Version passt nicht
    UnbekannteVersion,
    /// Team-ID oder Epoch passt nicht zum lokalen Vertrauensstand
    SchluesselMismatch,
    /// AEAD-Authentisierung fehlgeschlagen
    Entschluesselung,
}

/// Alle Ereignisse die der Team-Kanal an die Senke meldet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TeamEvent {
    // --- Management ---
    Advertise(Advertise),
    JoinRequest(JoinRequest),
    /// Beitritts-Annahme; das Schluesselmaterial bleibt im Dienst und
    /// taucht nie in einem Ereignis auf
    JoinAccept { epoch: u32, nonce_echo: u64 },
    JoinConfirm(JoinConfirm),
    JoinDecision(JoinDecision),
    Kick(Kick),
    TransferLeader(TransferLeader),
    /// Neues Schluesselmaterial wurde uebernommen
    KeyDist { epoch: u32 },
    Status(Status),

    // --- Anwendungs-Kanaele (entschluesselte Roh-Nutzlast) ---
    Position { daten: Vec<u8> },
    Waypoint { daten: Vec<u8> },
    Track { daten: Vec<u8> },
    Chat { daten: Vec<u8> },

    // --- Lebenszyklus ---
    /// Zustellung von Schluesselmaterial an ein Mitglied aufgegeben
    KeyDistAufgegeben { mitglied: MemberId, epoch: u32 },
    /// Dieses Geraet wurde aus dem Team ausgeschlossen (terminal)
    ZugriffWiderrufen,

    // --- Fehler ---
    Fehler {
        fehler: ReceiveFailure,
        kanal: TeamChannel,
    },
}

/// Senke fuer dekodierte Team-Ereignisse
pub trait TeamEventSink {
    /// Meldet ein Ereignis samt Kontext (Team, Epoch, Absender, Zeit)
    fn melden(&mut self, ctx: &EventContext, ereignis: TeamEvent);
}

/// Senke die Ereignisse in einen Vec sammelt (fuer Tests und die Fassade)
#[derive(Debug, Default)]
pub struct SammelSenke {
    pub ereignisse: Vec<(EventContext, TeamEvent)>,
}

impl SammelSenke {
    pub fn neu() -> Self {
        Self::default()
    }
}

impl TeamEventSink for SammelSenke {
    fn melden(&mut self, ctx: &EventContext, ereignis: TeamEvent) {
        self.ereignisse.push((*ctx, ereignis));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use teamfunk_core::TeamId;

    #[test]
    fn ereignisse_sind_serde_kompatibel() {
        let ereignis = TeamEvent::Fehler {
            fehler: ReceiveFailure::Entschluesselung,
            kanal: TeamChannel::Management,
        };
        let json = serde_json::to_string(&ereignis).unwrap();
        let zurueck: TeamEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(ereignis, zurueck);
    }

    #[test]
    fn sammel_senke_sammelt() {
        let mut senke = SammelSenke::neu();
        let ctx = EventContext::new(TeamId([1; 8]), 1, MemberId(2), 0);
        senke.melden(&ctx, TeamEvent::ZugriffWiderrufen);
        senke.melden(&ctx, TeamEvent::KeyDist { epoch: 2 });
        assert_eq!(senke.ereignisse.len(), 2);
    }
}
