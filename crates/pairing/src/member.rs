//! Mitglieds-Seite des Pairing-Handshakes
//!
//! `Idle -> Scanning -> JoinSent -> WaitingKey -> Completed | Failed`.
//! Beim ersten passenden Beacon wird die Absender-Adresse gemerkt, eine
//! Zufalls-Nonce erzeugt und ein `Join` per Unicast geschickt. Nach
//! einer kurzen Haltezeit wird der `Join` in festem Intervall und mit
//! begrenzter Versuchszahl wiederholt, bis der `Key` mit dem korrekten
//! Nonce-Echo eintrifft. Jeder nicht-terminale Zustand traegt eine
//! absolute Frist; deren Ablauf fuehrt nach `Failed` und baut die
//! Sitzung ab.

use rand::rngs::OsRng;
use rand::RngCore;
use teamfunk_core::{MemberId, Psk, TeamId};

use crate::config::PairingKonfig;
use crate::transport::BootstrapTransport;
use crate::wire::{Join, PairingMessage};

/// Zustand der Mitglieds-Seite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberZustand {
    Idle,
    /// Lauscht auf Beacons
    Scanning { frist_ms: u64 },
    /// Join ist raus, kurze Haltezeit vor dem Warten
    JoinSent { halte_bis_ms: u64, frist_ms: u64 },
    /// Wartet auf den Key, wiederholt den Join
    WaitingKey {
        frist_ms: u64,
        naechster_versuch_ms: u64,
        versuche: u8,
    },
    /// Terminal: Schluesselmaterial etabliert
    Completed,
    /// Terminal: Frist abgelaufen
    Failed,
}

impl MemberZustand {
    pub fn ist_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Idle)
    }
}

/// Ergebnis eines erfolgreichen Pairings – fuettert den Team-Kanal als
/// "Schluessel etabliert"-Ereignis
#[derive(Debug, Clone)]
pub struct SchluesselEtabliert {
    pub team_id: TeamId,
    pub epoch: u32,
    pub psk: Psk,
    pub leader_id: MemberId,
    pub team_name: String,
}

/// Gemerkter Beacon-Inhalt samt Absender-Adresse
#[derive(Debug, Clone)]
struct GemerkterBeacon<A> {
    adresse: A,
    team_id: TeamId,
    epoch: u32,
    leader_id: MemberId,
    name: String,
}

/// Mitglieds-Zustandsmaschine des Pairing-Handshakes
pub struct MemberPairing<T: BootstrapTransport> {
    konfig: PairingKonfig,
    transport: T,
    eigene_id: MemberId,
    /// Nur Beacons dieses Teams annehmen (None = erstes Team)
    ziel_team: Option<TeamId>,
    zustand: MemberZustand,
    nonce: u64,
    beacon: Option<GemerkterBeacon<T::Adresse>>,
    ergebnis: Option<SchluesselEtabliert>,
}

impl<T: BootstrapTransport> MemberPairing<T> {
    pub fn neu(transport: T, konfig: PairingKonfig, eigene_id: MemberId) -> Self {
        Self {
            konfig,
            transport,
            eigene_id,
            ziel_team: None,
            zustand: MemberZustand::Idle,
            nonce: 0,
            beacon: None,
            ergebnis: None,
        }
    }

    pub fn zustand(&self) -> MemberZustand {
        self.zustand
    }

    /// Entnimmt das etablierte Schluesselmaterial (einmalig)
    pub fn abschluss(&mut self) -> Option<SchluesselEtabliert> {
        self.ergebnis.take()
    }

    /// Beginnt nach Beacons zu suchen
    pub fn starten(&mut self, ziel_team: Option<TeamId>, jetzt_ms: u64) {
        tracing::info!(?ziel_team, "Pairing-Suche gestartet");
        self.ziel_team = ziel_team;
        self.beacon = None;
        self.ergebnis = None;
        self.zustand = MemberZustand::Scanning {
            frist_ms: jetzt_ms + self.konfig.scan_frist_ms,
        };
    }

    /// Bricht das Pairing ab – aus jedem Zustand sicher aufrufbar
    pub fn stop(&mut self) {
        if !self.zustand.ist_terminal() {
            tracing::info!("Pairing abgebrochen");
        }
        self.zustand = MemberZustand::Idle;
        self.beacon = None;
    }

    /// Ein Durchlauf der kooperativen Schleife
    pub fn update(&mut self, jetzt_ms: u64) {
        if self.zustand.ist_terminal() {
            return;
        }

        // Erst eingehende Datagramme, dann Fristen
        while let Some((absender, daten)) = self.transport.poll() {
            self.verarbeite_datagramm(absender, &daten, jetzt_ms);
            if self.zustand.ist_terminal() {
                return;
            }
        }

        match self.zustand {
            MemberZustand::Scanning { frist_ms } => {
                if jetzt_ms >= frist_ms {
                    self.fehlschlag("kein Beacon gefunden");
                }
            }
            MemberZustand::JoinSent {
                halte_bis_ms,
                frist_ms,
            } => {
                if jetzt_ms >= frist_ms {
                    self.fehlschlag("kein Key erhalten");
                } else if jetzt_ms >= halte_bis_ms {
                    self.zustand = MemberZustand::WaitingKey {
                        frist_ms,
                        naechster_versuch_ms: jetzt_ms + self.konfig.versuch_intervall_ms,
                        versuche: 1,
                    };
                }
            }
            MemberZustand::WaitingKey {
                frist_ms,
                naechster_versuch_ms,
                versuche,
            } => {
                if jetzt_ms >= frist_ms {
                    self.fehlschlag("kein Key erhalten");
                } else if jetzt_ms >= naechster_versuch_ms && versuche < self.konfig.max_versuche
                {
                    self.sende_join();
                    self.zustand = MemberZustand::WaitingKey {
                        frist_ms,
                        naechster_versuch_ms: jetzt_ms + self.konfig.versuch_intervall_ms,
                        versuche: versuche + 1,
                    };
                }
            }
            MemberZustand::Idle
            | MemberZustand::Completed
            | MemberZustand::Failed => {}
        }
    }

    fn verarbeite_datagramm(&mut self, absender: T::Adresse, daten: &[u8], jetzt_ms: u64) {
        let nachricht = match PairingMessage::decode(daten) {
            Ok(n) => n,
            Err(fehler) => {
                tracing::trace!(%fehler, "Kaputtes Pairing-Datagramm verworfen");
                return;
            }
        };

        match (self.zustand, nachricht) {
            (MemberZustand::Scanning { .. }, PairingMessage::Beacon(beacon)) => {
                if let Some(ziel) = self.ziel_team {
                    if beacon.team_id != ziel {
                        tracing::trace!(team = %beacon.team_id, "Beacon fuer fremdes Team ignoriert");
                        return;
                    }
                }
                tracing::info!(team = %beacon.team_id, name = %beacon.name, "Beacon gefunden, Join geht raus");
                self.nonce = OsRng.next_u64();
                self.beacon = Some(GemerkterBeacon {
                    adresse: absender,
                    team_id: beacon.team_id,
                    epoch: beacon.epoch,
                    leader_id: beacon.leader_id,
                    name: beacon.name,
                });
                self.sende_join();
                // Die Gesamt-Frist laeuft ab dem Join-Versand
                self.zustand = MemberZustand::JoinSent {
                    halte_bis_ms: jetzt_ms + self.konfig.halte_ms,
                    frist_ms: jetzt_ms + self.konfig.antwort_frist_ms,
                };
            }
            (
                MemberZustand::JoinSent { .. } | MemberZustand::WaitingKey { .. },
                PairingMessage::Key(key),
            ) => {
                let Some(beacon) = &self.beacon else {
                    return;
                };
                if key.team_id != beacon.team_id {
                    tracing::trace!("Key fuer fremdes Team ignoriert");
                    return;
                }
                if key.nonce_echo != self.nonce {
                    tracing::warn!("Key mit falschem Nonce-Echo verworfen");
                    return;
                }
                tracing::info!(team = %key.team_id, epoch = key.epoch, "Schluesselmaterial etabliert");
                let ergebnis = SchluesselEtabliert {
                    team_id: key.team_id,
                    epoch: key.epoch,
                    psk: key.psk,
                    leader_id: beacon.leader_id,
                    team_name: beacon.name.clone(),
                };
                self.ergebnis = Some(ergebnis);
                self.zustand = MemberZustand::Completed;
            }
            _ => {}
        }
    }

    fn sende_join(&mut self) {
        let Some(beacon) = &self.beacon else {
            return;
        };
        let adresse = beacon.adresse.clone();
        let join = PairingMessage::Join(Join {
            team_id: beacon.team_id,
            member_id: self.eigene_id,
            nonce: self.nonce,
        });
        match join.encode() {
            Ok(bytes) => {
                if !self.transport.unicast(&adresse, &bytes) {
                    tracing::debug!("Join nicht gesendet (Transport voll)");
                }
            }
            Err(fehler) => tracing::error!(%fehler, "Join nicht kodierbar"),
        }
    }

    fn fehlschlag(&mut self, grund: &str) {
        tracing::warn!(grund, "Pairing fehlgeschlagen");
        self.zustand = MemberZustand::Failed;
        self.beacon = None;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
