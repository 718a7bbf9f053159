//! Leader-Seite des Pairing-Handshakes
//!
//! `Idle -> Beaconing`: periodischer Broadcast der Team-Ankuendigung.
//! Auf jedes passende `Join` geht ein `Key` per Unicast zurueck; der
//! Leader bleibt im Beaconing und nimmt weitere Beitritte an, bis sein
//! Fenster ablaeuft.

use teamfunk_core::{MemberId, Psk, TeamId};

use crate::config::PairingKonfig;
use crate::transport::BootstrapTransport;
use crate::wire::{Beacon, Key, PairingMessage};

/// Zustand der Leader-Seite
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaderZustand {
    Idle,
    /// Beitritts-Fenster offen, Beacons laufen
    Beaconing {
        fenster_bis_ms: u64,
        naechster_beacon_ms: u64,
    },
}

/// Das Angebot das der Leader ueber Beacons bekannt macht
#[derive(Debug, Clone)]
pub struct PairingAngebot {
    pub team_id: TeamId,
    pub epoch: u32,
    pub psk: Psk,
    pub leader_id: MemberId,
    pub name: String,
}

/// Leader-Zustandsmaschine des Pairing-Handshakes
pub struct LeaderPairing<T: BootstrapTransport> {
    konfig: PairingKonfig,
    transport: T,
    angebot: Option<PairingAngebot>,
    zustand: LeaderZustand,
    /// Anzahl beantworteter Joins im aktuellen Fenster
    bedient: u32,
}

impl<T: BootstrapTransport> LeaderPairing<T> {
    pub fn neu(transport: T, konfig: PairingKonfig) -> Self {
        Self {
            konfig,
            transport,
            angebot: None,
            zustand: LeaderZustand::Idle,
            bedient: 0,
        }
    }

    pub fn zustand(&self) -> LeaderZustand {
        self.zustand
    }

    /// Anzahl der im aktuellen Fenster beantworteten Joins
    pub fn bediente_joins(&self) -> u32 {
        self.bedient
    }

    /// Oeffnet ein Beitritts-Fenster und beginnt zu beaconen
    ///
    /// Ein bereits laufendes Fenster wird ersetzt (Neu-Armierung nach
    /// Ablauf ist ausdruecklich erlaubt).
    pub fn starten(&mut self, angebot: PairingAngebot, jetzt_ms: u64) {
        tracing::info!(team = %angebot.team_id, epoch = angebot.epoch, "Pairing-Fenster geoeffnet");
        self.angebot = Some(angebot);
        self.bedient = 0;
        self.zustand = LeaderZustand::Beaconing {
            fenster_bis_ms: jetzt_ms + self.konfig.fenster_ms,
            naechster_beacon_ms: jetzt_ms,
        };
    }

    /// Bricht das Pairing ab – aus jedem Zustand sicher aufrufbar
    pub fn stop(&mut self) {
        if self.zustand != LeaderZustand::Idle {
            tracing::info!("Pairing-Fenster geschlossen");
        }
        self.zustand = LeaderZustand::Idle;
        self.angebot = None;
    }

    /// Ein Durchlauf der kooperativen Schleife
    pub fn update(&mut self, jetzt_ms: u64) {
        let LeaderZustand::Beaconing {
            fenster_bis_ms,
            naechster_beacon_ms,
        } = self.zustand
        else {
            return;
        };

        // Eingehende Joins beantworten
        while let Some((absender, daten)) = self.transport.poll() {
            self.verarbeite_datagramm(&absender, &daten);
        }

        // Fenster-Ablauf
        if jetzt_ms >= fenster_bis_ms {
            tracing::info!(bedient = self.bedient, "Pairing-Fenster abgelaufen");
            self.zustand = LeaderZustand::Idle;
            self.angebot = None;
            return;
        }

        // Periodischer Beacon
        if jetzt_ms >= naechster_beacon_ms {
            self.sende_beacon(jetzt_ms, fenster_bis_ms);
            self.zustand = LeaderZustand::Beaconing {
                fenster_bis_ms,
                naechster_beacon_ms: jetzt_ms + self.konfig.beacon_intervall_ms,
            };
        }
    }

    fn sende_beacon(&mut self, jetzt_ms: u64, fenster_bis_ms: u64) {
        let Some(angebot) = &self.angebot else {
            return;
        };
        let beacon = PairingMessage::Beacon(Beacon {
            team_id: angebot.team_id,
            epoch: angebot.epoch,
            leader_id: angebot.leader_id,
            fenster_rest_s: ((fenster_bis_ms.saturating_sub(jetzt_ms)) / 1_000) as u16,
            name: angebot.name.clone(),
        });
        match beacon.encode() {
            Ok(bytes) => {
                if !self.transport.broadcast(&bytes) {
                    tracing::debug!("Beacon nicht gesendet (Transport voll)");
                }
            }
            Err(fehler) => tracing::error!(%fehler, "Beacon nicht kodierbar"),
        }
    }

    fn verarbeite_datagramm(&mut self, absender: &T::Adresse, daten: &[u8]) {
        let Some(angebot) = &self.angebot else {
            return;
        };
        let nachricht = match PairingMessage::decode(daten) {
            Ok(n) => n,
            Err(fehler) => {
                tracing::trace!(%fehler, "Kaputtes Pairing-Datagramm verworfen");
                return;
            }
        };
        let PairingMessage::Join(join) = nachricht else {
            return;
        };
        if join.team_id != angebot.team_id {
            tracing::trace!(team = %join.team_id, "Join fuer fremdes Team ignoriert");
            return;
        }

        tracing::info!(mitglied = %join.member_id, "Join empfangen, Key geht raus");
        let antwort = PairingMessage::Key(Key {
            team_id: angebot.team_id,
            epoch: angebot.epoch,
            nonce_echo: join.nonce,
            psk: angebot.psk.clone(),
        });
        match antwort.encode() {
            Ok(bytes) => {
                if self.transport.unicast(absender, &bytes) {
                    self.bedient += 1;
                } else {
                    tracing::debug!("Key nicht gesendet (Transport voll)");
                }
            }
            Err(fehler) => tracing::error!(%fehler, "Key nicht kodierbar"),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
