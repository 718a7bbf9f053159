//! Ende-zu-Ende-Szenarien ueber ein In-Memory-Funknetz
//!
//! Mehrere vollstaendig verdrahtete Kommandanten teilen sich ein
//! Funknetz mit garantierter Zustellung; die Zeit laeuft simuliert ueber
//! explizite Millisekunden-Stempel.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use teamfunk_core::MemberId;
use teamfunk_crypto::Aes256GcmProvider;
use teamfunk_team::{
    MeshEingang, MeshTransport, MeshZiel, ReceiveFailure, RotationsKonfig, SammelSenke,
    SecureChannelService, TeamCommander, TeamEvent,
};

// ---------------------------------------------------------------------------
// In-Memory-Funknetz
// ---------------------------------------------------------------------------

/// Gemeinsames Funknetz: jede Station hat eine Empfangs-Queue
#[derive(Clone, Default)]
struct Funknetz {
    queues: Arc<Mutex<HashMap<u32, VecDeque<MeshEingang>>>>,
}

impl Funknetz {
    fn neu() -> Self {
        Self::default()
    }

    fn anschliessen(&self, id: MemberId) -> NetzFunk {
        self.queues.lock().insert(id.inner(), VecDeque::new());
        NetzFunk {
            netz: self.clone(),
            eigene: id,
        }
    }
}

struct NetzFunk {
    netz: Funknetz,
    eigene: MemberId,
}

impl MeshTransport for NetzFunk {
    fn senden(
        &mut self,
        kanal: u8,
        portnum: u16,
        daten: &[u8],
        ziel: MeshZiel,
        _want_ack: bool,
    ) -> bool {
        let mut queues = self.netz.queues.lock();
        for (id, queue) in queues.iter_mut() {
            if *id == self.eigene.inner() {
                continue;
            }
            let passt = match ziel {
                MeshZiel::Broadcast => true,
                MeshZiel::Knoten(k) => k.inner() == *id,
            };
            if passt {
                queue.push_back(MeshEingang {
                    portnum,
                    from: self.eigene,
                    kanal,
                    payload: daten.to_vec(),
                });
            }
        }
        true
    }

    fn poll_eingang(&mut self) -> Option<MeshEingang> {
        self.netz.queues.lock().get_mut(&self.eigene.inner())?.pop_front()
    }
}

fn kommandant(netz: &Funknetz, id: u32) -> TeamCommander<Aes256GcmProvider, NetzFunk> {
    let service = SecureChannelService::neu(
        Aes256GcmProvider,
        netz.anschliessen(MemberId(id)),
        MemberId(id),
    );
    TeamCommander::neu(service, RotationsKonfig::default())
}

// ---------------------------------------------------------------------------
// Szenarien
// ---------------------------------------------------------------------------

/// Leader erstellt Team auf Epoch 1; Mitglied uebernimmt {T, 1, P1};
/// ein zweiter Beitritt rotiert auf Epoch 2 mit P2; die KeyDist unter dem
/// Epoch-1-Management-Schluessel wird vom Mitglied entschluesselt und
/// uebernommen; ein Status des Mitglieds unter P2 wird vom (selbst
/// rotierten) Leader akzeptiert.
#[test]
fn beitritt_rotation_und_status_ende_zu_ende() {
    let netz = Funknetz::neu();
    let mut leader = kommandant(&netz, 1);
    let team = leader.team_erstellen("Alpha").unwrap();
    let p1 = leader.aktueller_psk().unwrap();

    // Mitglied 2 uebernimmt das Material wie nach einem Pairing
    let mut mitglied = kommandant(&netz, 2);
    mitglied
        .schluessel_uebernehmen(team, 1, &p1, MemberId(1))
        .unwrap();
    assert_eq!(mitglied.epoch(), Some(1));

    // Leader sieht das JoinConfirm und nimmt das Mitglied auf: Epoch 2
    let mut senke = SammelSenke::neu();
    leader.poll(&mut senke, 0);
    assert!(senke
        .ereignisse
        .iter()
        .any(|(_, e)| matches!(e, TeamEvent::JoinConfirm(_))));
    leader.beitritt_annehmen(MemberId(2), 0, 0).unwrap();
    assert_eq!(leader.epoch(), Some(2));
    assert_eq!(leader.ausstehende_zustellungen(), 1);
    let p2 = leader.aktueller_psk().unwrap();
    assert_ne!(p1.as_slice(), p2.as_slice());

    // Mitglied verarbeitet die KeyDist (Umschlag-Epoch 2, Schluessel der
    // ausgehenden Epoch 1) und uebernimmt P2
    let mut senke = SammelSenke::neu();
    mitglied.poll(&mut senke, 100);
    assert_eq!(mitglied.epoch(), Some(2));
    assert!(senke
        .ereignisse
        .iter()
        .any(|(_, e)| matches!(e, TeamEvent::KeyDist { epoch: 2 })));
    assert_eq!(mitglied.aktueller_psk().unwrap().as_slice(), p2.as_slice());

    // Status des Mitglieds unter P2 wird vom Leader akzeptiert und
    // bestaetigt die Zustellung implizit
    mitglied.status_senden(None, false).unwrap();
    let mut senke = SammelSenke::neu();
    leader.poll(&mut senke, 200);
    let status_da = senke.ereignisse.iter().any(|(ctx, e)| {
        ctx.from == MemberId(2) && ctx.epoch == 2 && matches!(e, TeamEvent::Status(_))
    });
    assert!(status_da);
    assert_eq!(leader.ausstehende_zustellungen(), 0);
}

/// Ein Mitglied das die Rotation verpasst hat sendet unter der alten
/// Epoch; der rotierte Leader lehnt das als SchluesselMismatch ab.
#[test]
fn alte_epoch_wird_nach_rotation_abgelehnt() {
    let netz = Funknetz::neu();
    let mut leader = kommandant(&netz, 1);
    let team = leader.team_erstellen("Alpha").unwrap();
    let p1 = leader.aktueller_psk().unwrap();

    // Zwei Mitglieder auf Epoch 1
    let mut aktiv = kommandant(&netz, 2);
    aktiv.schluessel_uebernehmen(team, 1, &p1, MemberId(1)).unwrap();
    let mut verpasst = kommandant(&netz, 3);
    verpasst
        .schluessel_uebernehmen(team, 1, &p1, MemberId(1))
        .unwrap();

    let mut senke = SammelSenke::neu();
    leader.poll(&mut senke, 0);
    leader.beitritt_annehmen(MemberId(2), 0, 0).unwrap();
    leader.beitritt_annehmen(MemberId(3), 0, 0).unwrap();
    assert_eq!(leader.epoch(), Some(3));

    // "verpasst" pollt nie und sendet stur unter Epoch 1
    verpasst.status_senden(None, false).unwrap();
    let mut senke = SammelSenke::neu();
    leader.poll(&mut senke, 100);
    let mismatch = senke.ereignisse.iter().any(|(ctx, e)| {
        ctx.from == MemberId(3)
            && matches!(
                e,
                TeamEvent::Fehler {
                    fehler: ReceiveFailure::SchluesselMismatch,
                    ..
                }
            )
    });
    assert!(mismatch);
}

/// Ein gekicktes Mitglied kann den Verkehr der neuen Epoch nicht mehr
/// authentisieren und schliesst daraus auf den eigenen Widerruf.
#[test]
fn gekicktes_mitglied_erkennt_widerruf_implizit() {
    let netz = Funknetz::neu();
    let mut leader = kommandant(&netz, 1);
    let team = leader.team_erstellen("Alpha").unwrap();
    let p1 = leader.aktueller_psk().unwrap();

    let mut opfer = kommandant(&netz, 2);
    opfer.schluessel_uebernehmen(team, 1, &p1, MemberId(1)).unwrap();
    let mut senke = SammelSenke::neu();
    leader.poll(&mut senke, 0);
    leader.beitritt_annehmen(MemberId(2), 0, 0).unwrap();
    let mut senke = SammelSenke::neu();
    opfer.poll(&mut senke, 50);
    assert_eq!(opfer.epoch(), Some(2));

    // Kick: Kick-Nachricht faellt der Lossy-Annahme zum Opfer – wir
    // leeren die Queue des Opfers, damit nur der implizite Pfad zaehlt
    leader.kick(MemberId(2), 100).unwrap();
    netz.queues.lock().get_mut(&2).unwrap().clear();
    assert_eq!(leader.epoch(), Some(3));

    // Der Leader sendet weiter; jedes Management-Paket der Epoch 3 ist
    // fuer das Opfer ein Authentisierungs-Fehler
    let mut jetzt = 200;
    for _ in 0..10 {
        leader.status_senden(None, false).unwrap();
        let mut senke = SammelSenke::neu();
        opfer.poll(&mut senke, jetzt);
        if opfer.ist_widerrufen() {
            break;
        }
        jetzt += 100;
    }

    assert!(opfer.ist_widerrufen());
    assert_eq!(opfer.epoch(), None);
    assert!(matches!(
        opfer.chat_senden(b"hallo").unwrap_err(),
        teamfunk_team::TeamError::Widerrufen
    ));
}

/// Bleibt ein Mitglied stumm, wird die Zustellung nach der begrenzten
/// Versuchszahl aufgegeben und gemeldet.
#[test]
fn zustellung_an_stummes_mitglied_wird_aufgegeben() {
    let netz = Funknetz::neu();
    let mut leader = kommandant(&netz, 1);
    let team = leader.team_erstellen("Alpha").unwrap();
    let p1 = leader.aktueller_psk().unwrap();

    let mut stumm = kommandant(&netz, 2);
    stumm.schluessel_uebernehmen(team, 1, &p1, MemberId(1)).unwrap();
    let mut senke = SammelSenke::neu();
    leader.poll(&mut senke, 0);
    leader.beitritt_annehmen(MemberId(2), 0, 0).unwrap();
    assert_eq!(leader.ausstehende_zustellungen(), 1);

    // "stumm" pollt nie; der Leader tickt durch die Wiederholungen
    let mut aufgegeben = false;
    let mut jetzt = 0;
    for _ in 0..12 {
        jetzt += 5_000;
        let mut senke = SammelSenke::neu();
        leader.poll(&mut senke, jetzt);
        if senke.ereignisse.iter().any(|(_, e)| {
            matches!(
                e,
                TeamEvent::KeyDistAufgegeben {
                    mitglied: MemberId(2),
                    epoch: 2
                }
            )
        }) {
            aufgegeben = true;
            break;
        }
    }

    assert!(aufgegeben);
    assert_eq!(leader.ausstehende_zustellungen(), 0);
}

/// Leader-Uebergabe rotiert nicht und macht die Gegenseite zum Leader.
#[test]
fn leader_uebergabe_ohne_rotation() {
    let netz = Funknetz::neu();
    let mut leader = kommandant(&netz, 1);
    let team = leader.team_erstellen("Alpha").unwrap();
    let p1 = leader.aktueller_psk().unwrap();

    let mut mitglied = kommandant(&netz, 2);
    mitglied
        .schluessel_uebernehmen(team, 1, &p1, MemberId(1))
        .unwrap();
    let mut senke = SammelSenke::neu();
    leader.poll(&mut senke, 0);
    leader.beitritt_annehmen(MemberId(2), 0, 0).unwrap();
    let mut senke = SammelSenke::neu();
    mitglied.poll(&mut senke, 50);
    assert_eq!(mitglied.epoch(), Some(2));

    let epoch_vorher = leader.epoch();
    leader.leader_uebertragen(MemberId(2)).unwrap();
    assert_eq!(leader.epoch(), epoch_vorher);
    assert!(!leader.ist_leader());

    let mut senke = SammelSenke::neu();
    mitglied.poll(&mut senke, 100);
    assert!(mitglied.ist_leader());
    assert_eq!(mitglied.epoch(), epoch_vorher);
}

/// Chat, Position und Wegpunkt laufen nach der Etablierung in beide
/// Richtungen ueber ihre eigenen Kanaele.
#[test]
fn anwendungs_kanaele_ende_zu_ende() {
    let netz = Funknetz::neu();
    let mut leader = kommandant(&netz, 1);
    let team = leader.team_erstellen("Alpha").unwrap();
    let p1 = leader.aktueller_psk().unwrap();

    let mut mitglied = kommandant(&netz, 2);
    mitglied
        .schluessel_uebernehmen(team, 1, &p1, MemberId(1))
        .unwrap();
    let mut senke = SammelSenke::neu();
    leader.poll(&mut senke, 0);

    mitglied.chat_senden(b"hallo team").unwrap();
    mitglied.position_senden(&[1, 2, 3, 4]).unwrap();
    mitglied.waypoint_senden(&[9, 9]).unwrap();
    mitglied.track_senden(&[5]).unwrap();

    let mut senke = SammelSenke::neu();
    leader.poll(&mut senke, 100);

    let chat = senke
        .ereignisse
        .iter()
        .find_map(|(_, e)| match e {
            TeamEvent::Chat { daten } => Some(daten.clone()),
            _ => None,
        })
        .unwrap();
    assert_eq!(chat, b"hallo team");
    assert!(senke
        .ereignisse
        .iter()
        .any(|(_, e)| matches!(e, TeamEvent::Position { daten } if daten == &[1, 2, 3, 4])));
    assert!(senke
        .ereignisse
        .iter()
        .any(|(_, e)| matches!(e, TeamEvent::Waypoint { .. })));
    assert!(senke
        .ereignisse
        .iter()
        .any(|(_, e)| matches!(e, TeamEvent::Track { .. })));
}
