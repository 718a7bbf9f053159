//! UDP-Traeger fuer den Desktop-Betrieb
//!
//! Im Geraet uebernimmt das Funkmodul den Transport; auf dem Desktop
//! ersetzt ihn ein UDP-Segment. Der Mesh-Traeger rahmt jedes Paket mit
//! Portnummer, Absender, Ziel und Kanal; der Empfangs-Task legt Pakete
//! in den Einzelplatz-Briefkasten, den die Poll-Schleife leert.
//!
//! ## Mesh-Rahmen (UDP-Payload)
//!
//! ```text
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0       2   Portnummer (little-endian)
//!  2       4   Absender-Knoten
//!  6       4   Ziel-Knoten (0xFFFFFFFF = Broadcast)
//! 10       1   Kanal
//! 11+      N   Nutzlast
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use teamfunk_core::MemberId;
use teamfunk_pairing::BootstrapTransport;
use teamfunk_protocol::cursor::{Reader, Writer};
use teamfunk_team::{Mailbox, MeshEingang, MeshTransport, MeshZiel};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

/// Maximale UDP-Datagramm-Groesse die wir annehmen
const MAX_DATAGRAMM: usize = 2048;

// ---------------------------------------------------------------------------
// Mesh-Traeger
// ---------------------------------------------------------------------------

/// Mesh-Transport ueber ein UDP-Segment
pub struct UdpMeshFunk {
    socket: Arc<UdpSocket>,
    broadcast: SocketAddr,
    absender: MemberId,
    mailbox: Arc<Mailbox>,
}

impl UdpMeshFunk {
    /// Bindet den Socket und startet den Empfangs-Task
    pub async fn neu(
        bind: &str,
        broadcast: &str,
        port: u16,
        eigene_id: MemberId,
    ) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind((bind, port))
            .await
            .with_context(|| format!("Mesh-Socket {}:{} nicht bindbar", bind, port))?;
        socket.set_broadcast(true)?;
        let socket = Arc::new(socket);
        let broadcast: SocketAddr = format!("{}:{}", broadcast, port)
            .parse()
            .context("Ungueltige Broadcast-Adresse")?;

        let mailbox = Arc::new(Mailbox::neu());
        let empfangs_socket = Arc::clone(&socket);
        let empfangs_mailbox = Arc::clone(&mailbox);
        tokio::spawn(async move {
            let mut puffer = [0u8; MAX_DATAGRAMM];
            loop {
                let Ok((laenge, _absender)) = empfangs_socket.recv_from(&mut puffer).await else {
                    tracing::warn!("Mesh-Socket geschlossen, Empfangs-Task endet");
                    return;
                };
                let Some(eingang) = rahmen_dekodieren(&puffer[..laenge]) else {
                    tracing::trace!("Kaputter Mesh-Rahmen verworfen");
                    continue;
                };
                if eingang.from == eigene_id {
                    continue; // eigener Broadcast kommt auf UDP zurueck
                }
                let ziel = ziel_aus_rahmen(&puffer[..laenge]);
                if ziel != MemberId::BROADCAST && ziel != eigene_id {
                    continue;
                }
                if !empfangs_mailbox.einlegen(eingang) {
                    tracing::debug!("Briefkasten voll, Mesh-Paket verworfen");
                }
            }
        });

        Ok(Self {
            socket,
            broadcast,
            absender: eigene_id,
            mailbox,
        })
    }
}

impl MeshTransport for UdpMeshFunk {
    fn senden(
        &mut self,
        kanal: u8,
        portnum: u16,
        daten: &[u8],
        ziel: MeshZiel,
        _want_ack: bool,
    ) -> bool {
        let ziel_id = match ziel {
            MeshZiel::Broadcast => MemberId::BROADCAST,
            MeshZiel::Knoten(id) => id,
        };
        let rahmen = rahmen_kodieren(portnum, self.absender, ziel_id, kanal, daten);
        self.socket.try_send_to(&rahmen, self.broadcast).is_ok()
    }

    fn poll_eingang(&mut self) -> Option<MeshEingang> {
        self.mailbox.abholen()
    }
}

fn rahmen_kodieren(
    portnum: u16,
    from: MemberId,
    ziel: MemberId,
    kanal: u8,
    daten: &[u8],
) -> Vec<u8> {
    let mut w = Writer::mit_kapazitaet(11 + daten.len());
    w.u16_le(portnum);
    w.u32_le(from.inner());
    w.u32_le(ziel.inner());
    w.u8(kanal);
    w.bytes(daten);
    w.fertig()
}

fn rahmen_dekodieren(daten: &[u8]) -> Option<MeshEingang> {
    let mut r = Reader::neu(daten);
    let portnum = r.u16_le().ok()?;
    let from = MemberId::new(r.u32_le().ok()?);
    let _ziel = r.u32_le().ok()?;
    let kanal = r.u8().ok()?;
    let payload = r.bytes(r.rest()).ok()?.to_vec();
    Some(MeshEingang {
        portnum,
        from,
        kanal,
        payload,
    })
}

fn ziel_aus_rahmen(daten: &[u8]) -> MemberId {
    let mut r = Reader::neu(daten);
    let _ = r.u16_le();
    let _ = r.u32_le();
    r.u32_le().map(MemberId::new).unwrap_or(MemberId::BROADCAST)
}

// ---------------------------------------------------------------------------
// Bootstrap-Traeger
// ---------------------------------------------------------------------------

/// Bootstrap-Transport ueber ein UDP-Segment
pub struct UdpBootstrapFunk {
    socket: Arc<UdpSocket>,
    broadcast: SocketAddr,
    eingang: mpsc::UnboundedReceiver<(SocketAddr, Vec<u8>)>,
}

impl UdpBootstrapFunk {
    /// Bindet den Socket und startet den Empfangs-Task
    pub async fn neu(bind: &str, broadcast: &str, port: u16) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind((bind, port))
            .await
            .with_context(|| format!("Pairing-Socket {}:{} nicht bindbar", bind, port))?;
        socket.set_broadcast(true)?;
        let socket = Arc::new(socket);
        let broadcast: SocketAddr = format!("{}:{}", broadcast, port)
            .parse()
            .context("Ungueltige Broadcast-Adresse")?;

        let (sender, eingang) = mpsc::unbounded_channel();
        let empfangs_socket = Arc::clone(&socket);
        let lokal = socket.local_addr().ok();
        tokio::spawn(async move {
            let mut puffer = [0u8; MAX_DATAGRAMM];
            loop {
                let Ok((laenge, absender)) = empfangs_socket.recv_from(&mut puffer).await else {
                    tracing::warn!("Pairing-Socket geschlossen, Empfangs-Task endet");
                    return;
                };
                if Some(absender) == lokal {
                    continue; // eigener Broadcast
                }
                if sender.send((absender, puffer[..laenge].to_vec())).is_err() {
                    return;
                }
            }
        });

        Ok(Self {
            socket,
            broadcast,
            eingang,
        })
    }
}

impl BootstrapTransport for UdpBootstrapFunk {
    type Adresse = SocketAddr;

    fn broadcast(&mut self, daten: &[u8]) -> bool {
        self.socket.try_send_to(daten, self.broadcast).is_ok()
    }

    fn unicast(&mut self, ziel: &SocketAddr, daten: &[u8]) -> bool {
        self.socket.try_send_to(daten, *ziel).is_ok()
    }

    fn poll(&mut self) -> Option<(SocketAddr, Vec<u8>)> {
        self.eingang.try_recv().ok()
    }
}
