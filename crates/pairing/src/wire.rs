//! Wire-Format des Pairing-Handshakes
//!
//! Eigener, bewusst minimaler Datagram-Codec – der Handshake laeuft
//! ueber einen nackten Broadcast/Unicast-Transport, bevor es einen
//! Team-Kanal gibt. Authentisierung auf dieser Ebene ist Absicht
//! minimal (Magic/Version/Typ, Team-ID, Nonce-Echo): Trust-on-first-use,
//! dessen einzige Aufgabe es ist das Material zu saeen das danach den
//! echten Verkehr schuetzt.
//!
//! ## Header
//!
//! ```text
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0       2   Magic (0x4654, little-endian)
//!  2       1   Version
//!  3       1   Nachrichtentyp (1 = Beacon, 2 = Join, 3 = Key)
//!  4+      N   Payload (typabhaengig)
//! ```

use teamfunk_core::{MemberId, Psk, TeamId};
use teamfunk_protocol::cursor::{Reader, Writer};
use teamfunk_protocol::error::{WireError, WireResult};

/// Magic-Wert am Anfang jedes Pairing-Datagramms
pub const PAIRING_MAGIC: u16 = 0x4654;

/// Aktuelle Version des Pairing-Protokolls
pub const PAIRING_VERSION: u8 = 1;

/// Maximale Laenge des Team-Namens im Beacon
pub const MAX_NAME_LAENGE: usize = 32;

const TYP_BEACON: u8 = 1;
const TYP_JOIN: u8 = 2;
const TYP_KEY: u8 = 3;

/// Periodische Team-Ankuendigung des Leaders
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Beacon {
    pub team_id: TeamId,
    pub epoch: u32,
    pub leader_id: MemberId,
    /// Verbleibende Beitritts-Fenster-Dauer in Sekunden
    pub fenster_rest_s: u16,
    pub name: String,
}

/// Beitritts-Wunsch eines Geraets an den Leader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Join {
    pub team_id: TeamId,
    pub member_id: MemberId,
    /// Frische Zufalls-Nonce, wird im Key zurueckgespiegelt
    pub nonce: u64,
}

/// Schluessel-Antwort des Leaders an ein beitretendes Geraet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Key {
    pub team_id: TeamId,
    pub epoch: u32,
    /// Echo der Nonce aus dem Join
    pub nonce_echo: u64,
    pub psk: Psk,
}

/// Typisierte Pairing-Nachricht
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingMessage {
    Beacon(Beacon),
    Join(Join),
    Key(Key),
}

impl PairingMessage {
    /// Serialisiert die Nachricht inkl. Header
    pub fn encode(&self) -> WireResult<Vec<u8>> {
        let mut w = Writer::neu();
        w.u16_le(PAIRING_MAGIC);
        w.u8(PAIRING_VERSION);
        match self {
            Self::Beacon(b) => {
                if b.name.len() > MAX_NAME_LAENGE {
                    return Err(WireError::NutzlastZuGross {
                        laenge: b.name.len(),
                        maximum: MAX_NAME_LAENGE,
                    });
                }
                w.u8(TYP_BEACON);
                w.bytes(b.team_id.as_bytes());
                w.u32_le(b.epoch);
                w.u32_le(b.leader_id.inner());
                w.u16_le(b.fenster_rest_s);
                w.u8(b.name.len() as u8);
                w.bytes(b.name.as_bytes());
            }
            Self::Join(j) => {
                w.u8(TYP_JOIN);
                w.bytes(j.team_id.as_bytes());
                w.u32_le(j.member_id.inner());
                w.u64_le(j.nonce);
            }
            Self::Key(k) => {
                w.u8(TYP_KEY);
                w.bytes(k.team_id.as_bytes());
                w.u32_le(k.epoch);
                w.u64_le(k.nonce_echo);
                w.u8(k.psk.laenge() as u8);
                w.bytes(k.psk.as_slice());
            }
        }
        Ok(w.fertig())
    }

    /// Deserialisiert eine Nachricht aus einem Byte-Slice
    pub fn decode(daten: &[u8]) -> WireResult<Self> {
        let mut r = Reader::neu(daten);

        let magic = r.u16_le()?;
        if magic != PAIRING_MAGIC {
            return Err(WireError::UngueltigesFeld("falsches Magic"));
        }
        let version = r.u8()?;
        if version != PAIRING_VERSION {
            return Err(WireError::UnbekannteVersion {
                erwartet: PAIRING_VERSION,
                erhalten: version,
            });
        }

        let typ = r.u8()?;
        let nachricht = match typ {
            TYP_BEACON => {
                let team_id = TeamId::from_bytes(r.array()?);
                let epoch = r.u32_le()?;
                let leader_id = MemberId::new(r.u32_le()?);
                let fenster_rest_s = r.u16_le()?;
                let name_laenge = r.u8()? as usize;
                if name_laenge > MAX_NAME_LAENGE {
                    return Err(WireError::UngueltigesFeld("Team-Name zu lang"));
                }
                let name = String::from_utf8(r.bytes(name_laenge)?.to_vec())
                    .map_err(|_| WireError::UngueltigesFeld("Team-Name kein UTF-8"))?;
                Self::Beacon(Beacon {
                    team_id,
                    epoch,
                    leader_id,
                    fenster_rest_s,
                    name,
                })
            }
            TYP_JOIN => Self::Join(Join {
                team_id: TeamId::from_bytes(r.array()?),
                member_id: MemberId::new(r.u32_le()?),
                nonce: r.u64_le()?,
            }),
            TYP_KEY => {
                let team_id = TeamId::from_bytes(r.array()?);
                let epoch = r.u32_le()?;
                let nonce_echo = r.u64_le()?;
                let psk_laenge = r.u8()? as usize;
                if psk_laenge > Psk::KAPAZITAET {
                    return Err(WireError::UngueltigesFeld("PSK zu lang"));
                }
                let psk = Psk::aus_slice(r.bytes(psk_laenge)?)
                    .ok_or(WireError::UngueltigesFeld("PSK zu lang"))?;
                Self::Key(Key {
                    team_id,
                    epoch,
                    nonce_echo,
                    psk,
                })
            }
            unbekannt => return Err(WireError::UnbekannterTyp(unbekannt)),
        };

        r.fertig()?;
        Ok(nachricht)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
