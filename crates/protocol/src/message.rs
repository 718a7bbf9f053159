//! Management-Nachrichten – das innere Wire-Format
//!
//! Nach dem Entschluesseln eines Umschlags (bzw. direkt bei
//! Klartext-Frames) steckt in der Nutzlast ein Management-Umschlag mit
//! typisierter Nachricht. Aeusseres Framing wie beim verschluesselten
//! Umschlag: little-endian, jedes Feld bounds-gecheckt.
//!
//! ## Framing
//!
//! ```text
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0       1   Version
//!  1       1   Nachrichtentyp
//!  2       2   Reserviert (0)
//!  4       2   Payload-Laenge
//!  6+      N   Payload (typabhaengig)
//! ```
//!
//! Optionale Abschnitte (Status) werden ueber Flag-Bits signalisiert,
//! nie ueber Sentinel-Werte – Routine-Heartbeats bleiben so klein.

use serde::{Deserialize, Serialize};
use teamfunk_core::{MemberId, Psk, TeamId};

use crate::cursor::{Reader, Writer};
use crate::error::{WireError, WireResult};

/// Aktuelle Version des Management-Umschlags
pub const MESSAGE_VERSION: u8 = 1;

/// Maximale Laenge eines Team-Namens in Bytes
pub const MAX_NAME_LAENGE: usize = 32;

/// Maximale Anzahl Mitglieder in einem Status-Roster
pub const MAX_ROSTER: usize = 8;

// ---------------------------------------------------------------------------
// Nachrichtentyp
// ---------------------------------------------------------------------------

/// Typ einer Management-Nachricht
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageType {
    Advertise = 1,
    JoinRequest = 2,
    JoinAccept = 3,
    JoinConfirm = 4,
    JoinDecision = 5,
    Kick = 6,
    TransferLeader = 7,
    KeyDist = 8,
    Status = 9,
}

impl MessageType {
    /// Konvertiert ein Byte in einen `MessageType`
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Advertise),
            2 => Some(Self::JoinRequest),
            3 => Some(Self::JoinAccept),
            4 => Some(Self::JoinConfirm),
            5 => Some(Self::JoinDecision),
            6 => Some(Self::Kick),
            7 => Some(Self::TransferLeader),
            8 => Some(Self::KeyDist),
            9 => Some(Self::Status),
            _ => None,
        }
    }

    /// Darf dieser Typ unverschluesselt akzeptiert werden?
    ///
    /// Advertise und JoinRequest laufen konstruktionsbedingt vor der
    /// Schluessel-Etablierung und sind die einzigen Klartext-Typen.
    pub fn ist_klartext_erlaubt(&self) -> bool {
        matches!(self, Self::Advertise | Self::JoinRequest)
    }
}

// ---------------------------------------------------------------------------
// Payload-Typen
// ---------------------------------------------------------------------------

/// Team-Ankuendigung (Klartext, vor Schluessel-Etablierung)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advertise {
    pub team_id: TeamId,
    pub leader_id: MemberId,
    /// Anzeigename des Teams (max. `MAX_NAME_LAENGE` Bytes UTF-8)
    pub name: String,
}

/// Beitritts-Anfrage (Klartext, vor Schluessel-Etablierung)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub team_id: TeamId,
    pub member_id: MemberId,
    /// Frische Zufalls-Nonce, wird im JoinAccept zurueckgespiegelt
    pub nonce: u64,
}

/// Beitritts-Annahme mit neuem Schluesselmaterial
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinAccept {
    pub team_id: TeamId,
    pub epoch: u32,
    /// Echo der Nonce aus dem JoinRequest
    pub nonce_echo: u64,
    pub psk: Psk,
}

/// Beitritts-Bestaetigung des neuen Mitglieds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinConfirm {
    pub team_id: TeamId,
    pub member_id: MemberId,
}

/// Entscheidung des Leaders ueber eine Beitritts-Anfrage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinDecision {
    pub team_id: TeamId,
    pub member_id: MemberId,
    pub angenommen: bool,
}

/// Ausschluss eines Mitglieds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kick {
    pub target: MemberId,
}

/// Uebergabe der Leader-Rolle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLeader {
    pub target: MemberId,
}

/// Schluessel-Verteilung fuer eine neue Epoch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDist {
    pub team_id: TeamId,
    /// Epoch zu der der PSK gehoert
    pub epoch: u32,
    pub psk: Psk,
}

/// Einstellbare Team-Parameter im Status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusParams {
    /// Sende-Intervall fuer Positionsmeldungen in Sekunden
    pub sende_intervall_s: u16,
    /// Geraete-Flags (implementierungsspezifisch)
    pub flags: u16,
}

/// Mitglieder-Liste im Status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roster {
    pub leader_id: MemberId,
    /// Maximal `MAX_ROSTER` Eintraege
    pub mitglieder: Vec<MemberId>,
}

/// Periodischer Team-Status
///
/// Die optionalen Abschnitte sind ueber Flag-Bits signalisiert; ein
/// Routine-Heartbeat traegt nur Hash und Epoch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Hash ueber die sortierte Mitglieder-Liste (siehe `mitglieder_hash`)
    pub member_hash: u32,
    pub epoch: u32,
    pub params: Option<StatusParams>,
    pub roster: Option<Roster>,
}

/// Flag-Bits im Status-Payload
struct StatusFlags;

impl StatusFlags {
    const PARAMS: u8 = 0x01;
    const ROSTER: u8 = 0x02;
}

// ---------------------------------------------------------------------------
// ManagementMessage
// ---------------------------------------------------------------------------

/// Typisierte Management-Nachricht inkl. aeusserem Framing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagementMessage {
    Advertise(Advertise),
    JoinRequest(JoinRequest),
    JoinAccept(JoinAccept),
    JoinConfirm(JoinConfirm),
    JoinDecision(JoinDecision),
    Kick(Kick),
    TransferLeader(TransferLeader),
    KeyDist(KeyDist),
    Status(Status),
}

impl ManagementMessage {
    /// Gibt den Nachrichtentyp zurueck
    pub fn typ(&self) -> MessageType {
        match self {
            Self::Advertise(_) => MessageType::Advertise,
            Self::JoinRequest(_) => MessageType::JoinRequest,
            Self::JoinAccept(_) => MessageType::JoinAccept,
            Self::JoinConfirm(_) => MessageType::JoinConfirm,
            Self::JoinDecision(_) => MessageType::JoinDecision,
            Self::Kick(_) => MessageType::Kick,
            Self::TransferLeader(_) => MessageType::TransferLeader,
            Self::KeyDist(_) => MessageType::KeyDist,
            Self::Status(_) => MessageType::Status,
        }
    }

    /// Serialisiert die Nachricht inkl. Framing in einen Byte-Vec
    pub fn encode(&self) -> WireResult<Vec<u8>> {
        let mut payload = Writer::neu();
        match self {
            Self::Advertise(p) => {
                if p.name.len() > MAX_NAME_LAENGE {
                    return Err(WireError::NutzlastZuGross {
                        laenge: p.name.len(),
                        maximum: MAX_NAME_LAENGE,
                    });
                }
                payload.bytes(p.team_id.as_bytes());
                payload.u32_le(p.leader_id.inner());
                payload.u8(p.name.len() as u8);
                payload.bytes(p.name.as_bytes());
            }
            Self::JoinRequest(p) => {
                payload.bytes(p.team_id.as_bytes());
                payload.u32_le(p.member_id.inner());
                payload.u64_le(p.nonce);
            }
            Self::JoinAccept(p) => {
                payload.bytes(p.team_id.as_bytes());
                payload.u32_le(p.epoch);
                payload.u64_le(p.nonce_echo);
                payload.u8(p.psk.laenge() as u8);
                payload.bytes(p.psk.as_slice());
            }
            Self::JoinConfirm(p) => {
                payload.bytes(p.team_id.as_bytes());
                payload.u32_le(p.member_id.inner());
            }
            Self::JoinDecision(p) => {
                payload.bytes(p.team_id.as_bytes());
                payload.u32_le(p.member_id.inner());
                payload.u8(p.angenommen as u8);
            }
            Self::Kick(p) => {
                payload.u32_le(p.target.inner());
            }
            Self::TransferLeader(p) => {
                payload.u32_le(p.target.inner());
            }
            Self::KeyDist(p) => {
                payload.bytes(p.team_id.as_bytes());
                payload.u32_le(p.epoch);
                payload.u8(p.psk.laenge() as u8);
                payload.bytes(p.psk.as_slice());
            }
            Self::Status(p) => {
                if p.roster
                    .as_ref()
                    .is_some_and(|r| r.mitglieder.len() > MAX_ROSTER)
                {
                    return Err(WireError::NutzlastZuGross {
                        laenge: p.roster.as_ref().map(|r| r.mitglieder.len()).unwrap_or(0),
                        maximum: MAX_ROSTER,
                    });
                }
                let mut flags = 0u8;
                if p.params.is_some() {
                    flags |= StatusFlags::PARAMS;
                }
                if p.roster.is_some() {
                    flags |= StatusFlags::ROSTER;
                }
                payload.u8(flags);
                payload.u32_le(p.member_hash);
                payload.u32_le(p.epoch);
                if let Some(params) = &p.params {
                    payload.u16_le(params.sende_intervall_s);
                    payload.u16_le(params.flags);
                }
                if let Some(roster) = &p.roster {
                    payload.u32_le(roster.leader_id.inner());
                    payload.u8(roster.mitglieder.len() as u8);
                    for m in &roster.mitglieder {
                        payload.u32_le(m.inner());
                    }
                }
            }
        }

        let payload = payload.fertig();
        let mut w = Writer::mit_kapazitaet(6 + payload.len());
        w.u8(MESSAGE_VERSION);
        w.u8(self.typ() as u8);
        w.u16_le(0); // reserviert
        w.u16_le(payload.len() as u16);
        w.bytes(&payload);
        Ok(w.fertig())
    }

    /// Deserialisiert eine Nachricht aus einem Byte-Slice
    ///
    /// # Fehler
    /// - `UnbekannteVersion` bei Versions-Mismatch
    /// - `UnbekannterTyp` bei unbekanntem Nachrichtentyp
    /// - `Abgeschnitten` / `UngueltigesFeld` bei kaputtem Payload
    pub fn decode(daten: &[u8]) -> WireResult<Self> {
        let mut r = Reader::neu(daten);

        let version = r.u8()?;
        if version != MESSAGE_VERSION {
            return Err(WireError::UnbekannteVersion {
                erwartet: MESSAGE_VERSION,
                erhalten: version,
            });
        }

        let typ_byte = r.u8()?;
        let typ = MessageType::from_u8(typ_byte).ok_or(WireError::UnbekannterTyp(typ_byte))?;
        let _reserviert = r.u16_le()?;
        let payload_laenge = r.u16_le()? as usize;
        let payload = r.bytes(payload_laenge)?;
        r.fertig()?;

        let mut p = Reader::neu(payload);
        let nachricht = match typ {
            MessageType::Advertise => {
                let team_id = TeamId::from_bytes(p.array()?);
                let leader_id = MemberId::new(p.u32_le()?);
                let name_laenge = p.u8()? as usize;
                if name_laenge > MAX_NAME_LAENGE {
                    return Err(WireError::UngueltigesFeld("Team-Name zu lang"));
                }
                let name = String::from_utf8(p.bytes(name_laenge)?.to_vec())
                    .map_err(|_| WireError::UngueltigesFeld("Team-Name kein UTF-8"))?;
                Self::Advertise(Advertise {
                    team_id,
                    leader_id,
                    name,
                })
            }
            MessageType::JoinRequest => Self::JoinRequest(JoinRequest {
                team_id: TeamId::from_bytes(p.array()?),
                member_id: MemberId::new(p.u32_le()?),
                nonce: p.u64_le()?,
            }),
            MessageType::JoinAccept => {
                let team_id = TeamId::from_bytes(p.array()?);
                let epoch = p.u32_le()?;
                let nonce_echo = p.u64_le()?;
                let psk = decode_psk(&mut p)?;
                Self::JoinAccept(JoinAccept {
                    team_id,
                    epoch,
                    nonce_echo,
                    psk,
                })
            }
            MessageType::JoinConfirm => Self::JoinConfirm(JoinConfirm {
                team_id: TeamId::from_bytes(p.array()?),
                member_id: MemberId::new(p.u32_le()?),
            }),
            MessageType::JoinDecision => Self::JoinDecision(JoinDecision {
                team_id: TeamId::from_bytes(p.array()?),
                member_id: MemberId::new(p.u32_le()?),
                angenommen: p.u8()? != 0,
            }),
            MessageType::Kick => Self::Kick(Kick {
                target: MemberId::new(p.u32_le()?),
            }),
            MessageType::TransferLeader => Self::TransferLeader(TransferLeader {
                target: MemberId::new(p.u32_le()?),
            }),
            MessageType::KeyDist => {
                let team_id = TeamId::from_bytes(p.array()?);
                let epoch = p.u32_le()?;
                let psk = decode_psk(&mut p)?;
                Self::KeyDist(KeyDist {
                    team_id,
                    epoch,
                    psk,
                })
            }
            MessageType::Status => {
                let flags = p.u8()?;
                let member_hash = p.u32_le()?;
                let epoch = p.u32_le()?;
                let params = if flags & StatusFlags::PARAMS != 0 {
                    Some(StatusParams {
                        sende_intervall_s: p.u16_le()?,
                        flags: p.u16_le()?,
                    })
                } else {
                    None
                };
                let roster = if flags & StatusFlags::ROSTER != 0 {
                    let leader_id = MemberId::new(p.u32_le()?);
                    let anzahl = p.u8()? as usize;
                    if anzahl > MAX_ROSTER {
                        return Err(WireError::UngueltigesFeld("Roster zu gross"));
                    }
                    let mut mitglieder = Vec::with_capacity(anzahl);
                    for _ in 0..anzahl {
                        mitglieder.push(MemberId::new(p.u32_le()?));
                    }
                    Some(Roster {
                        leader_id,
                        mitglieder,
                    })
                } else {
                    None
                };
                Self::Status(Status {
                    member_hash,
                    epoch,
                    params,
                    roster,
                })
            }
        };

        p.fertig()?;
        Ok(nachricht)
    }
}

/// Liest einen PSK mit explizitem Laengen-Byte
///
/// Laengen ueber der festen Kapazitaet werden abgelehnt, nie
/// stillschweigend abgeschnitten.
fn decode_psk(r: &mut Reader<'_>) -> WireResult<Psk> {
    let laenge = r.u8()? as usize;
    if laenge > Psk::KAPAZITAET {
        return Err(WireError::UngueltigesFeld("PSK zu lang"));
    }
    let bytes = r.bytes(laenge)?;
    Psk::aus_slice(bytes).ok_or(WireError::UngueltigesFeld("PSK zu lang"))
}

// ---------------------------------------------------------------------------
// Mitglieder-Hash
// ---------------------------------------------------------------------------

/// Hash ueber eine Mitglieder-Liste (FNV-1a ueber die sortierten IDs)
///
/// Beide Seiten des Funknetzes muessen denselben Wert berechnen; die
/// Liste wird deshalb vor dem Hashen sortiert, die Reihenfolge beim
/// Aufrufer spielt keine Rolle.
pub fn mitglieder_hash(mitglieder: &[MemberId]) -> u32 {
    const FNV_OFFSET: u32 = 0x811C_9DC5;
    const FNV_PRIME: u32 = 0x0100_0193;

    let mut sortiert: Vec<u32> = mitglieder.iter().map(|m| m.inner()).collect();
    sortiert.sort_unstable();

    let mut hash = FNV_OFFSET;
    for id in sortiert {
        for byte in id.to_le_bytes() {
            hash ^= byte as u32;
            hash = hash.wrapping_mul(FNV_PRIME);
        }
    }
    hash
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
