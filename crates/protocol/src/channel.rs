//! Logische Kanaele des Team-Protokolls
//!
//! Die Kanal-Kennungen multiplexen Management-, Positions-, Wegpunkt-,
//! Chat- und Track-Verkehr ueber einen Transport. Sie sind ein fester
//! Vertrag: beide Seiten des Funknetzes muessen exakt dieselben Werte
//! verwenden.

use serde::{Deserialize, Serialize};

/// Portnummer unter der saemtlicher Team-Verkehr im Funknetz laeuft
pub const PORT_TEAM: u16 = 0x5446;

/// Logischer Kanal eines Team-Pakets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TeamChannel {
    /// Management-Nachrichten (Join, Kick, Key-Distribution, Status, ...)
    Management = 1,
    /// Positionsmeldungen
    Position = 2,
    /// Wegpunkte
    Waypoint = 3,
    /// Text-Chat
    Chat = 4,
    /// Track-Telemetrie (Positionsverlauf)
    Track = 5,
}

impl TeamChannel {
    /// Konvertiert ein Byte in einen `TeamChannel`
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(Self::Management),
            2 => Some(Self::Position),
            3 => Some(Self::Waypoint),
            4 => Some(Self::Chat),
            5 => Some(Self::Track),
            _ => None,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

impl std::fmt::Display for TeamChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Management => "management",
            Self::Position => "position",
            Self::Waypoint => "waypoint",
            Self::Chat => "chat",
            Self::Track => "track",
        };
        write!(f, "{}", name)
    }
}
