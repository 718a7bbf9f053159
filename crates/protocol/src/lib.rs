//! Teamfunk Protokoll – binaere Wire-Formate
//!
//! Definiert den aeusseren verschluesselten Umschlag, die inneren
//! Management-Nachrichten und die logischen Kanal-Kennungen des
//! Team-Protokolls. Alle Formate sind little-endian und werden ueber
//! einen bounds-gecheckten Cursor gelesen – Truncation ist ein typisierter,
//! behandelbarer Fehler, nie ein Out-of-Bounds-Zugriff.

pub mod channel;
pub mod cursor;
pub mod envelope;
pub mod error;
pub mod message;

pub use channel::{TeamChannel, PORT_TEAM};
pub use envelope::{AadFlags, EncryptedEnvelope, ENVELOPE_VERSION};
pub use error::{WireError, WireResult};
pub use message::{ManagementMessage, MessageType};
