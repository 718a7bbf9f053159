//! Teamfunk Team – der sichere Gruppen-Kanal
//!
//! Kernstueck des Team-Protokolls: der `SecureChannelService`
//! entschluesselt, validiert und verteilt eingehende Frames und
//! verschluesselt ausgehende Kommandos; die `KeyRotationPolicy` rotiert
//! das Schluesselmaterial bei jeder Mitgliedschafts-Aenderung und
//! verfolgt dessen Zustellung; der `TeamCommander` ist die duenne
//! Kommando-Fassade fuer die Bedienebene.
//!
//! Alles laeuft kooperativ aus einer Poll-Schleife; keine Operation
//! blockiert oder wiederholt intern.

pub mod error;
pub mod event;
pub mod facade;
pub mod mailbox;
pub mod rotation;
pub mod service;
pub mod transport;

pub use error::{SendError, SendResult, TeamError};
pub use event::{ReceiveFailure, SammelSenke, TeamEvent, TeamEventSink};
pub use facade::TeamCommander;
pub use mailbox::Mailbox;
pub use rotation::{KeyRotationPolicy, RotationsKonfig};
pub use service::SecureChannelService;
pub use transport::{MeshEingang, MeshTransport, MeshZiel};
