//! Teamfunk Pairing – der Bootstrap-Handshake
//!
//! Etabliert das allererste Epoch-Schluesselmaterial zwischen einem
//! Team-Leader und einem beitretenden Geraet, ohne den Team-Kanal selbst
//! zu brauchen (den gibt es zu diesem Zeitpunkt noch nicht). Laeuft
//! ueber einen nackten Broadcast/Unicast-Transport und uebergibt sein
//! Ergebnis als `SchluesselEtabliert` an den Team-Kanal.
//!
//! Leader und Mitglied sind eigenstaendige Zustandsmaschinen mit
//! expliziten Fristen; beide werden per `update(jetzt_ms)` aus der
//! kooperativen Poll-Schleife getrieben und lesen selbst keine Uhr.

pub mod config;
pub mod leader;
pub mod member;
pub mod transport;
pub mod wire;

pub use config::PairingKonfig;
pub use leader::{LeaderPairing, LeaderZustand, PairingAngebot};
pub use member::{MemberPairing, MemberZustand, SchluesselEtabliert};
pub use transport::BootstrapTransport;
pub use wire::PairingMessage;
