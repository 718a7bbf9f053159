//! Teamfunk Core – gemeinsame Typen fuer alle Teamfunk-Crates
//!
//! Enthaelt die Identifikationstypen (Team, Mitglied), den Kontext der
//! an jedes dekodierte Ereignis angehaengt wird, sowie den zentralen
//! Fehler-Typ fuer die Kompositionsebene.

pub mod error;
pub mod types;

pub use error::{Result, TeamfunkError};
pub use types::{EventContext, MemberId, Psk, TeamId};
