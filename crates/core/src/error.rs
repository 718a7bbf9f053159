//! Fehlertypen fuer Teamfunk
//!
//! Zentraler Fehler-Enum fuer die Kompositionsebene. Die Fach-Crates
//! (Protokoll, Krypto, Team) definieren eigene, praezisere Fehler und
//! werden an der Aussengrenze in diesen Typ ueberfuehrt.

use thiserror::Error;

/// Globaler Result-Alias fuer Teamfunk
pub type Result<T> = std::result::Result<T, TeamfunkError>;

/// Fehler auf der Kompositionsebene
#[derive(Debug, Error)]
pub enum TeamfunkError {
    #[error("Konfigurationsfehler: {0}")]
    Konfiguration(String),

    #[error("Transportfehler: {0}")]
    Transport(String),

    #[error("Kein aktives Team")]
    KeinTeam,

    #[error("Interner Fehler: {0}")]
    Intern(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl TeamfunkError {
    /// Erstellt einen internen Fehler aus einer beliebigen Nachricht
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }
}
