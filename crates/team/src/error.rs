//! Fehlertypen des Team-Kanals

use thiserror::Error;

/// Fehler beim Senden ueber den sicheren Team-Kanal
///
/// Jede Sende-Operation gibt ihr Ergebnis synchron zurueck; der Dienst
/// selbst wiederholt nie – Retry-Politik lebt ausschliesslich in der
/// Schluessel-Rotation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// Verschluesseltes Senden ohne gueltigen Schluesselsatz
    #[error("Kein gueltiger Schluesselsatz vorhanden")]
    SchluesselFehlen,

    /// Lokaler Kodierungs-Fehler (sollte ohne Bugs nicht auftreten)
    #[error("Kodierung fehlgeschlagen: {0}")]
    Kodierung(#[from] teamfunk_protocol::WireError),

    /// Lokaler Verschluesselungs-Fehler (sollte ohne Bugs nicht auftreten)
    #[error("Verschluesselung fehlgeschlagen")]
    Verschluesselung,

    /// Sende-Queue des Mesh-Transports ist voll – Backpressure wird dem
    /// Aufrufer gemeldet, nie stillschweigend geschluckt
    #[error("Mesh-Transport hat das Paket nicht angenommen")]
    MeshVersand,
}

pub type SendResult = Result<(), SendError>;

/// Fehler der Team-Operationen (Rotation, Fassade)
#[derive(Debug, Error)]
pub enum TeamError {
    #[error(transparent)]
    Versand(#[from] SendError),

    #[error("Krypto-Fehler: {0}")]
    Krypto(#[from] teamfunk_crypto::CryptoError),

    #[error("Operation erfordert die Leader-Rolle")]
    NichtLeader,

    #[error("Kein aktives Team")]
    KeinTeam,

    #[error("Zugriff auf das Team wurde widerrufen")]
    Widerrufen,
}
