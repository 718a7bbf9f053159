//! Fehlertypen fuer die Wire-Codecs

use thiserror::Error;

/// Fehler beim Kodieren oder Dekodieren von Wire-Formaten
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Der Puffer endet bevor das Feld vollstaendig gelesen werden konnte
    #[error("Puffer abgeschnitten: {benoetigt} Bytes benoetigt, {verfuegbar} verfuegbar")]
    Abgeschnitten { benoetigt: usize, verfuegbar: usize },

    #[error("Nutzlast zu gross: {laenge} Bytes (Maximum {maximum})")]
    NutzlastZuGross { laenge: usize, maximum: usize },

    #[error("Unbekannte Protokollversion: {erhalten} (erwartet {erwartet})")]
    UnbekannteVersion { erwartet: u8, erhalten: u8 },

    #[error("Unbekannter Nachrichtentyp: {0}")]
    UnbekannterTyp(u8),

    #[error("Ungueltiges Feld: {0}")]
    UngueltigesFeld(&'static str),
}

pub type WireResult<T> = Result<T, WireError>;
