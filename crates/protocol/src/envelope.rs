//! Verschluesselter Umschlag – das aeussere Wire-Format
//!
//! Jedes Team-Paket auf dem Funknetz traegt diesen Umschlag. Der Header
//! ist fest 28 Bytes, gefolgt von einem 2-Byte Laengenfeld und dem
//! Ciphertext. Alle Mehr-Byte-Felder sind little-endian.
//!
//! ## Paketformat
//!
//! ```text
//! Offset  Len  Beschreibung
//! ------  ---  -----------
//!  0       1   Version
//!  1       1   AAD-Flags
//!  2       2   Reserviert (0)
//!  4       4   Epoch
//!  8       8   Team-ID
//! 16      12   Nonce
//! 28       2   Cipher-Laenge
//! 30+      N   Ciphertext (inkl. 16 Byte Auth-Tag)
//! ```
//!
//! ## AAD
//!
//! In die AEAD-Authentisierung geht exakt
//! `version || aad_flags || epoch || team_id` (14 Bytes) ein. Damit kann
//! Ciphertext eines Teams oder einer Epoch nie fuer ein anderes
//! Team / eine andere Epoch als gueltig akzeptiert werden.

use teamfunk_core::TeamId;

use crate::cursor::{Reader, Writer};
use crate::error::{WireError, WireResult};

/// Aktuelle Umschlag-Version
pub const ENVELOPE_VERSION: u8 = 1;

/// Feste Header-Groesse (bis einschliesslich Nonce)
pub const HEADER_LAENGE: usize = 28;

/// Groesse des Cipher-Laengenfelds
pub const LAENGENFELD: usize = 2;

/// Laenge der AAD-Bytes
pub const AAD_LAENGE: usize = 14;

/// Maximale Ciphertext-Laenge (Laengenfeld ist u16)
pub const MAX_CIPHER_LAENGE: usize = u16::MAX as usize;

/// Bit-Masken fuer das AAD-Flags-Feld
pub struct AadFlags;

impl AadFlags {
    /// Nutzlast ist unverschluesselt (nur Advertise/JoinRequest)
    pub const KLARTEXT: u8 = 0x01;
}

/// Der aeussere verschluesselte Umschlag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedEnvelope {
    /// Umschlag-Version (muss == `ENVELOPE_VERSION` sein)
    pub version: u8,
    /// AAD-Flags (siehe `AadFlags`)
    pub aad_flags: u8,
    /// Schluessel-Generation des Teams
    pub epoch: u32,
    /// Team zu dem das Paket gehoert
    pub team_id: TeamId,
    /// Frische Zufalls-Nonce (bei Klartext-Frames 0)
    pub nonce: [u8; 12],
    /// Ciphertext inkl. Auth-Tag, bzw. Klartext-Nutzlast bei gesetztem
    /// `KLARTEXT`-Flag
    pub ciphertext: Vec<u8>,
}

impl EncryptedEnvelope {
    /// Erstellt einen Umschlag mit der aktuellen Version
    pub fn neu(
        aad_flags: u8,
        epoch: u32,
        team_id: TeamId,
        nonce: [u8; 12],
        ciphertext: Vec<u8>,
    ) -> Self {
        Self {
            version: ENVELOPE_VERSION,
            aad_flags,
            epoch,
            team_id,
            nonce,
            ciphertext,
        }
    }

    /// Prueft ob das Klartext-Flag gesetzt ist
    pub fn ist_klartext(&self) -> bool {
        self.aad_flags & AadFlags::KLARTEXT != 0
    }

    /// Baut die AAD-Bytes: `version || aad_flags || epoch || team_id`
    pub fn aad(&self) -> [u8; AAD_LAENGE] {
        let mut aad = [0u8; AAD_LAENGE];
        aad[0] = self.version;
        aad[1] = self.aad_flags;
        aad[2..6].copy_from_slice(&self.epoch.to_le_bytes());
        aad[6..14].copy_from_slice(self.team_id.as_bytes());
        aad
    }

    /// Serialisiert den Umschlag in einen Byte-Vec
    ///
    /// # Fehler
    /// - `NutzlastZuGross` wenn der Ciphertext das u16-Laengenfeld sprengt
    pub fn encode(&self) -> WireResult<Vec<u8>> {
        if self.ciphertext.len() > MAX_CIPHER_LAENGE {
            return Err(WireError::NutzlastZuGross {
                laenge: self.ciphertext.len(),
                maximum: MAX_CIPHER_LAENGE,
            });
        }

        let mut w =
            Writer::mit_kapazitaet(HEADER_LAENGE + LAENGENFELD + self.ciphertext.len());
        w.u8(self.version);
        w.u8(self.aad_flags);
        w.u16_le(0); // reserviert
        w.u32_le(self.epoch);
        w.bytes(self.team_id.as_bytes());
        w.bytes(&self.nonce);
        w.u16_le(self.ciphertext.len() as u16);
        w.bytes(&self.ciphertext);
        Ok(w.fertig())
    }

    /// Deserialisiert einen Umschlag aus einem Byte-Slice
    ///
    /// Rein strukturell: die Version wird hier nicht geprueft, das ist
    /// Aufgabe der Empfangsschicht (die daraus einen eigenen Fehlertyp
    /// macht). Jeder Feldzugriff ist gegen die Puffer-Laenge geprueft;
    /// ein `cipher_len` das mehr Bytes verspricht als vorhanden sind
    /// ergibt `Abgeschnitten` und liest nie ueber das Slice hinaus.
    pub fn decode(daten: &[u8]) -> WireResult<Self> {
        let mut r = Reader::neu(daten);

        let version = r.u8()?;
        let aad_flags = r.u8()?;
        let _reserviert = r.u16_le()?;
        let epoch = r.u32_le()?;
        let team_id = TeamId::from_bytes(r.array()?);
        let nonce: [u8; 12] = r.array()?;
        let cipher_laenge = r.u16_le()? as usize;
        let ciphertext = r.bytes(cipher_laenge)?.to_vec();
        r.fertig()?;

        Ok(Self {
            version,
            aad_flags,
            epoch,
            team_id,
            nonce,
            ciphertext,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
