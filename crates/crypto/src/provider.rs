//! Krypto-Faehigkeit als Capability-Trait
//!
//! Der Protokoll-Kern haengt ausschliesslich an diesem Interface; die
//! konkreten AEAD-Implementierungen (AES-256-GCM, ChaCha20-Poly1305)
//! sind austauschbar.

use crate::error::CryptoResult;
use crate::types::SecretBytes;

/// Laenge einer AEAD-Nonce in Bytes
pub const NONCE_LAENGE: usize = 12;

/// Laenge eines abgeleiteten Kanal-Schluessels in Bytes
pub const SCHLUESSEL_LAENGE: usize = 32;

/// Laenge des Auth-Tags das der AEAD-Ciphertext traegt
pub const TAG_LAENGE: usize = 16;

/// Kryptografie-Faehigkeit des Team-Protokolls
///
/// Vertrag:
/// - `derive_key` ist deterministisch und liefert fuer verschiedene
///   `info`-Tags unabhaengige Schluessel aus demselben Secret.
/// - `aead_decrypt` schlaegt geschlossen fehl: jede Ein-Bit-Aenderung an
///   Ciphertext, Tag, Nonce oder AAD ergibt einen Fehler, und es wird
///   nie Teil-Klartext herausgegeben.
/// - `(key, nonce)`-Paare werden fuer verschiedene Klartexte nie
///   wiederverwendet; Nonces kommen aus `fill_random` (OS-CSPRNG).
pub trait CryptoProvider {
    /// Deterministische Key-Derivation (ein Schluessel pro `info`-Tag)
    fn derive_key(&self, secret: &[u8], info: &[u8]) -> CryptoResult<SecretBytes>;

    /// Authentisierte Verschluesselung; gibt `ciphertext || tag` zurueck
    fn aead_encrypt(
        &self,
        key: &SecretBytes,
        nonce: &[u8; NONCE_LAENGE],
        aad: &[u8],
        plaintext: &[u8],
    ) -> CryptoResult<Vec<u8>>;

    /// Authentisierte Entschluesselung von `ciphertext || tag`
    fn aead_decrypt(
        &self,
        key: &SecretBytes,
        nonce: &[u8; NONCE_LAENGE],
        aad: &[u8],
        ciphertext: &[u8],
    ) -> CryptoResult<Vec<u8>>;

    /// Fuellt den Puffer mit kryptografisch sicherem Zufall
    fn fill_random(&self, out: &mut [u8]);

    /// Erzeugt eine frische Zufalls-Nonce
    fn frische_nonce(&self) -> [u8; NONCE_LAENGE] {
        let mut nonce = [0u8; NONCE_LAENGE];
        self.fill_random(&mut nonce);
        nonce
    }
}
