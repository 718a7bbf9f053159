//! AEAD-Provider-Implementierungen
//!
//! Zwei Implementierungen des `CryptoProvider`-Traits: AES-256-GCM
//! (Standard) und ChaCha20-Poly1305 (fuer Plattformen ohne AES-Hardware).
//! Key-Derivation laeuft bei beiden ueber HKDF-SHA256 mit `info`-Tag-
//! Separation.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce as AesNonce,
};
use chacha20poly1305::{ChaCha20Poly1305, Key as ChaChaKey, Nonce as ChaChaNonce};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;

use crate::error::{CryptoError, CryptoResult};
use crate::provider::{CryptoProvider, NONCE_LAENGE, SCHLUESSEL_LAENGE};
use crate::types::SecretBytes;

/// HKDF-SHA256 Key-Derivation (deterministisch, Tag-separiert)
pub fn hkdf_derive(secret: &[u8], info: &[u8], laenge: usize) -> CryptoResult<SecretBytes> {
    if secret.is_empty() {
        return Err(CryptoError::LeererSchluessel);
    }
    let hk = Hkdf::<Sha256>::new(None, secret);
    let mut okm = vec![0u8; laenge];
    hk.expand(info, &mut okm)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(SecretBytes::new(okm))
}

fn pruefe_schluessel(key: &SecretBytes) -> CryptoResult<()> {
    if key.len() != SCHLUESSEL_LAENGE {
        return Err(CryptoError::UngueltigeSchluesselLaenge {
            erwartet: SCHLUESSEL_LAENGE,
            erhalten: key.len(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// AES-256-GCM
// ---------------------------------------------------------------------------

/// Standard-Provider: AES-256-GCM + HKDF-SHA256
#[derive(Debug, Clone, Copy, Default)]
pub struct Aes256GcmProvider;

impl CryptoProvider for Aes256GcmProvider {
    fn derive_key(&self, secret: &[u8], info: &[u8]) -> CryptoResult<SecretBytes> {
        hkdf_derive(secret, info, SCHLUESSEL_LAENGE)
    }

    fn aead_encrypt(
        &self,
        key: &SecretBytes,
        nonce: &[u8; NONCE_LAENGE],
        aad: &[u8],
        plaintext: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        pruefe_schluessel(key)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
        cipher
            .encrypt(
                AesNonce::from_slice(nonce),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|e| CryptoError::Verschluesselung(e.to_string()))
    }

    fn aead_decrypt(
        &self,
        key: &SecretBytes,
        nonce: &[u8; NONCE_LAENGE],
        aad: &[u8],
        ciphertext: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        pruefe_schluessel(key)?;
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
        cipher
            .decrypt(
                AesNonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| CryptoError::Entschluesselung)
    }

    fn fill_random(&self, out: &mut [u8]) {
        OsRng.fill_bytes(out);
    }
}

// ---------------------------------------------------------------------------
// ChaCha20-Poly1305
// ---------------------------------------------------------------------------

/// Alternativ-Provider: ChaCha20-Poly1305 + HKDF-SHA256
#[derive(Debug, Clone, Copy, Default)]
pub struct ChaCha20Poly1305Provider;

impl CryptoProvider for ChaCha20Poly1305Provider {
    fn derive_key(&self, secret: &[u8], info: &[u8]) -> CryptoResult<SecretBytes> {
        hkdf_derive(secret, info, SCHLUESSEL_LAENGE)
    }

    fn aead_encrypt(
        &self,
        key: &SecretBytes,
        nonce: &[u8; NONCE_LAENGE],
        aad: &[u8],
        plaintext: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        pruefe_schluessel(key)?;
        let cipher = ChaCha20Poly1305::new(ChaChaKey::from_slice(key.as_bytes()));
        cipher
            .encrypt(
                ChaChaNonce::from_slice(nonce),
                chacha20poly1305::aead::Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|e| CryptoError::Verschluesselung(e.to_string()))
    }

    fn aead_decrypt(
        &self,
        key: &SecretBytes,
        nonce: &[u8; NONCE_LAENGE],
        aad: &[u8],
        ciphertext: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        pruefe_schluessel(key)?;
        let cipher = ChaCha20Poly1305::new(ChaChaKey::from_slice(key.as_bytes()));
        cipher
            .decrypt(
                ChaChaNonce::from_slice(nonce),
                chacha20poly1305::aead::Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| CryptoError::Entschluesselung)
    }

    fn fill_random(&self, out: &mut [u8]) {
        OsRng.fill_bytes(out);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::TAG_LAENGE;

    fn test_schluessel(provider: &impl CryptoProvider) -> SecretBytes {
        provider.derive_key(b"test-secret", b"test-info").unwrap()
    }

    fn provider_faelle() -> (Aes256GcmProvider, ChaCha20Poly1305Provider) {
        (Aes256GcmProvider, ChaCha20Poly1305Provider)
    }

    #[test]
    fn derive_key_deterministisch() {
        let (aes, _) = provider_faelle();
        let k1 = aes.derive_key(b"secret", b"info").unwrap();
        let k2 = aes.derive_key(b"secret", b"info").unwrap();
        assert_eq!(k1.as_bytes(), k2.as_bytes());
        assert_eq!(k1.len(), SCHLUESSEL_LAENGE);
    }

    #[test]
    fn verschiedene_infos_geben_unabhaengige_schluessel() {
        let (aes, _) = provider_faelle();
        let k1 = aes.derive_key(b"secret", b"kanal-a").unwrap();
        let k2 = aes.derive_key(b"secret", b"kanal-b").unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn leeres_secret_wird_abgelehnt() {
        let (aes, _) = provider_faelle();
        assert!(aes.derive_key(b"", b"info").is_err());
    }

    #[test]
    fn encrypt_decrypt_roundtrip_aes() {
        let aes = Aes256GcmProvider;
        let key = test_schluessel(&aes);
        let nonce = aes.frische_nonce();
        let aad = b"kontext";
        let klartext = b"team-nachricht";

        let ciphertext = aes.aead_encrypt(&key, &nonce, aad, klartext).unwrap();
        assert_eq!(ciphertext.len(), klartext.len() + TAG_LAENGE);

        let entschluesselt = aes.aead_decrypt(&key, &nonce, aad, &ciphertext).unwrap();
        assert_eq!(entschluesselt, klartext);
    }

    #[test]
    fn encrypt_decrypt_roundtrip_chacha() {
        let chacha = ChaCha20Poly1305Provider;
        let key = test_schluessel(&chacha);
        let nonce = chacha.frische_nonce();

        let ciphertext = chacha.aead_encrypt(&key, &nonce, b"aad", b"daten").unwrap();
        let entschluesselt = chacha.aead_decrypt(&key, &nonce, b"aad", &ciphertext).unwrap();
        assert_eq!(entschluesselt, b"daten");
    }

    #[test]
    fn jedes_gekippte_bit_laesst_entschluesselung_fehlschlagen() {
        let aes = Aes256GcmProvider;
        let key = test_schluessel(&aes);
        let nonce = aes.frische_nonce();
        let aad = [0x10u8, 0x20];
        let ciphertext = aes.aead_encrypt(&key, &nonce, &aad, b"geheim").unwrap();

        // Jedes Byte des Ciphertexts (inkl. Tag) einzeln kippen
        for i in 0..ciphertext.len() {
            let mut manipuliert = ciphertext.clone();
            manipuliert[i] ^= 0x01;
            assert!(
                aes.aead_decrypt(&key, &nonce, &aad, &manipuliert).is_err(),
                "Bit-Kipp an Byte {} muss auffallen",
                i
            );
        }

        // Nonce kippen
        let mut falsche_nonce = nonce;
        falsche_nonce[0] ^= 0x01;
        assert!(aes.aead_decrypt(&key, &falsche_nonce, &aad, &ciphertext).is_err());

        // AAD kippen
        let mut falsche_aad = aad;
        falsche_aad[1] ^= 0x01;
        assert!(aes.aead_decrypt(&key, &nonce, &falsche_aad, &ciphertext).is_err());
    }

    #[test]
    fn falscher_schluessel_schlaegt_fehl() {
        let aes = Aes256GcmProvider;
        let key = aes.derive_key(b"secret", b"a").unwrap();
        let anderer = aes.derive_key(b"secret", b"b").unwrap();
        let nonce = aes.frische_nonce();
        let ciphertext = aes.aead_encrypt(&key, &nonce, b"", b"x").unwrap();
        assert!(aes.aead_decrypt(&anderer, &nonce, b"", &ciphertext).is_err());
    }

    #[test]
    fn kurzer_schluessel_wird_abgelehnt() {
        let aes = Aes256GcmProvider;
        let kurz = SecretBytes::new(vec![0u8; 16]);
        let nonce = [0u8; NONCE_LAENGE];
        let err = aes.aead_encrypt(&kurz, &nonce, b"", b"x").unwrap_err();
        assert!(matches!(err, CryptoError::UngueltigeSchluesselLaenge { .. }));
    }

    #[test]
    fn frische_nonces_sind_verschieden() {
        let aes = Aes256GcmProvider;
        let n1 = aes.frische_nonce();
        let n2 = aes.frische_nonce();
        assert_ne!(n1, n2);
    }
}
