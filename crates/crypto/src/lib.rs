//! Teamfunk Krypto – Key-Derivation und authentisierte Verschluesselung
//!
//! Stellt die `CryptoProvider`-Capability bereit an der der
//! Protokoll-Kern haengt, zwei AEAD-Implementierungen (AES-256-GCM,
//! ChaCha20-Poly1305) sowie den `KeySet` mit den vier Kanal-Schluesseln
//! eines Teams.

pub mod aead;
pub mod error;
pub mod keyset;
pub mod provider;
pub mod types;

pub use aead::{Aes256GcmProvider, ChaCha20Poly1305Provider};
pub use error::{CryptoError, CryptoResult};
pub use keyset::{zufalls_psk, KeySet};
pub use provider::{CryptoProvider, NONCE_LAENGE, SCHLUESSEL_LAENGE, TAG_LAENGE};
pub use types::SecretBytes;
