//! Symmetric encryption for OAuth token confidentiality (spec §4.2 / C2).
//!
//! `ChaCha20Poly1305` keyed from `ENCRYPTION_KEY`, chosen per the Open
//! Question resolution in `SPEC_FULL.md` §12.3: an authenticated
//! construction, replacing the source's non-AEAD deterministic cipher.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use thiserror::Error;

const KEY_BYTES: usize = 32;
const NONCE_BYTES: usize = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("ENCRYPTION_KEY must decode to exactly 32 bytes (got {0})")]
    InvalidKeyLength(usize),

    #[error("ENCRYPTION_KEY is not valid hex")]
    InvalidKeyEncoding,

    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed — wrong key or corrupted ciphertext")]
    Decrypt,
}

/// A 256-bit symmetric key, immutable for the process lifetime (loaded
/// once at startup per §5's shared resource policy).
#[derive(Clone)]
pub struct TokenCipher {
    cipher: ChaCha20Poly1305,
}

impl TokenCipher {
    /// `ENCRYPTION_KEY` is read as a 64-character hex string (32 raw
    /// bytes). A malformed or wrong-length key is a fatal configuration
    /// error, never silently truncated or padded.
    pub fn from_hex_key(raw: &str) -> Result<Self, CryptoError> {
        let bytes = hex::decode(raw).map_err(|_| CryptoError::InvalidKeyEncoding)?;
        if bytes.len() != KEY_BYTES {
            return Err(CryptoError::InvalidKeyLength(bytes.len()));
        }
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&bytes));
        Ok(Self { cipher })
    }

    /// Encrypts `plaintext` under a freshly generated random nonce.
    /// Returns `(ciphertext, nonce)` — both persisted alongside each other,
    /// never the plaintext.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>), CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_BYTES];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = self.cipher.encrypt(nonce, plaintext).map_err(|_| CryptoError::Encrypt)?;
        Ok((ciphertext, nonce_bytes.to_vec()))
    }

    pub fn decrypt(&self, ciphertext: &[u8], nonce: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if nonce.len() != NONCE_BYTES {
            return Err(CryptoError::Decrypt);
        }
        let nonce = Nonce::from_slice(nonce);
        self.cipher.decrypt(nonce, ciphertext).map_err(|_| CryptoError::Decrypt)
    }
}
