//! Authenticated encryption for TOTP seeds at rest.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng},
};
use base64::Engine;
use sha2::{Digest, Sha256};

use crate::error::SecretError;

const NONCE_LEN: usize = 12;

/// AES-256-GCM cipher keyed by the process-wide storage secret.
///
/// Built once at startup from configuration and handed to every component
/// that reads or writes encrypted columns. Ciphertexts are stored as
/// base64(nonce || ciphertext || tag).
#[derive(Clone)]
pub struct SeedCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for SeedCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeedCipher").finish_non_exhaustive()
    }
}

impl SeedCipher {
    /// Derive the 256-bit key from arbitrary key material.
    pub fn new(master_key: &str) -> Result<Self, SecretError> {
        let key = Sha256::digest(master_key.as_bytes());
        let cipher =
            Aes256Gcm::new_from_slice(&key).map_err(|e| SecretError::Cipher(e.to_string()))?;
        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, SecretError> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| SecretError::Cipher(e.to_string()))?;

        let mut sealed = nonce.to_vec();
        sealed.extend_from_slice(&ciphertext);
        Ok(base64::engine::general_purpose::STANDARD.encode(sealed))
    }

    /// Decrypt a value produced by [`SeedCipher::encrypt`].
    ///
    /// Tampered input or a different key yields an error, never garbage.
    pub fn decrypt(&self, sealed: &str) -> Result<Vec<u8>, SecretError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(sealed)
            .map_err(|_| SecretError::MalformedCiphertext)?;
        if bytes.len() <= NONCE_LEN {
            return Err(SecretError::MalformedCiphertext);
        }

        let (nonce, ciphertext) = bytes.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| SecretError::Cipher(e.to_string()))
    }
}
