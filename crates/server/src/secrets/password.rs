//! Secret hashing and verification.
//!
//! Uses Argon2id; the PHC string carries its own salt and cost parameters,
//! so hashes produced with older parameters keep verifying.

use std::sync::LazyLock;

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::error::SecretError;

/// Hash a secret using Argon2id.
///
/// Returns the PHC-formatted hash string suitable for storage.
pub fn hash_secret(plain: &str) -> Result<String, SecretError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map_err(|e| SecretError::Hash(e.to_string()))?;
    Ok(hash.to_string())
}

/// Verify a secret against a stored hash.
///
/// A malformed stored hash never matches.
pub fn verify_secret(hash: &str, plain: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(plain.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Hash of a throwaway secret, computed once with the same parameters as
/// stored hashes.
static DECOY_HASH: LazyLock<String> =
    LazyLock::new(|| hash_secret("space-decoy-secret").unwrap_or_default());

/// Run a full verification against a decoy hash and discard the result.
///
/// Lookups that miss call this so they cost as much as a wrong secret.
pub fn verify_decoy(plain: &str) {
    let _ = verify_secret(&DECOY_HASH, plain);
}
