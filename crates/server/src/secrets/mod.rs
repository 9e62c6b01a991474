//! Secret & identity primitives.
//!
//! Everything that touches key material or randomness lives here so the
//! entity and protocol layers never reach for a crypto crate directly:
//!
//! - [`hash_secret`] / [`verify_secret`] - Argon2id hashing for client
//!   secrets, passphrases and recovery secrets; [`verify_decoy`] spends the
//!   same work when there is nothing to verify against
//! - [`SeedCipher`] - authenticated encryption of TOTP seeds at rest
//! - [`generate_token`] / [`generate_identifier`] - random opaque values
//! - [`generate_totp_seed`] / [`validate_totp`] - time-based passcodes

mod cipher;
mod password;
mod random;
mod totp;

pub use cipher::SeedCipher;
pub use password::{hash_secret, verify_decoy, verify_secret};
pub use random::{generate_identifier, generate_recovery_secret, generate_token};
pub use totp::{TotpSeed, current_passcode, generate_totp_seed, validate_totp};

/// Length of session tokens (grant, access, refresh and action tokens).
pub const SESSION_TOKEN_LENGTH: usize = 64;

/// Length of client keys and user public identifiers.
pub const PUBLIC_KEY_LENGTH: usize = 32;
