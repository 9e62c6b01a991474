//! Random tokens and identifiers.

use rand::{Rng, distributions::Alphanumeric, rngs::OsRng};

/// Generate a random alphanumeric string of `length` characters.
///
/// Drawn from the operating system CSPRNG; used for session tokens, client
/// keys and user public identifiers.
pub fn generate_token(length: usize) -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// Generate a version 4 UUID for internal correlation.
pub fn generate_identifier() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Generate an account recovery secret of the form `XXXX-XXXX-XXXX-XXXX`.
pub fn generate_recovery_secret() -> String {
    (0..4)
        .map(|_| generate_token(4))
        .collect::<Vec<_>>()
        .join("-")
        .to_uppercase()
}
