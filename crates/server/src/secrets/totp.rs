//! Time-based one-time passcodes (RFC 6238: SHA-1, 6 digits, 30 second step).

use totp_rs::{Algorithm, Secret, TOTP};

use crate::error::SecretError;

const DIGITS: usize = 6;
const STEP: u64 = 30;
/// Number of adjacent steps accepted on either side of the current one.
const SKEW: u8 = 1;

/// A freshly generated seed, returned once so the user can enrol a device.
#[derive(Debug, Clone)]
pub struct TotpSeed {
    /// Base32-encoded shared secret.
    pub secret: String,
    /// `otpauth://` provisioning URI for QR codes.
    pub provisioning_uri: String,
}

fn build(seed: &str, issuer: Option<String>, account: String) -> Result<TOTP, SecretError> {
    let bytes = Secret::Encoded(seed.to_owned())
        .to_bytes()
        .map_err(|e| SecretError::Totp(format!("{e:?}")))?;
    TOTP::new(Algorithm::SHA1, DIGITS, SKEW, STEP, bytes, issuer, account)
        .map_err(|e| SecretError::Totp(e.to_string()))
}

/// Generate a new seed for `account_label`, issued by `issuer`.
pub fn generate_totp_seed(issuer: &str, account_label: &str) -> Result<TotpSeed, SecretError> {
    let secret = Secret::generate_secret().to_encoded().to_string();
    let totp = build(&secret, Some(issuer.to_owned()), account_label.to_owned())?;
    Ok(TotpSeed {
        provisioning_uri: totp.get_url(),
        secret,
    })
}

/// Check `code` against `seed` at the current time.
pub fn validate_totp(code: &str, seed: &str) -> bool {
    let Ok(totp) = build(seed, None, String::new()) else {
        return false;
    };
    totp.check_current(code.trim()).unwrap_or(false)
}

/// Compute the passcode an authenticator app would show right now.
pub fn current_passcode(seed: &str) -> Result<String, SecretError> {
    build(seed, None, String::new())?
        .generate_current()
        .map_err(|e| SecretError::Totp(e.to_string()))
}
