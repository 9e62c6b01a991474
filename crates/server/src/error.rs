use sea_orm::DbErr;
use thiserror::Error;
use validator::ValidationErrors;

use crate::oauth2::ProtocolError;

/// Failure of a secret or identity primitive.
///
/// Always fatal for the mutation being performed: nothing is persisted when
/// one of these surfaces.
#[derive(Debug, Error)]
pub enum SecretError {
    #[error("Secret hashing failed: {0}")]
    Hash(String),
    #[error("Cipher failure: {0}")]
    Cipher(String),
    #[error("Ciphertext is not in the expected format")]
    MalformedCiphertext,
    #[error("TOTP failure: {0}")]
    Totp(String),
}

/// Errors raised while creating or mutating clients and users.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Secret(#[from] SecretError),
    #[error("Database error: {0}")]
    Store(#[from] DbErr),
}

/// Outcome of a failed grant step.
///
/// `Protocol` is an expected, named rejection that callers hand back to the
/// client application. Everything else is an internal fault whose detail must
/// not leave the server.
#[derive(Debug, Error)]
pub enum GrantError {
    #[error("Protocol error: {}", .0.error)]
    Protocol(#[from] ProtocolError),
    #[error("Database error: {0}")]
    Store(#[from] DbErr),
}
