use sea_orm::{ActiveModelTrait, ActiveValue::Set, ConnectionTrait};
use time::OffsetDateTime;
use validator::{Validate, ValidationError, ValidationErrors};

use super::validate_alphanumeric;
use crate::entity::user;
use crate::error::AccountError;
use crate::secrets::{
    PUBLIC_KEY_LENGTH, SeedCipher, TotpSeed, generate_identifier, generate_recovery_secret,
    generate_token, generate_totp_seed, hash_secret,
};

const MIN_PASSPHRASE_LENGTH: u64 = 10;

/// Signup data for a new user.
#[derive(Debug, Clone, Validate)]
pub struct NewUser {
    #[validate(length(min = 1, max = 60), custom(function = "validate_alphanumeric"))]
    pub username: String,
    #[validate(length(min = 3, max = 20))]
    pub first_name: String,
    #[validate(length(min = 3, max = 20))]
    pub last_name: String,
    #[validate(email)]
    pub email: String,
    /// Plaintext passphrase; hashed before the row is built
    #[validate(length(min = 10))]
    pub passphrase: String,
    pub client_id: String,
    pub language: String,
    pub timezone_identifier: String,
}

impl Default for NewUser {
    fn default() -> Self {
        Self {
            username: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            email: String::new(),
            passphrase: String::new(),
            client_id: String::new(),
            language: "en-US".into(),
            timezone_identifier: "GMT".into(),
        }
    }
}

/// A freshly created user together with the secrets shown to them once.
#[derive(Debug, Clone)]
pub struct Enrollment {
    pub user: user::Model,
    pub code_secret: TotpSeed,
    /// Plaintext recovery secret; only its hash is stored
    pub recover_secret: String,
}

fn seal_code_secret(
    cipher: &SeedCipher,
    issuer: &str,
    username: &str,
) -> Result<(TotpSeed, String), AccountError> {
    let seed = generate_totp_seed(issuer, username)?;
    let sealed = cipher.encrypt(seed.secret.as_bytes())?;
    Ok((seed, sealed))
}

/// Create an inactive user: passphrase and recovery secret hashed, TOTP
/// seed encrypted.
#[tracing::instrument(skip(db, cipher, draft), fields(username = %draft.username))]
pub async fn create_user<C: ConnectionTrait>(
    db: &C,
    cipher: &SeedCipher,
    issuer: &str,
    draft: NewUser,
) -> Result<Enrollment, AccountError> {
    draft.validate()?;

    let passphrase = hash_secret(&draft.passphrase)?;
    let recover_secret = generate_recovery_secret();
    let recover_hash = hash_secret(&recover_secret)?;
    let (code_secret, sealed_seed) = seal_code_secret(cipher, issuer, &draft.username)?;

    let now = OffsetDateTime::now_utc();
    let user = user::ActiveModel {
        id: Set(generate_identifier()),
        public_id: Set(generate_token(PUBLIC_KEY_LENGTH)),
        username: Set(draft.username),
        first_name: Set(draft.first_name),
        last_name: Set(draft.last_name),
        email: Set(draft.email),
        passphrase: Set(passphrase),
        active: Set(false),
        admin: Set(false),
        client_id: Set(draft.client_id),
        language: Set(draft.language),
        timezone_identifier: Set(draft.timezone_identifier),
        code_secret: Set(sealed_seed),
        recover_secret: Set(recover_hash),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(db)
    .await?;

    tracing::info!(user = %user.public_id, "user created");
    Ok(Enrollment {
        user,
        code_secret,
        recover_secret,
    })
}

pub async fn activate_user<C: ConnectionTrait>(
    db: &C,
    user: user::Model,
) -> Result<user::Model, AccountError> {
    let mut active: user::ActiveModel = user.into();
    active.active = Set(true);
    active.updated_at = Set(OffsetDateTime::now_utc());
    Ok(active.update(db).await?)
}

#[tracing::instrument(skip_all, fields(user = %user.public_id))]
pub async fn update_password<C: ConnectionTrait>(
    db: &C,
    user: user::Model,
    password: &str,
) -> Result<user::Model, AccountError> {
    if (password.chars().count() as u64) < MIN_PASSPHRASE_LENGTH {
        let mut errors = ValidationErrors::new();
        errors.add("passphrase", ValidationError::new("length"));
        return Err(errors.into());
    }
    let hashed = hash_secret(password)?;
    let mut active: user::ActiveModel = user.into();
    active.passphrase = Set(hashed);
    active.updated_at = Set(OffsetDateTime::now_utc());
    Ok(active.update(db).await?)
}

/// Replace the TOTP seed; the old one stops working immediately.
#[tracing::instrument(skip_all, fields(user = %user.public_id))]
pub async fn regenerate_code_secret<C: ConnectionTrait>(
    db: &C,
    cipher: &SeedCipher,
    issuer: &str,
    user: user::Model,
) -> Result<(user::Model, TotpSeed), AccountError> {
    let (seed, sealed) = seal_code_secret(cipher, issuer, &user.username)?;
    let mut active: user::ActiveModel = user.into();
    active.code_secret = Set(sealed);
    active.updated_at = Set(OffsetDateTime::now_utc());
    Ok((active.update(db).await?, seed))
}

#[tracing::instrument(skip_all, fields(user = %user.public_id))]
pub async fn regenerate_recover_secret<C: ConnectionTrait>(
    db: &C,
    user: user::Model,
) -> Result<(user::Model, String), AccountError> {
    let secret = generate_recovery_secret();
    let hashed = hash_secret(&secret)?;
    let mut active: user::ActiveModel = user.into();
    active.recover_secret = Set(hashed);
    active.updated_at = Set(OffsetDateTime::now_utc());
    Ok((active.update(db).await?, secret))
}
