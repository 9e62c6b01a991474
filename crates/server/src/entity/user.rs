//! User entity - an authenticating principal.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::secrets::{SeedCipher, validate_totp, verify_secret};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "user")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    #[serde(skip_serializing)]
    pub id: String,
    /// The only user identifier ever handed to untrusted callers
    #[sea_orm(unique)]
    pub public_id: String,
    #[sea_orm(unique)]
    #[serde(skip_serializing)]
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    #[sea_orm(unique)]
    pub email: String,
    /// Argon2 hash of the passphrase
    #[serde(skip_serializing)]
    pub passphrase: String,
    pub active: bool,
    #[serde(skip_serializing)]
    pub admin: bool,
    /// Client the account was created through
    #[serde(skip_serializing)]
    pub client_id: String,
    pub language: String,
    pub timezone_identifier: String,
    /// TOTP seed, encrypted with the storage secret
    #[serde(skip_serializing)]
    pub code_secret: String,
    /// Argon2 hash of the account recovery secret
    #[serde(skip_serializing)]
    pub recover_secret: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::client::Entity",
        from = "Column::ClientId",
        to = "super::client::Column::Id"
    )]
    Client,
    #[sea_orm(has_many = "super::session::Entity")]
    Sessions,
}

impl Related<super::client::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Client.def()
    }
}

impl Related<super::session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sessions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Two-factor check: the passphrase must match its hash AND the passcode
    /// must match the decrypted TOTP seed. A seed that fails to decrypt makes
    /// the user unauthenticated.
    pub fn authentic(&self, password: &str, passcode: &str, cipher: &SeedCipher) -> bool {
        let valid_password = verify_secret(&self.passphrase, password);
        let seed = match cipher.decrypt(&self.code_secret) {
            Ok(seed) => seed,
            Err(e) => {
                tracing::warn!(user = %self.public_id, error = %e, "unable to decrypt TOTP seed");
                return false;
            }
        };
        let Ok(seed) = String::from_utf8(seed) else {
            return false;
        };
        validate_totp(passcode, &seed) && valid_password
    }

    pub fn verify_recover_secret(&self, secret: &str) -> bool {
        verify_secret(&self.recover_secret, &secret.trim().to_uppercase())
    }
}
