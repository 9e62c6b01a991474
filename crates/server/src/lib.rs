//! An OAuth 2.0 authorization server and identity provider.
//!
//! Registers client applications, authenticates users with a password plus
//! TOTP passcode, and issues grant, access, refresh and action tokens through
//! the Authorization Code and Refresh Token grants.

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::secrets::SeedCipher;

pub mod accounts;
pub mod api;
pub mod config;
pub mod entity;
pub mod error;
pub mod oauth2;
pub mod secrets;

#[derive(Clone, Debug)]
pub struct AppResources {
    pub db: Arc<DatabaseConnection>,
    pub cipher: Arc<SeedCipher>,
    pub config: Arc<AppConfig>,
}
