//! Shared state of the authorization server's HTTP adapter.

use std::sync::Arc;

use axum::extract::FromRef;
use axum_extra::extract::cookie::Key;
use sea_orm::DatabaseConnection;
use sha2::{Digest, Sha512};

use crate::config::AppConfig;
use crate::oauth2::grants::TokenService;
use crate::secrets::SeedCipher;

/// Everything the OAuth2 and session handlers need.
#[derive(Clone)]
pub struct OAuth2State {
    pub db: Arc<DatabaseConnection>,
    pub tokens: TokenService,
    pub cipher: Arc<SeedCipher>,
    /// Signs the session cookie
    pub cookie_key: Key,
    /// Name of the client the dashboard acts as
    pub first_party_client: String,
    /// Canonical URI of the first-party application
    pub application_uri: String,
    pub secure_cookies: bool,
    pub trust_forwarded_for: bool,
}

impl OAuth2State {
    pub fn new(
        db: Arc<DatabaseConnection>,
        cipher: Arc<SeedCipher>,
        cookie_key: Key,
        config: &AppConfig,
    ) -> Self {
        Self {
            tokens: TokenService::new(db.clone(), config.oauth2.clone()),
            db,
            cipher,
            cookie_key,
            first_party_client: config.first_party_client.clone(),
            application_uri: config.application_uri.clone(),
            secure_cookies: config.secure_cookies,
            trust_forwarded_for: config.trust_forwarded_for,
        }
    }
}

/// Derive the cookie signing key from the configured session secret.
pub fn session_key(secret: &str) -> Key {
    Key::from(Sha512::digest(secret.as_bytes()).as_slice())
}

impl FromRef<OAuth2State> for Key {
    fn from_ref(state: &OAuth2State) -> Self {
        state.cookie_key.clone()
    }
}
