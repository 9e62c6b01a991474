//! Shared fixtures: an in-memory SQLite store with one registered client and
//! one activated user.
#![allow(dead_code)]

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, Schema};
use space::accounts::{NewClient, NewUser, activate_user, create_client, create_user};
use space::config::{AppConfig, OAuth2Config};
use space::entity::{ClientType, client, session, user};
use space::oauth2::{
    AuthorizationRequest, AuthorizeOutcome, Consent, RequestOrigin, TokenService,
};
use space::secrets::{SeedCipher, current_passcode};
use std::sync::Arc;

pub const STORAGE_SECRET: &str = "0123456789abcdef0123456789abcdef";
pub const SESSION_SECRET: &str = "fedcba9876543210fedcba9876543210";
pub const CLIENT_SECRET: &str = "orbiter-secret";
pub const CALLBACK: &str = "https://orbiter.example/callback";
pub const ALT_CALLBACK: &str = "https://orbiter.example/alt";
pub const PASSWORD: &str = "correct horse battery";

/// In-memory database with the schema created from the entities.
pub async fn setup_db() -> Arc<DatabaseConnection> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1).sqlx_logging(false);
    let db = Database::connect(options).await.expect("connect");

    let schema = Schema::new(DbBackend::Sqlite);
    for statement in [
        schema.create_table_from_entity(client::Entity),
        schema.create_table_from_entity(user::Entity),
        schema.create_table_from_entity(session::Entity),
    ] {
        db.execute(db.get_database_backend().build(&statement))
            .await
            .expect("create table");
    }
    Arc::new(db)
}

pub fn cipher() -> Arc<SeedCipher> {
    Arc::new(SeedCipher::new(STORAGE_SECRET).expect("cipher"))
}

pub fn origin() -> RequestOrigin {
    RequestOrigin::new("127.0.0.1", "fixture-agent/1.0")
}

pub fn app_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        listen_addr: "127.0.0.1:0".parse().expect("addr"),
        storage_secret: STORAGE_SECRET.into(),
        session_secret: SESSION_SECRET.into(),
        application_uri: "http://localhost:8080".into(),
        first_party_client: "Jupiter".into(),
        totp_issuer: "Space".into(),
        secure_cookies: false,
        trust_forwarded_for: false,
        oauth2: OAuth2Config::default(),
    }
}

pub async fn register_client(
    db: &DatabaseConnection,
    name: &str,
    client_type: ClientType,
) -> client::Model {
    create_client(
        db,
        NewClient {
            name: name.into(),
            description: format!("{name} test application"),
            secret: CLIENT_SECRET.into(),
            scopes: "public\nread\nread_write".into(),
            canonical_uri: "https://orbiter.example".into(),
            redirect_uri: format!("{CALLBACK}\n{ALT_CALLBACK}"),
            client_type,
        },
    )
    .await
    .expect("register client")
}

/// An activated user and the plaintext base32 TOTP seed.
pub async fn enrol_user(
    db: &DatabaseConnection,
    cipher: &SeedCipher,
    client_id: &str,
    username: &str,
) -> (user::Model, String) {
    let enrollment = create_user(
        db,
        cipher,
        "Space",
        NewUser {
            username: username.into(),
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: format!("{username}@example.com"),
            passphrase: PASSWORD.into(),
            client_id: client_id.into(),
            ..Default::default()
        },
    )
    .await
    .expect("create user");
    let user = activate_user(db, enrollment.user).await.expect("activate");
    (user, enrollment.code_secret.secret)
}

pub fn passcode(seed: &str) -> String {
    current_passcode(seed).expect("passcode")
}

pub struct Fixture {
    pub db: Arc<DatabaseConnection>,
    pub cipher: Arc<SeedCipher>,
    pub tokens: TokenService,
    pub client: client::Model,
    pub user: user::Model,
    pub totp_seed: String,
}

pub async fn fixture() -> Fixture {
    fixture_with(OAuth2Config::default()).await
}

pub async fn fixture_with(policy: OAuth2Config) -> Fixture {
    let db = setup_db().await;
    let cipher = cipher();
    let client = register_client(&db, "Orbiter", ClientType::Confidential).await;
    let (user, totp_seed) = enrol_user(&db, &cipher, &client.id, "ada").await;
    Fixture {
        tokens: TokenService::new(db.clone(), policy),
        db,
        cipher,
        client,
        user,
        totp_seed,
    }
}

pub fn code_request(client: &client::Model, scope: &str, consent: Consent) -> AuthorizationRequest {
    AuthorizationRequest {
        response_type: "code".into(),
        client_id: client.key.clone(),
        redirect_uri: Some(CALLBACK.into()),
        scope: Some(scope.into()),
        state: Some("xyz".into()),
        consent,
    }
}

/// Run an approved authorization step and return the issued code.
pub async fn issue_code(fx: &Fixture, scope: &str) -> String {
    let outcome = fx
        .tokens
        .authorize(
            &fx.user,
            &code_request(&fx.client, scope, Consent::Approved),
            &origin(),
        )
        .await
        .expect("authorize");
    match outcome {
        AuthorizeOutcome::Granted(grant) => grant.code,
        AuthorizeOutcome::ConsentRequired(_) => panic!("approved request asked for consent"),
    }
}
