use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
};
use time::OffsetDateTime;
use validator::Validate;

use super::{validate_scope_list, validate_uri_list};
use crate::entity::{ClientType, Scope, client};
use crate::error::AccountError;
use crate::secrets::{
    PUBLIC_KEY_LENGTH, SESSION_TOKEN_LENGTH, generate_identifier, generate_token, hash_secret,
};

/// Registration data for a new client.
#[derive(Debug, Clone, Validate)]
pub struct NewClient {
    #[validate(length(min = 3, max = 20))]
    pub name: String,
    pub description: String,
    /// Plaintext secret; hashed before the row is built
    #[validate(length(min = 1))]
    pub secret: String,
    /// Newline-separated scope levels
    #[validate(custom(function = "validate_scope_list"))]
    pub scopes: String,
    #[validate(length(min = 1))]
    pub canonical_uri: String,
    /// Newline-separated redirect URIs; the first one is the default
    #[validate(custom(function = "validate_uri_list"))]
    pub redirect_uri: String,
    pub client_type: ClientType,
}

impl NewClient {
    /// Validate, generate identifiers and hash the secret.
    pub fn into_active_model(self) -> Result<client::ActiveModel, AccountError> {
        self.validate()?;
        let secret = hash_secret(&self.secret)?;
        let now = OffsetDateTime::now_utc();
        Ok(client::ActiveModel {
            id: Set(generate_identifier()),
            name: Set(self.name),
            description: Set(self.description),
            key: Set(generate_token(PUBLIC_KEY_LENGTH)),
            secret: Set(secret),
            scopes: Set(self.scopes),
            canonical_uri: Set(self.canonical_uri),
            redirect_uri: Set(self.redirect_uri),
            client_type: Set(self.client_type),
            created_at: Set(now),
            updated_at: Set(now),
        })
    }
}

#[tracing::instrument(skip(db, draft), fields(name = %draft.name))]
pub async fn create_client<C: ConnectionTrait>(
    db: &C,
    draft: NewClient,
) -> Result<client::Model, AccountError> {
    let client = draft.into_active_model()?.insert(db).await?;
    tracing::info!(client = %client.name, kind = %client.client_type, "client registered");
    Ok(client)
}

/// Look up a client by name, registering it if it does not exist yet.
///
/// Used for the server's own first-party application, which gets a random
/// secret nobody needs to know and the `public` scope only.
#[tracing::instrument(skip(db))]
pub async fn find_or_create_client<C: ConnectionTrait>(
    db: &C,
    name: &str,
    canonical_uri: &str,
) -> Result<client::Model, AccountError> {
    if let Some(client) = client::Entity::find()
        .filter(client::Column::Name.eq(name))
        .one(db)
        .await?
    {
        return Ok(client);
    }

    create_client(
        db,
        NewClient {
            name: name.to_owned(),
            description: format!("{name} first-party application"),
            secret: generate_token(SESSION_TOKEN_LENGTH),
            scopes: Scope::Public.to_string(),
            canonical_uri: canonical_uri.to_owned(),
            redirect_uri: format!("{}/session", canonical_uri.trim_end_matches('/')),
            client_type: ClientType::Public,
        },
    )
    .await
}

/// Replace the client secret. The new hash is computed before any write.
#[tracing::instrument(skip(db, client, secret), fields(client = %client.name))]
pub async fn rotate_client_secret<C: ConnectionTrait>(
    db: &C,
    client: client::Model,
    secret: &str,
) -> Result<client::Model, AccountError> {
    if secret.is_empty() {
        let mut errors = validator::ValidationErrors::new();
        errors.add("secret", validator::ValidationError::new("length"));
        return Err(errors.into());
    }
    let hashed = hash_secret(secret)?;
    let mut active: client::ActiveModel = client.into();
    active.secret = Set(hashed);
    active.updated_at = Set(OffsetDateTime::now_utc());
    Ok(active.update(db).await?)
}
