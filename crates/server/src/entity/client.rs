//! Client entity - a registered application allowed to request tokens.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::secrets::verify_secret;

/// Whether a client can keep its secret confidential (RFC 6749 §2.1).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    #[sea_orm(string_value = "public")]
    Public,
    #[sea_orm(string_value = "confidential")]
    Confidential,
}

impl ClientType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientType::Public => "public",
            ClientType::Confidential => "confidential",
        }
    }
}

impl std::fmt::Display for ClientType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ClientType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(ClientType::Public),
            "confidential" => Ok(ClientType::Confidential),
            other => Err(format!("unknown client type: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "client")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub name: String,
    pub description: String,
    /// Public client identifier (`client_id` on the wire)
    #[sea_orm(unique)]
    #[serde(skip_serializing)]
    pub key: String,
    /// Argon2 hash of the client secret
    #[serde(skip_serializing)]
    pub secret: String,
    /// Newline-separated scope levels
    #[serde(skip_serializing)]
    pub scopes: String,
    pub canonical_uri: String,
    /// Newline-separated redirect URIs; the first one is the default
    #[serde(skip_serializing)]
    pub redirect_uri: String,
    #[serde(skip_serializing)]
    pub client_type: ClientType,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::session::Entity")]
    Sessions,
    #[sea_orm(has_many = "super::user::Entity")]
    Users,
}

impl Related<super::session::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sessions.def()
    }
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Users.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Check a plaintext secret against the stored hash.
    pub fn authentic(&self, secret: &str) -> bool {
        verify_secret(&self.secret, secret)
    }

    pub fn redirect_uris_list(&self) -> Vec<&str> {
        self.redirect_uri
            .lines()
            .map(str::trim)
            .filter(|uri| !uri.is_empty())
            .collect()
    }

    /// The first registered redirect URI.
    pub fn default_redirect_uri(&self) -> Option<&str> {
        self.redirect_uris_list().first().copied()
    }

    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris_list().contains(&uri)
    }

    pub fn is_public(&self) -> bool {
        self.client_type == ClientType::Public
    }
}
