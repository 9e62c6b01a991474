//! Session entity - every credential the server issues, whatever its kind.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// The kind of credential a session row represents.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    /// Single-use authorization code
    #[sea_orm(string_value = "grant_token")]
    GrantToken,
    #[sea_orm(string_value = "access_token")]
    AccessToken,
    #[sea_orm(string_value = "refresh_token")]
    RefreshToken,
    /// Capability handed to first-party UI code
    #[sea_orm(string_value = "action_token")]
    ActionToken,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::GrantToken => "grant_token",
            TokenKind::AccessToken => "access_token",
            TokenKind::RefreshToken => "refresh_token",
            TokenKind::ActionToken => "action_token",
        }
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse permission level; ordered `Public < Read < ReadWrite`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    #[default]
    #[sea_orm(string_value = "public")]
    Public,
    #[sea_orm(string_value = "read")]
    Read,
    #[sea_orm(string_value = "read_write")]
    ReadWrite,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Public => "public",
            Scope::Read => "read",
            Scope::ReadWrite => "read_write",
        }
    }

    /// Whether a token holding `self` may be narrowed to `requested`.
    pub fn covers(&self, requested: Scope) -> bool {
        requested <= *self
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "public" => Ok(Scope::Public),
            "read" => Ok(Scope::Read),
            "read_write" => Ok(Scope::ReadWrite),
            other => Err(format!("unknown scope: {other}")),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "session")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    #[serde(skip_serializing)]
    pub id: String,
    #[sea_orm(unique)]
    pub token: String,
    #[sea_orm(indexed)]
    pub token_type: TokenKind,
    #[serde(skip_serializing)]
    pub user_id: String,
    #[serde(skip_serializing)]
    pub client_id: String,
    pub scopes: Scope,
    /// Issuance instant, seconds since the Unix epoch
    pub moment: i64,
    /// Lifetime in seconds; 0 never expires
    pub expires_in: i64,
    #[serde(skip_serializing)]
    pub ip: String,
    #[serde(skip_serializing)]
    pub user_agent: String,
    pub invalidated: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::user::Entity",
        from = "Column::UserId",
        to = "super::user::Column::Id"
    )]
    User,
    #[sea_orm(
        belongs_to = "super::client::Entity",
        from = "Column::ClientId",
        to = "super::client::Column::Id"
    )]
    Client,
}

impl Related<super::user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl Related<super::client::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Client.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Expiry instant in Unix seconds, `None` for non-expiring sessions.
    pub fn expires_at(&self) -> Option<i64> {
        (self.expires_in > 0).then(|| self.moment + self.expires_in)
    }

    pub fn is_expired_at(&self, now: i64) -> bool {
        self.expires_at().is_some_and(|at| at <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(OffsetDateTime::now_utc().unix_timestamp())
    }

    /// Not invalidated and not past its expiry.
    pub fn is_active(&self) -> bool {
        !self.invalidated && !self.is_expired()
    }
}
