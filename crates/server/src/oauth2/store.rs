//! Session & token store.
//!
//! The only place that reads or writes session rows. Every function is
//! generic over [`ConnectionTrait`] so the protocol engine can run several of
//! them inside one transaction.

use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait, EntityTrait,
    PaginatorTrait, QueryFilter, sea_query::Expr,
};
use time::OffsetDateTime;

use crate::entity::{Scope, TokenKind, client, session, user};
use crate::secrets::{SESSION_TOKEN_LENGTH, generate_identifier, generate_token};

/// Where a request came from; recorded on every issued session.
#[derive(Debug, Clone, Default)]
pub struct RequestOrigin {
    pub ip: String,
    pub user_agent: String,
}

impl RequestOrigin {
    pub fn new(ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            user_agent: user_agent.into(),
        }
    }
}

/// Parameters for a session about to be issued.
#[derive(Debug, Clone)]
pub struct NewSession<'a> {
    pub kind: TokenKind,
    pub user_id: &'a str,
    pub client_id: &'a str,
    pub scope: Scope,
    /// Seconds; 0 never expires
    pub lifetime: i64,
    pub origin: &'a RequestOrigin,
}

/// Result of [`invalidate_session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invalidation {
    Invalidated,
    AlreadyInvalidated,
}

pub async fn find_client_by_key<C: ConnectionTrait>(
    db: &C,
    key: &str,
) -> Result<Option<client::Model>, sea_orm::DbErr> {
    client::Entity::find()
        .filter(client::Column::Key.eq(key))
        .one(db)
        .await
}

pub async fn find_user_by_public_id<C: ConnectionTrait>(
    db: &C,
    public_id: &str,
) -> Result<Option<user::Model>, sea_orm::DbErr> {
    user::Entity::find()
        .filter(user::Column::PublicId.eq(public_id))
        .one(db)
        .await
}

/// Look a user up by username or e-mail address.
pub async fn find_user_by_holder<C: ConnectionTrait>(
    db: &C,
    holder: &str,
) -> Result<Option<user::Model>, sea_orm::DbErr> {
    user::Entity::find()
        .filter(
            Condition::any()
                .add(user::Column::Username.eq(holder))
                .add(user::Column::Email.eq(holder)),
        )
        .one(db)
        .await
}

pub async fn find_user_by_id<C: ConnectionTrait>(
    db: &C,
    id: &str,
) -> Result<Option<user::Model>, sea_orm::DbErr> {
    user::Entity::find_by_id(id).one(db).await
}

/// Find a session of the given kind by its token, whatever its state.
pub async fn find_session_by_token<C: ConnectionTrait>(
    db: &C,
    token: &str,
    kind: TokenKind,
) -> Result<Option<session::Model>, sea_orm::DbErr> {
    if token.is_empty() {
        return Ok(None);
    }
    session::Entity::find()
        .filter(session::Column::Token.eq(token))
        .filter(session::Column::TokenType.eq(kind))
        .one(db)
        .await
}

/// Count sessions of any kind for (client, user) that are neither
/// invalidated nor expired.
pub async fn active_session_count<C: ConnectionTrait>(
    db: &C,
    client_id: &str,
    user_id: &str,
) -> Result<u64, sea_orm::DbErr> {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    session::Entity::find()
        .filter(session::Column::ClientId.eq(client_id))
        .filter(session::Column::UserId.eq(user_id))
        .filter(session::Column::Invalidated.eq(false))
        .filter(
            Condition::any()
                .add(session::Column::ExpiresIn.eq(0))
                .add(
                    Expr::expr(
                        Expr::col(session::Column::Moment).add(Expr::col(session::Column::ExpiresIn)),
                    )
                    .gt(now),
                ),
        )
        .count(db)
        .await
}

/// Issue a new session. Token, identifier and issuance instant are always
/// generated here, never taken from the caller.
pub async fn create_session<C: ConnectionTrait>(
    db: &C,
    new: NewSession<'_>,
) -> Result<session::Model, sea_orm::DbErr> {
    let session = session::ActiveModel {
        id: Set(generate_identifier()),
        token: Set(generate_token(SESSION_TOKEN_LENGTH)),
        token_type: Set(new.kind),
        user_id: Set(new.user_id.to_owned()),
        client_id: Set(new.client_id.to_owned()),
        scopes: Set(new.scope),
        moment: Set(OffsetDateTime::now_utc().unix_timestamp()),
        expires_in: Set(new.lifetime),
        ip: Set(new.origin.ip.clone()),
        user_agent: Set(new.origin.user_agent.clone()),
        invalidated: Set(false),
    }
    .insert(db)
    .await?;

    tracing::debug!(kind = %session.token_type, scope = %session.scopes, "session issued");
    Ok(session)
}

/// Invalidate a session if, and only if, it is still valid.
///
/// Implemented as a single conditional update, so of several concurrent
/// callers exactly one observes [`Invalidation::Invalidated`].
pub async fn invalidate_session<C: ConnectionTrait>(
    db: &C,
    session: &session::Model,
) -> Result<Invalidation, sea_orm::DbErr> {
    let result = session::Entity::update_many()
        .col_expr(session::Column::Invalidated, Expr::value(true))
        .filter(session::Column::Id.eq(session.id.as_str()))
        .filter(session::Column::Invalidated.eq(false))
        .exec(db)
        .await?;

    Ok(if result.rows_affected == 1 {
        Invalidation::Invalidated
    } else {
        Invalidation::AlreadyInvalidated
    })
}
