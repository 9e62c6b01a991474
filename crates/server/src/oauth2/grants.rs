//! Grant-type state machine: Authorization Code (RFC 6749 §4.1), Refresh
//! Token (§6) and the first-party action token.
//!
//! The engine owns every decision; callers only translate its results into
//! redirects or response bodies. Expected rejections come back as
//! [`GrantError::Protocol`], store faults as [`GrantError::Store`].

use std::sync::Arc;

use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::OAuth2Config;
use crate::entity::{Scope, TokenKind, client, session, user};
use crate::error::GrantError;
use crate::oauth2::error::{ErrorCode, ProtocolError};
use crate::oauth2::store::{self, Invalidation, NewSession, RequestOrigin};

pub const RESPONSE_TYPE_CODE: &str = "code";
pub const RESPONSE_TYPE_TOKEN: &str = "token";
pub const TOKEN_TYPE_BEARER: &str = "bearer";

/// Refresh tokens carry no expiry of their own.
const REFRESH_TOKEN_LIFETIME: i64 = 0;

/// Grant types named at the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantType {
    AuthorizationCode,
    RefreshToken,
    /// Resource Owner Password Credentials, always refused
    Password,
    /// Always refused
    ClientCredentials,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::RefreshToken => "refresh_token",
            GrantType::Password => "password",
            GrantType::ClientCredentials => "client_credentials",
        }
    }
}

impl std::str::FromStr for GrantType {
    type Err = ErrorCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authorization_code" => Ok(GrantType::AuthorizationCode),
            "refresh_token" => Ok(GrantType::RefreshToken),
            "password" => Ok(GrantType::Password),
            "client_credentials" => Ok(GrantType::ClientCredentials),
            _ => Err(ErrorCode::InvalidRequest),
        }
    }
}

/// The resource owner's answer to the consent prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Consent {
    /// No answer yet; prompt unless an active session already exists
    #[default]
    Pending,
    Approved,
    Denied,
}

/// Parameters of the authorization step.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct AuthorizationRequest {
    #[serde(default)]
    pub response_type: String,
    #[serde(default)]
    pub client_id: String,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    #[serde(skip)]
    pub consent: Consent,
}

/// What the resource owner is asked to approve.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ConsentPrompt {
    pub first_name: String,
    pub last_name: String,
    pub client_name: String,
    pub client_uri: String,
    #[schema(value_type = String)]
    pub requested_scope: Scope,
}

/// A freshly issued authorization code.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthorizationGrant {
    pub code: String,
    #[schema(value_type = String)]
    pub scope: Scope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Registered URI the code is delivered to
    #[serde(skip)]
    pub redirect_uri: String,
}

#[derive(Debug, Clone)]
pub enum AuthorizeOutcome {
    ConsentRequired(ConsentPrompt),
    Granted(AuthorizationGrant),
}

/// Parameters of the token endpoint, as posted by the client.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct TokenRequest {
    #[serde(default)]
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

/// Successful token endpoint response (RFC 6749 §5.1).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenGrant {
    /// Public identifier of the resource owner
    pub user_id: String,
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_token: String,
    #[schema(value_type = String)]
    pub scope: Scope,
}

/// The first-party hand-off parameters of `/session`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FirstPartyHandoff {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub grant_type: String,
    #[serde(default)]
    pub scope: String,
}

fn reject(code: ErrorCode, reason: &'static str) -> ProtocolError {
    tracing::debug!(error = %code, reason, "grant rejected");
    ProtocolError::new(code)
}

/// Spend a grant token looked up earlier in the same transaction.
///
/// Fails with `invalid_grant` when another redemption invalidated the row
/// after `grant` was read.
pub async fn consume_grant_token<C: ConnectionTrait>(
    db: &C,
    grant: &session::Model,
) -> Result<(), GrantError> {
    match store::invalidate_session(db, grant).await? {
        Invalidation::Invalidated => Ok(()),
        Invalidation::AlreadyInvalidated => {
            Err(reject(ErrorCode::InvalidGrant, "grant token already used").into())
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Issues, exchanges and invalidates sessions on behalf of the endpoints.
///
/// Holds no mutable state; every call works against the store only.
#[derive(Clone)]
pub struct TokenService {
    db: Arc<DatabaseConnection>,
    policy: OAuth2Config,
}

impl TokenService {
    pub fn new(db: Arc<DatabaseConnection>, policy: OAuth2Config) -> Self {
        Self { db, policy }
    }

    /// Authorization step, run for an already authenticated resource owner.
    ///
    /// Errors are only ever addressed to a redirect URI registered for the
    /// client; when none is known `redirect_uri` on the error stays empty.
    #[tracing::instrument(skip_all, fields(client = %request.client_id, response_type = %request.response_type))]
    pub async fn authorize(
        &self,
        user: &user::Model,
        request: &AuthorizationRequest,
        origin: &RequestOrigin,
    ) -> Result<AuthorizeOutcome, GrantError> {
        let db = self.db.as_ref();
        let state = request.state.as_deref();
        let client = store::find_client_by_key(db, &request.client_id).await?;

        let redirect_uri = client.as_ref().and_then(|c| match non_empty(request.redirect_uri.as_deref()) {
            Some(uri) => c.is_redirect_uri_allowed(uri).then(|| uri.to_owned()),
            None => c.default_redirect_uri().map(str::to_owned),
        });
        let rejection = |code: ErrorCode, reason: &'static str| -> GrantError {
            reject(code, reason)
                .with_state(state)
                .with_redirect(redirect_uri.as_deref())
                .into()
        };

        match request.response_type.as_str() {
            RESPONSE_TYPE_CODE => {}
            RESPONSE_TYPE_TOKEN => {
                return Err(rejection(ErrorCode::UnsupportedResponseType, "implicit grant"));
            }
            _ => return Err(rejection(ErrorCode::InvalidRequest, "unknown response type")),
        }
        let Some(client) = client else {
            return Err(rejection(ErrorCode::UnauthorizedClient, "unknown client"));
        };
        let Some(target) = redirect_uri.clone() else {
            return Err(rejection(ErrorCode::InvalidRequest, "unregistered redirect uri"));
        };

        let scope = non_empty(request.scope.as_deref())
            .and_then(|s| s.parse::<Scope>().ok())
            .unwrap_or_default();

        match request.consent {
            Consent::Denied => {
                return Err(rejection(ErrorCode::AccessDenied, "resource owner denied"));
            }
            Consent::Pending => {
                if store::active_session_count(db, &client.id, &user.id).await? == 0 {
                    return Ok(AuthorizeOutcome::ConsentRequired(ConsentPrompt {
                        first_name: user.first_name.clone(),
                        last_name: user.last_name.clone(),
                        client_name: client.name,
                        client_uri: client.canonical_uri,
                        requested_scope: scope,
                    }));
                }
            }
            Consent::Approved => {}
        }

        let grant = store::create_session(
            db,
            NewSession {
                kind: TokenKind::GrantToken,
                user_id: &user.id,
                client_id: &client.id,
                scope,
                lifetime: self.policy.grant_token_lifetime,
                origin,
            },
        )
        .await?;

        tracing::info!(client = %client.name, user = %user.public_id, scope = %scope, "authorization code issued");
        Ok(AuthorizeOutcome::Granted(AuthorizationGrant {
            code: grant.token,
            scope,
            state: request.state.clone(),
            redirect_uri: target,
        }))
    }

    /// Token endpoint dispatcher for an authenticated client.
    #[tracing::instrument(skip_all, fields(client = %client.name, grant_type = %request.grant_type))]
    pub async fn token(
        &self,
        client: &client::Model,
        request: &TokenRequest,
        origin: &RequestOrigin,
    ) -> Result<TokenGrant, GrantError> {
        match request.grant_type.parse::<GrantType>() {
            Ok(GrantType::AuthorizationCode) => {
                self.exchange_code(
                    client,
                    request.code.as_deref(),
                    request.redirect_uri.as_deref(),
                    origin,
                )
                .await
            }
            Ok(GrantType::RefreshToken) => {
                self.refresh(
                    client,
                    request.refresh_token.as_deref(),
                    request.scope.as_deref(),
                    origin,
                )
                .await
            }
            Ok(GrantType::Password | GrantType::ClientCredentials) => Err(reject(
                ErrorCode::UnsupportedGrantType,
                "grant type not offered",
            )
            .into()),
            Err(code) => Err(reject(code, "unknown grant type").into()),
        }
    }

    /// Exchange an authorization code for an access/refresh token pair.
    ///
    /// The code is consumed with a conditional invalidate inside the same
    /// transaction that issues the new tokens: a code is redeemed at most
    /// once, even under concurrent duplicate requests.
    pub async fn exchange_code(
        &self,
        client: &client::Model,
        code: Option<&str>,
        redirect_uri: Option<&str>,
        origin: &RequestOrigin,
    ) -> Result<TokenGrant, GrantError> {
        let Some(code) = non_empty(code) else {
            return Err(reject(ErrorCode::InvalidRequest, "missing code").into());
        };
        if non_empty(redirect_uri).is_some_and(|uri| !client.is_redirect_uri_allowed(uri)) {
            return Err(reject(ErrorCode::InvalidGrant, "redirect uri mismatch").into());
        }

        let txn = self.db.begin().await?;

        let grant = store::find_session_by_token(&txn, code, TokenKind::GrantToken)
            .await?
            .filter(|grant| grant.client_id == client.id && grant.is_active())
            .ok_or_else(|| reject(ErrorCode::InvalidGrant, "no active grant token"))?;

        consume_grant_token(&txn, &grant).await?;

        let owner = store::find_user_by_id(&txn, &grant.user_id)
            .await?
            .ok_or_else(|| reject(ErrorCode::InvalidGrant, "grant owner vanished"))?;

        let access = store::create_session(
            &txn,
            NewSession {
                kind: TokenKind::AccessToken,
                user_id: &owner.id,
                client_id: &client.id,
                scope: grant.scopes,
                lifetime: self.policy.access_token_lifetime,
                origin,
            },
        )
        .await?;
        let refresh = store::create_session(
            &txn,
            NewSession {
                kind: TokenKind::RefreshToken,
                user_id: &owner.id,
                client_id: &client.id,
                scope: grant.scopes,
                lifetime: REFRESH_TOKEN_LIFETIME,
                origin,
            },
        )
        .await?;

        txn.commit().await?;

        tracing::info!(client = %client.name, user = %owner.public_id, "authorization code exchanged");
        Ok(TokenGrant {
            user_id: owner.public_id,
            access_token: access.token,
            token_type: TOKEN_TYPE_BEARER.to_owned(),
            expires_in: access.expires_in,
            refresh_token: refresh.token,
            scope: grant.scopes,
        })
    }

    /// Issue a new access token from a refresh token.
    ///
    /// The refresh token is not rotated: it stays valid and is echoed back.
    pub async fn refresh(
        &self,
        client: &client::Model,
        refresh_token: Option<&str>,
        requested_scope: Option<&str>,
        origin: &RequestOrigin,
    ) -> Result<TokenGrant, GrantError> {
        let db = self.db.as_ref();
        let Some(token) = non_empty(refresh_token) else {
            return Err(reject(ErrorCode::InvalidRequest, "missing refresh token").into());
        };

        let refresh = store::find_session_by_token(db, token, TokenKind::RefreshToken)
            .await?
            .filter(|refresh| refresh.client_id == client.id && refresh.is_active())
            .ok_or_else(|| reject(ErrorCode::InvalidGrant, "no active refresh token"))?;

        let scope = match non_empty(requested_scope) {
            None => refresh.scopes,
            Some(requested) => requested
                .parse::<Scope>()
                .ok()
                .filter(|scope| refresh.scopes.covers(*scope))
                .ok_or_else(|| reject(ErrorCode::InvalidScope, "scope exceeds original grant"))?,
        };

        let owner = store::find_user_by_id(db, &refresh.user_id)
            .await?
            .ok_or_else(|| reject(ErrorCode::InvalidGrant, "refresh token owner vanished"))?;

        let access = store::create_session(
            db,
            NewSession {
                kind: TokenKind::AccessToken,
                user_id: &owner.id,
                client_id: &client.id,
                scope,
                lifetime: self.policy.access_token_lifetime,
                origin,
            },
        )
        .await?;

        tracing::info!(client = %client.name, user = %owner.public_id, scope = %scope, "access token refreshed");
        Ok(TokenGrant {
            user_id: owner.public_id,
            access_token: access.token,
            token_type: TOKEN_TYPE_BEARER.to_owned(),
            expires_in: access.expires_in,
            refresh_token: refresh.token,
            scope,
        })
    }

    /// Mint a short-lived action token for first-party UI code. There is no
    /// exchange step; the caller decides the scope.
    #[tracing::instrument(skip_all, fields(client = %client.name, user = %user.public_id, scope = %scope))]
    pub async fn mint_action_token(
        &self,
        user: &user::Model,
        client: &client::Model,
        scope: Scope,
        origin: &RequestOrigin,
    ) -> Result<session::Model, GrantError> {
        Ok(store::create_session(
            self.db.as_ref(),
            NewSession {
                kind: TokenKind::ActionToken,
                user_id: &user.id,
                client_id: &client.id,
                scope,
                lifetime: self.policy.action_token_lifetime,
                origin,
            },
        )
        .await?)
    }

    /// Issue the grant token a freshly signed-in user carries to `/session`.
    #[tracing::instrument(skip_all, fields(user = %user.public_id))]
    pub async fn issue_first_party_code(
        &self,
        first_party: &client::Model,
        user: &user::Model,
        origin: &RequestOrigin,
    ) -> Result<session::Model, GrantError> {
        Ok(store::create_session(
            self.db.as_ref(),
            NewSession {
                kind: TokenKind::GrantToken,
                user_id: &user.id,
                client_id: &first_party.id,
                scope: Scope::Public,
                lifetime: self.policy.grant_token_lifetime,
                origin,
            },
        )
        .await?)
    }

    /// Redeem a first-party grant token for the user it was issued to.
    ///
    /// Same single-use rule as [`TokenService::exchange_code`].
    pub async fn redeem_first_party_code(
        &self,
        first_party: &client::Model,
        handoff: &FirstPartyHandoff,
    ) -> Result<user::Model, GrantError> {
        if handoff.client_id != first_party.key
            || handoff.grant_type != GrantType::AuthorizationCode.as_str()
            || handoff.scope != Scope::Public.as_str()
        {
            return Err(reject(ErrorCode::InvalidRequest, "malformed first-party hand-off").into());
        }

        let txn = self.db.begin().await?;
        let grant = store::find_session_by_token(&txn, &handoff.code, TokenKind::GrantToken)
            .await?
            .filter(|grant| grant.client_id == first_party.id && grant.is_active())
            .ok_or_else(|| reject(ErrorCode::InvalidGrant, "no active grant token"))?;

        consume_grant_token(&txn, &grant).await?;
        let owner = store::find_user_by_id(&txn, &grant.user_id)
            .await?
            .ok_or_else(|| reject(ErrorCode::InvalidGrant, "grant owner vanished"))?;
        txn.commit().await?;

        Ok(owner)
    }
}
