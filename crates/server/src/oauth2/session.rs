//! First-party sign-in, session hand-off and dashboard bootstrap.
//!
//! Signing in mints a grant token for the first-party client; following the
//! returned `/session` URL redeems it once and sets the signed session cookie.

use axum::{
    Form, Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::{
    SignedCookieJar,
    cookie::{Cookie, SameSite},
};
use sea_orm::DbErr;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::accounts::find_or_create_client;
use crate::entity::{Scope, user};
use crate::error::GrantError;
use crate::oauth2::endpoints::{append_query, found, server_error};
use crate::oauth2::{
    ErrorCode, FirstPartyHandoff, GrantType, OAUTH2_TAG, OAuth2State, ProtocolError,
    RequestOrigin, store,
};

/// Signed cookie holding the signed-in user's public id.
pub const SESSION_COOKIE: &str = "space.session";

pub fn router() -> OpenApiRouter<OAuth2State> {
    OpenApiRouter::new()
        .routes(routes!(signin_page, signin))
        .routes(routes!(session))
        .routes(routes!(signout))
        .routes(routes!(dashboard))
}

#[derive(Debug, Deserialize)]
pub struct NextQuery {
    #[serde(rename = "_")]
    pub next: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SigninPrompt {
    /// Where the credentials are posted
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

#[derive(Deserialize, ToSchema)]
pub struct SigninForm {
    /// Username or e-mail address
    pub username: String,
    pub password: String,
    /// Current TOTP passcode
    pub passcode: String,
    /// Relative path to continue to once signed in
    #[serde(rename = "_")]
    pub next: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SigninResponse {
    /// The `/session` URL to follow
    pub location: String,
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    #[serde(flatten)]
    pub handoff: FirstPartyHandoff,
    #[serde(rename = "_")]
    pub next: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Dashboard {
    /// Short-lived token for first-party API calls
    pub action_token: String,
    /// Public id of the signed-in user
    pub user_id: String,
}

/// The active user named by the session cookie, if any.
pub(crate) async fn signed_in_user(
    state: &OAuth2State,
    jar: &SignedCookieJar,
) -> Result<Option<user::Model>, DbErr> {
    let Some(cookie) = jar.get(SESSION_COOKIE) else {
        return Ok(None);
    };
    Ok(store::find_user_by_public_id(state.db.as_ref(), cookie.value())
        .await?
        .filter(|user| user.active))
}

pub(crate) fn signin_location(next: &str) -> String {
    append_query("/signin", &[("_", Some(next))])
}

/// Only same-site relative paths are followed after sign-in.
///
/// Browsers drop tabs and newlines from URLs, so any control character or
/// whitespace could turn a path into `//host`.
fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path)
            if path.starts_with('/')
                && !path.starts_with("//")
                && !path
                    .chars()
                    .any(|c| c == '\\' || c.is_ascii_control() || c.is_whitespace()) =>
        {
            path
        }
        _ => "/",
    }
}

fn session_cookie(state: &OAuth2State, public_id: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, public_id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.secure_cookies)
        .build()
}

/// Sign-in prompt.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/signin",
    tag = OAUTH2_TAG,
    operation_id = "Sign-in Prompt",
    summary = "Describe the sign-in form",
    params(("_" = Option<String>, Query, description = "Relative path to continue to")),
    responses((status = 200, description = "Sign-in form target", body = SigninPrompt))
)]
pub async fn signin_page(Query(query): Query<NextQuery>) -> Json<SigninPrompt> {
    Json(SigninPrompt {
        action: "/signin".to_owned(),
        next: query.next,
    })
}

/// Two-factor sign-in.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/signin",
    tag = OAUTH2_TAG,
    operation_id = "Sign In",
    summary = "Sign in with password and TOTP passcode",
    description = "On success returns the `/session` URL carrying a single-use first-party \
                   authorization code. Following it sets the session cookie.",
    request_body(content = SigninForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Signed in", body = SigninResponse),
        (status = 401, description = "Unknown user, inactive user or wrong credentials", body = ProtocolError),
    )
)]
pub async fn signin(
    State(state): State<OAuth2State>,
    origin: RequestOrigin,
    Form(form): Form<SigninForm>,
) -> Response {
    let db = state.db.as_ref();
    let user = match store::find_user_by_holder(db, form.username.trim()).await {
        Ok(user) => user,
        Err(e) => {
            tracing::error!(error = %e, "Database error looking up user");
            return server_error();
        }
    };
    let Some(user) = user.filter(|user| {
        user.active && user.authentic(&form.password, &form.passcode, &state.cipher)
    }) else {
        tracing::info!("sign-in refused");
        return (
            StatusCode::UNAUTHORIZED,
            Json(ProtocolError::new(ErrorCode::AccessDenied)),
        )
            .into_response();
    };

    let first_party =
        match find_or_create_client(db, &state.first_party_client, &state.application_uri).await {
            Ok(client) => client,
            Err(e) => {
                tracing::error!(error = %e, "Unable to load first-party client");
                return server_error();
            }
        };
    let grant = match state
        .tokens
        .issue_first_party_code(&first_party, &user, &origin)
        .await
    {
        Ok(grant) => grant,
        Err(e) => {
            tracing::error!(error = %e, "Unable to issue first-party code");
            return server_error();
        }
    };

    tracing::info!(user = %user.public_id, "signed in");
    let location = append_query(
        "/session",
        &[
            ("client_id", Some(first_party.key.as_str())),
            ("code", Some(grant.token.as_str())),
            ("grant_type", Some(GrantType::AuthorizationCode.as_str())),
            ("scope", Some(Scope::Public.as_str())),
            ("_", Some(safe_next(form.next.as_deref()))),
        ],
    );
    Json(SigninResponse { location }).into_response()
}

/// First-party hand-off.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/session",
    tag = OAUTH2_TAG,
    operation_id = "Session Hand-off",
    summary = "Redeem a first-party code and start a browser session",
    params(
        ("client_id" = String, Query, description = "Key of the first-party client"),
        ("code" = String, Query, description = "Single-use first-party authorization code"),
        ("grant_type" = String, Query, description = "Must be `authorization_code`"),
        ("scope" = String, Query, description = "Must be `public`"),
        ("_" = Option<String>, Query, description = "Relative path to continue to"),
    ),
    responses(
        (status = 302, description = "Session cookie set; redirect to the requested path"),
        (status = 400, description = "Malformed, unknown, expired or already used code", body = ProtocolError),
    )
)]
pub async fn session(
    State(state): State<OAuth2State>,
    jar: SignedCookieJar,
    Query(query): Query<SessionQuery>,
) -> Response {
    let first_party = match find_or_create_client(
        state.db.as_ref(),
        &state.first_party_client,
        &state.application_uri,
    )
    .await
    {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "Unable to load first-party client");
            return server_error();
        }
    };

    match state
        .tokens
        .redeem_first_party_code(&first_party, &query.handoff)
        .await
    {
        Ok(user) => {
            tracing::info!(user = %user.public_id, "session started");
            let jar = jar.add(session_cookie(&state, user.public_id));
            (jar, found(safe_next(query.next.as_deref()))).into_response()
        }
        Err(GrantError::Protocol(e)) => (StatusCode::BAD_REQUEST, Json(e)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Session hand-off failed");
            server_error()
        }
    }
}

/// Sign out.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/signout",
    tag = OAUTH2_TAG,
    operation_id = "Sign Out",
    summary = "End the browser session",
    responses((status = 302, description = "Session cookie cleared; redirect to the sign-in prompt"))
)]
pub async fn signout(jar: SignedCookieJar) -> Response {
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    (jar, found("/signin")).into_response()
}

/// Dashboard bootstrap.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/",
    tag = OAUTH2_TAG,
    operation_id = "Dashboard",
    summary = "Mint an action token for the signed-in user",
    description = "The action token is issued for the first-party client with `read_write` scope \
                   and the configured action token lifetime.",
    responses(
        (status = 200, description = "Action token minted", body = Dashboard),
        (status = 302, description = "Not signed in; redirect to the sign-in prompt"),
    )
)]
pub async fn dashboard(
    State(state): State<OAuth2State>,
    jar: SignedCookieJar,
    origin: RequestOrigin,
) -> Response {
    let user = match signed_in_user(&state, &jar).await {
        Ok(Some(user)) => user,
        Ok(None) => return found(&signin_location("/")),
        Err(e) => {
            tracing::error!(error = %e, "Failed to load signed-in user");
            return server_error();
        }
    };
    let first_party = match find_or_create_client(
        state.db.as_ref(),
        &state.first_party_client,
        &state.application_uri,
    )
    .await
    {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "Unable to load first-party client");
            return server_error();
        }
    };

    match state
        .tokens
        .mint_action_token(&user, &first_party, Scope::ReadWrite, &origin)
        .await
    {
        Ok(token) => Json(Dashboard {
            action_token: token.token,
            user_id: user.public_id,
        })
        .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Unable to mint action token");
            server_error()
        }
    }
}
