//! OAuth2 HTTP endpoints.
//!
//! Thin adapter over [`TokenService`](crate::oauth2::TokenService):
//! - Authorization endpoint (`GET` to ask, `POST` to answer the consent prompt)
//! - Token endpoint
//! - Error landing page

use std::net::SocketAddr;

use axum::{
    Form, Json,
    extract::{ConnectInfo, FromRequestParts, Query, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{self, AUTHORIZATION},
        request::Parts,
    },
    response::{IntoResponse, Response},
};
use axum_extra::extract::SignedCookieJar;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::error::GrantError;
use crate::oauth2::{
    AuthorizationRequest, AuthorizeOutcome, Consent, ConsentPrompt, ErrorCode, OAUTH2_TAG,
    OAuth2State, ProtocolError, RequestOrigin, TokenGrant, TokenRequest, authenticate_client,
    session,
};

/// Path errors are sent to when no registered redirect URI is usable.
pub const ERROR_PATH: &str = "/error";

const BASIC_REALM: &str = r#"Basic realm="space""#;

/// Creates the OAuth2 router, including the first-party session routes.
pub fn router(state: OAuth2State) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(authorize, authorize_consent))
        .routes(routes!(token))
        .routes(routes!(error_page))
        .merge(session::router())
        .with_state(state)
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Answer to the consent prompt, posted back to `/authorize`.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ConsentForm {
    #[serde(default)]
    pub response_type: String,
    #[serde(default)]
    pub client_id: String,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    /// `true` when the resource owner refused
    pub access_denied: Option<String>,
}

impl ConsentForm {
    fn into_request(self) -> AuthorizationRequest {
        let consent = match self.access_denied.as_deref() {
            Some("true") => Consent::Denied,
            _ => Consent::Approved,
        };
        AuthorizationRequest {
            response_type: self.response_type,
            client_id: self.client_id,
            redirect_uri: self.redirect_uri,
            scope: self.scope,
            state: self.state,
            consent,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct ErrorPageQuery {
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// `X-Forwarded-For` is only honoured when `trust_forwarded_for` is set.
impl FromRequestParts<OAuth2State> for RequestOrigin {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &OAuth2State,
    ) -> Result<Self, Self::Rejection> {
        let forwarded = parts
            .headers
            .get("x-forwarded-for")
            .filter(|_| state.trust_forwarded_for)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty());
        let ip = forwarded
            .or_else(|| {
                parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip().to_string())
            })
            .unwrap_or_default();
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        Ok(RequestOrigin::new(ip, user_agent))
    }
}

// =============================================================================
// Endpoints
// =============================================================================

/// OAuth2 Authorization endpoint.
#[tracing::instrument(skip_all, fields(client = %request.client_id))]
#[utoipa::path(
    get,
    path = "/authorize",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Authorize",
    summary = "Start the Authorization Code flow",
    description = "Requires a signed-in resource owner; anonymous visitors are redirected to `/signin`.\n\n\
                   When the owner has no active session with the client yet, the consent prompt is \
                   returned and must be answered with `POST /authorize`. Otherwise an authorization \
                   code is issued straight away.\n\n\
                   Errors are delivered to the registered redirect URI as `error` and `state` query \
                   parameters, or to `/error` when no registered URI is usable.",
    params(
        ("response_type" = String, Query, description = "Must be `code`. `token` is refused with `unsupported_response_type`."),
        ("client_id" = String, Query, description = "The client key issued at registration."),
        ("redirect_uri" = Option<String>, Query, description = "One of the client's registered redirect URIs. Defaults to the first registered one."),
        ("scope" = Option<String>, Query, description = "`public`, `read` or `read_write`. Anything else is treated as `public`."),
        ("state" = Option<String>, Query, description = "Opaque value echoed back unchanged."),
    ),
    responses(
        (status = 200, description = "Consent required", body = ConsentPrompt),
        (status = 302, description = "Redirect with an authorization code, an error, or to the sign-in page"),
    )
)]
pub async fn authorize(
    State(state): State<OAuth2State>,
    jar: SignedCookieJar,
    origin: RequestOrigin,
    Query(request): Query<AuthorizationRequest>,
) -> Response {
    run_authorize(&state, &jar, &origin, request).await
}

/// OAuth2 Authorization endpoint, consent answer.
#[tracing::instrument(skip_all, fields(client = %form.client_id))]
#[utoipa::path(
    post,
    path = "/authorize",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Authorize Consent",
    summary = "Answer the consent prompt",
    description = "Repeats the authorization parameters. `access_denied=true` refuses the request and \
                   sends `access_denied` to the client; anything else approves it.",
    request_body(
        content = ConsentForm,
        content_type = "application/x-www-form-urlencoded",
    ),
    responses(
        (status = 302, description = "Redirect with an authorization code or an error"),
    )
)]
pub async fn authorize_consent(
    State(state): State<OAuth2State>,
    jar: SignedCookieJar,
    origin: RequestOrigin,
    Form(form): Form<ConsentForm>,
) -> Response {
    run_authorize(&state, &jar, &origin, form.into_request()).await
}

async fn run_authorize(
    state: &OAuth2State,
    jar: &SignedCookieJar,
    origin: &RequestOrigin,
    request: AuthorizationRequest,
) -> Response {
    let user = match session::signed_in_user(state, jar).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            let return_to = append_query(
                "/authorize",
                &[
                    ("response_type", Some(request.response_type.as_str())),
                    ("client_id", Some(request.client_id.as_str())),
                    ("redirect_uri", request.redirect_uri.as_deref()),
                    ("scope", request.scope.as_deref()),
                    ("state", request.state.as_deref()),
                ],
            );
            return found(&session::signin_location(&return_to));
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to load signed-in user");
            return server_error();
        }
    };

    match state.tokens.authorize(&user, &request, origin).await {
        Ok(AuthorizeOutcome::ConsentRequired(prompt)) => (StatusCode::OK, Json(prompt)).into_response(),
        Ok(AuthorizeOutcome::Granted(grant)) => found(&append_query(
            &grant.redirect_uri,
            &[
                ("code", Some(grant.code.as_str())),
                ("scope", Some(grant.scope.as_str())),
                ("state", grant.state.as_deref()),
            ],
        )),
        Err(GrantError::Protocol(e)) => error_redirect(&e),
        Err(e) => {
            tracing::error!(error = %e, "Authorization step failed");
            server_error()
        }
    }
}

/// OAuth2 Token endpoint.
#[tracing::instrument(skip_all, fields(grant_type = %request.grant_type))]
#[utoipa::path(
    post,
    path = "/token",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Token",
    summary = "Exchange an authorization code or refresh token",
    description = "Clients authenticate with HTTP Basic (`client key:client secret`).\n\n\
                   **Supported grant types:**\n\
                   - `authorization_code`: single use; yields an access and a refresh token\n\
                   - `refresh_token`: yields a new access token, optionally with a narrower scope; \
                   the refresh token itself is returned unchanged\n\n\
                   `password` and `client_credentials` are refused with `unsupported_grant_type`.",
    request_body(
        content = TokenRequest,
        content_type = "application/x-www-form-urlencoded",
    ),
    responses(
        (status = 200, description = "Tokens issued", body = TokenGrant),
        (status = 400, description = "Protocol error", body = ProtocolError),
        (status = 401, description = "Client authentication failed", body = ProtocolError),
    )
)]
pub async fn token(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    origin: RequestOrigin,
    Form(request): Form<TokenRequest>,
) -> Response {
    let authorization = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
    let client = match authenticate_client(state.db.as_ref(), authorization).await {
        Ok(Some(client)) => client,
        Ok(None) => {
            return (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, BASIC_REALM)],
                Json(ProtocolError::new(ErrorCode::InvalidClient)),
            )
                .into_response();
        }
        Err(e) => {
            tracing::error!(error = %e, "Database error authenticating client");
            return server_error();
        }
    };

    match state.tokens.token(&client, &request, &origin).await {
        Ok(grant) => {
            let mut response = (StatusCode::OK, Json(grant)).into_response();
            let headers = response.headers_mut();
            headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
            headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
            response
        }
        Err(GrantError::Protocol(e)) => (StatusCode::BAD_REQUEST, Json(e)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Token request failed");
            server_error()
        }
    }
}

/// Landing page for authorization errors that cannot be sent to a client.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/error",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Error",
    summary = "Show an authorization error",
    params(
        ("error" = Option<String>, Query, description = "Protocol error code"),
        ("state" = Option<String>, Query, description = "State of the failed request"),
    ),
    responses(
        (status = 400, description = "The error, echoed back", body = ErrorPageQuery),
    )
)]
pub async fn error_page(Query(query): Query<ErrorPageQuery>) -> Response {
    (StatusCode::BAD_REQUEST, Json(query)).into_response()
}

// =============================================================================
// Helpers
// =============================================================================

/// Append URL-encoded query parameters, skipping absent ones.
pub(crate) fn append_query(base: &str, params: &[(&str, Option<&str>)]) -> String {
    let mut url = base.to_owned();
    let mut separator = if base.contains('?') { '&' } else { '?' };
    for (name, value) in params {
        let Some(value) = value else { continue };
        url.push(separator);
        url.push_str(name);
        url.push('=');
        url.push_str(&urlencoding::encode(value));
        separator = '&';
    }
    url
}

pub(crate) fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => (StatusCode::FOUND, [(header::LOCATION, value)]).into_response(),
        Err(_) => {
            tracing::error!(location, "Refusing to redirect to an invalid location");
            server_error()
        }
    }
}

pub(crate) fn server_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": "server_error" })),
    )
        .into_response()
}

fn error_redirect(error: &ProtocolError) -> Response {
    let base = error.redirect_uri.as_deref().unwrap_or(ERROR_PATH);
    found(&append_query(
        base,
        &[
            ("error", Some(error.error.as_str())),
            ("state", error.state.as_deref()),
        ],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_query_encodes_and_skips_absent() {
        assert_eq!(
            append_query(
                "https://client.example/cb",
                &[("code", Some("a b")), ("state", None), ("scope", Some("read"))]
            ),
            "https://client.example/cb?code=a%20b&scope=read"
        );
    }

    #[test]
    fn append_query_extends_existing_query() {
        assert_eq!(
            append_query("https://client.example/cb?x=1", &[("error", Some("access_denied"))]),
            "https://client.example/cb?x=1&error=access_denied"
        );
    }

    #[test]
    fn consent_form_maps_access_denied() {
        let denied = ConsentForm {
            access_denied: Some("true".into()),
            ..Default::default()
        };
        assert_eq!(denied.into_request().consent, Consent::Denied);

        let approved = ConsentForm::default();
        assert_eq!(approved.into_request().consent, Consent::Approved);
    }

    #[test]
    fn errors_without_redirect_land_on_error_page() {
        let response = error_redirect(
            &ProtocolError::new(ErrorCode::UnauthorizedClient).with_state(Some("s1")),
        );
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers()[header::LOCATION],
            "/error?error=unauthorized_client&state=s1"
        );
    }
}
