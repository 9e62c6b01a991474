//! OAuth 2.0 protocol error taxonomy (RFC 6749 §4.1.2.1 and §5.2).

use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

/// Error codes the authorization server hands back to client applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    /// Client authentication failed at the token endpoint
    InvalidClient,
    UnauthorizedClient,
    AccessDenied,
    UnsupportedResponseType,
    InvalidScope,
    InvalidGrant,
    UnsupportedGrantType,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::InvalidClient => "invalid_client",
            ErrorCode::UnauthorizedClient => "unauthorized_client",
            ErrorCode::AccessDenied => "access_denied",
            ErrorCode::UnsupportedResponseType => "unsupported_response_type",
            ErrorCode::InvalidScope => "invalid_scope",
            ErrorCode::InvalidGrant => "invalid_grant",
            ErrorCode::UnsupportedGrantType => "unsupported_grant_type",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An expected rejection of a grant step.
///
/// Serialises as `{"error": ..., "state": ...}`. `redirect_uri` is where the
/// authorization step may deliver the error; it is only ever a URI registered
/// for the client and never serialised.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, ToSchema)]
#[error("{error}")]
pub struct ProtocolError {
    pub error: ErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip)]
    pub redirect_uri: Option<String>,
}

impl ProtocolError {
    pub fn new(error: ErrorCode) -> Self {
        Self {
            error,
            state: None,
            redirect_uri: None,
        }
    }

    pub fn with_state(mut self, state: Option<&str>) -> Self {
        self.state = state.map(str::to_owned);
        self
    }

    pub fn with_redirect(mut self, redirect_uri: Option<&str>) -> Self {
        self.redirect_uri = redirect_uri.map(str::to_owned);
        self
    }
}

impl From<ErrorCode> for ProtocolError {
    fn from(error: ErrorCode) -> Self {
        ProtocolError::new(error)
    }
}
