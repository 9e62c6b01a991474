//! OAuth 2.0 authorization server.
//!
//! ## Supported Flows
//!
//! - Authorization Code (RFC 6749 §4.1)
//! - Refresh Token (RFC 6749 §6)
//! - First-party action tokens, minted without an exchange step
//!
//! Implicit, Resource Owner Password Credentials and Client Credentials are
//! refused with the matching protocol error.
//!
//! ## Endpoints
//!
//! - `GET|POST /authorize` - Authorization endpoint
//! - `POST /token` - Token endpoint
//! - `GET /error` - Landing page for errors without a usable redirect URI
//! - `POST /signin`, `GET /session`, `GET /signout`, `GET /` - first-party
//!   sign-in and dashboard bootstrap

pub mod client_auth;
pub mod endpoints;
pub mod error;
pub mod grants;
pub mod session;
mod state;
pub mod store;

pub use client_auth::{authenticate_client, parse_basic_credentials};
pub use endpoints::router;
pub use error::{ErrorCode, ProtocolError};
pub use grants::{
    AuthorizationGrant, AuthorizationRequest, AuthorizeOutcome, Consent, ConsentPrompt,
    FirstPartyHandoff, GrantType, TokenGrant, TokenRequest, TokenService,
};
pub use state::{OAuth2State, session_key};
pub use store::RequestOrigin;

/// OpenAPI tag for OAuth2 endpoints
pub const OAUTH2_TAG: &str = "OAuth2";
