//! Client authentication via HTTP Basic credentials (RFC 6749 §2.3.1).

use base64::Engine;
use sea_orm::ConnectionTrait;

use crate::entity::client;
use crate::oauth2::store;
use crate::secrets::verify_decoy;

/// Split a `Basic` authorization header into `(client key, client secret)`.
///
/// Accepts either the full header value or just the base64 payload.
pub fn parse_basic_credentials(header: &str) -> Option<(String, String)> {
    let encoded = header.trim();
    let encoded = encoded.strip_prefix("Basic ").unwrap_or(encoded).trim();
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (key, secret) = decoded.split_once(':')?;
    if key.is_empty() {
        return None;
    }
    Some((key.to_owned(), secret.to_owned()))
}

/// Resolve the client behind an `Authorization` header.
///
/// Returns `None` for a malformed header, an unknown key and a wrong secret
/// alike, so callers cannot tell which one happened. An unknown key still
/// pays for one Argon2 verification. Only store faults are errors.
pub async fn authenticate_client<C: ConnectionTrait>(
    db: &C,
    authorization: Option<&str>,
) -> Result<Option<client::Model>, sea_orm::DbErr> {
    let Some((key, secret)) = authorization.and_then(parse_basic_credentials) else {
        return Ok(None);
    };
    let Some(client) = store::find_client_by_key(db, &key).await? else {
        verify_decoy(&secret);
        tracing::debug!("client authentication failed");
        return Ok(None);
    };
    if client.authentic(&secret) {
        Ok(Some(client))
    } else {
        tracing::debug!("client authentication failed");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(raw: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(raw)
    }

    #[test]
    fn parses_full_header() {
        let header = format!("Basic {}", encode("key123:s3cret"));
        assert_eq!(
            parse_basic_credentials(&header),
            Some(("key123".to_string(), "s3cret".to_string()))
        );
    }

    #[test]
    fn parses_bare_payload() {
        assert_eq!(
            parse_basic_credentials(&encode("key:a:b")),
            Some(("key".to_string(), "a:b".to_string()))
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(parse_basic_credentials("Basic !!!"), None);
        assert_eq!(parse_basic_credentials(&encode("no-colon")), None);
        assert_eq!(parse_basic_credentials(&encode(":secret")), None);
        assert_eq!(parse_basic_credentials(""), None);
    }
}
