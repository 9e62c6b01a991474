//! Tests for the Authorization Code and Refresh Token grants.

mod common;

use common::*;
use futures::future::join_all;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait};
use space::accounts::find_or_create_client;
use space::config::OAuth2Config;
use space::entity::{ClientType, Scope, TokenKind, session};
use space::error::GrantError;
use space::oauth2::grants::consume_grant_token;
use space::oauth2::{
    AuthorizationRequest, AuthorizeOutcome, Consent, ErrorCode, FirstPartyHandoff, TokenRequest,
    store,
};

fn protocol(err: GrantError) -> space::oauth2::ProtocolError {
    match err {
        GrantError::Protocol(e) => e,
        other => panic!("expected a protocol error, got {other}"),
    }
}

/// Move a session's issuance instant far enough back to expire it.
async fn backdate(db: &sea_orm::DatabaseConnection, token: &str, kind: TokenKind) {
    let row = store::find_session_by_token(db, token, kind)
        .await
        .unwrap()
        .expect("session exists");
    let mut active: session::ActiveModel = row.into();
    active.moment = Set(0);
    active.update(db).await.unwrap();
}

// =============================================================================
// Authorization step
// =============================================================================

#[tokio::test]
async fn test_first_party_style_public_client_full_flow() {
    let db = setup_db().await;
    let cipher = cipher();
    let jupiter = register_client(&db, "Jupiter", ClientType::Public).await;
    let (user, _) = enrol_user(&db, &cipher, &jupiter.id, "grace").await;
    let tokens = space::oauth2::TokenService::new(db.clone(), OAuth2Config::default());

    let request = code_request(&jupiter, "public", Consent::Pending);
    let outcome = tokens.authorize(&user, &request, &origin()).await.unwrap();
    let AuthorizeOutcome::ConsentRequired(prompt) = outcome else {
        panic!("first authorization must ask for consent");
    };
    assert_eq!(prompt.client_name, "Jupiter");
    assert_eq!(prompt.first_name, "Ada");
    assert_eq!(prompt.requested_scope, Scope::Public);

    let approved = AuthorizationRequest {
        consent: Consent::Approved,
        ..request
    };
    let AuthorizeOutcome::Granted(grant) =
        tokens.authorize(&user, &approved, &origin()).await.unwrap()
    else {
        panic!("approval must grant a code");
    };
    assert_eq!(grant.scope, Scope::Public);
    assert_eq!(grant.state.as_deref(), Some("xyz"));
    assert_eq!(grant.redirect_uri, CALLBACK);

    let issued = tokens
        .exchange_code(&jupiter, Some(grant.code.as_str()), Some(CALLBACK), &origin())
        .await
        .unwrap();
    assert_eq!(issued.token_type, "bearer");
    assert_eq!(issued.scope, Scope::Public);
    assert!(issued.expires_in > 0);
    assert!(!issued.access_token.is_empty());
    assert!(!issued.refresh_token.is_empty());
    assert_eq!(issued.user_id, user.public_id);
}

#[tokio::test]
async fn test_consent_skipped_with_active_session() {
    let fx = fixture().await;
    let code = issue_code(&fx, "read").await;
    fx.tokens
        .exchange_code(&fx.client, Some(code.as_str()), None, &origin())
        .await
        .unwrap();

    let outcome = fx
        .tokens
        .authorize(
            &fx.user,
            &code_request(&fx.client, "read", Consent::Pending),
            &origin(),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, AuthorizeOutcome::Granted(_)));
}

#[tokio::test]
async fn test_unknown_client_is_unauthorized_and_echoes_state() {
    let fx = fixture().await;
    let request = AuthorizationRequest {
        client_id: "no-such-client".into(),
        ..code_request(&fx.client, "read", Consent::Approved)
    };
    let err = protocol(fx.tokens.authorize(&fx.user, &request, &origin()).await.unwrap_err());
    assert_eq!(err.error, ErrorCode::UnauthorizedClient);
    assert_eq!(err.state.as_deref(), Some("xyz"));
    assert_eq!(err.redirect_uri, None);
}

#[tokio::test]
async fn test_implicit_grant_is_refused() {
    let fx = fixture().await;
    for client_id in [fx.client.key.clone(), "no-such-client".to_string()] {
        let request = AuthorizationRequest {
            response_type: "token".into(),
            client_id,
            ..code_request(&fx.client, "read", Consent::Approved)
        };
        let err = protocol(fx.tokens.authorize(&fx.user, &request, &origin()).await.unwrap_err());
        assert_eq!(err.error, ErrorCode::UnsupportedResponseType);
        assert_eq!(err.state.as_deref(), Some("xyz"));
    }
}

#[tokio::test]
async fn test_implicit_error_goes_to_registered_redirect() {
    let fx = fixture().await;
    let request = AuthorizationRequest {
        response_type: "token".into(),
        ..code_request(&fx.client, "read", Consent::Approved)
    };
    let err = protocol(fx.tokens.authorize(&fx.user, &request, &origin()).await.unwrap_err());
    assert_eq!(err.redirect_uri.as_deref(), Some(CALLBACK));
}

#[tokio::test]
async fn test_unknown_response_type_is_invalid_request() {
    let fx = fixture().await;
    let request = AuthorizationRequest {
        response_type: "id_token".into(),
        ..code_request(&fx.client, "read", Consent::Approved)
    };
    let err = protocol(fx.tokens.authorize(&fx.user, &request, &origin()).await.unwrap_err());
    assert_eq!(err.error, ErrorCode::InvalidRequest);
}

#[tokio::test]
async fn test_unregistered_redirect_is_never_used() {
    let fx = fixture().await;
    let request = AuthorizationRequest {
        redirect_uri: Some("https://attacker.example/cb".into()),
        ..code_request(&fx.client, "read", Consent::Approved)
    };
    let err = protocol(fx.tokens.authorize(&fx.user, &request, &origin()).await.unwrap_err());
    assert_eq!(err.error, ErrorCode::InvalidRequest);
    assert_eq!(err.redirect_uri, None);
}

#[tokio::test]
async fn test_default_redirect_and_alternate_redirect() {
    let fx = fixture().await;
    let without = AuthorizationRequest {
        redirect_uri: None,
        ..code_request(&fx.client, "read", Consent::Approved)
    };
    let AuthorizeOutcome::Granted(grant) =
        fx.tokens.authorize(&fx.user, &without, &origin()).await.unwrap()
    else {
        panic!("expected a grant");
    };
    assert_eq!(grant.redirect_uri, CALLBACK);

    let alternate = AuthorizationRequest {
        redirect_uri: Some(ALT_CALLBACK.into()),
        ..code_request(&fx.client, "read", Consent::Approved)
    };
    let AuthorizeOutcome::Granted(grant) =
        fx.tokens.authorize(&fx.user, &alternate, &origin()).await.unwrap()
    else {
        panic!("expected a grant");
    };
    assert_eq!(grant.redirect_uri, ALT_CALLBACK);
}

#[tokio::test]
async fn test_unrecognised_scope_falls_back_to_public() {
    let fx = fixture().await;
    let AuthorizeOutcome::Granted(grant) = fx
        .tokens
        .authorize(
            &fx.user,
            &code_request(&fx.client, "admin", Consent::Approved),
            &origin(),
        )
        .await
        .unwrap()
    else {
        panic!("expected a grant");
    };
    assert_eq!(grant.scope, Scope::Public);
}

#[tokio::test]
async fn test_denied_consent_is_access_denied() {
    let fx = fixture().await;
    let err = protocol(
        fx.tokens
            .authorize(
                &fx.user,
                &code_request(&fx.client, "read", Consent::Denied),
                &origin(),
            )
            .await
            .unwrap_err(),
    );
    assert_eq!(err.error, ErrorCode::AccessDenied);
    assert_eq!(err.state.as_deref(), Some("xyz"));
    assert_eq!(err.redirect_uri.as_deref(), Some(CALLBACK));
}

// =============================================================================
// Code exchange
// =============================================================================

#[tokio::test]
async fn test_code_is_single_use() {
    let fx = fixture().await;
    let code = issue_code(&fx, "read_write").await;

    let issued = fx
        .tokens
        .exchange_code(&fx.client, Some(code.as_str()), Some(CALLBACK), &origin())
        .await
        .unwrap();
    assert_eq!(issued.scope, Scope::ReadWrite);
    assert_eq!(issued.expires_in, 3600);

    let err = protocol(
        fx.tokens
            .exchange_code(&fx.client, Some(code.as_str()), Some(CALLBACK), &origin())
            .await
            .unwrap_err(),
    );
    assert_eq!(err.error, ErrorCode::InvalidGrant);

    let grant = store::find_session_by_token(fx.db.as_ref(), &code, TokenKind::GrantToken)
        .await
        .unwrap()
        .unwrap();
    assert!(grant.invalidated);
}

#[tokio::test]
async fn test_concurrent_exchanges_yield_exactly_one_token_pair() {
    let fx = fixture().await;
    let code = issue_code(&fx, "read").await;
    let origin = origin();

    let attempts = (0..8).map(|_| {
        fx.tokens
            .exchange_code(&fx.client, Some(code.as_str()), Some(CALLBACK), &origin)
    });
    let results = join_all(attempts).await;

    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    for result in results.into_iter().filter(|r| r.is_err()) {
        assert_eq!(protocol(result.unwrap_err()).error, ErrorCode::InvalidGrant);
    }

    let access_tokens = session::Entity::find()
        .all(fx.db.as_ref())
        .await
        .unwrap()
        .into_iter()
        .filter(|s| s.token_type == TokenKind::AccessToken)
        .count();
    assert_eq!(access_tokens, 1);
}

#[tokio::test]
async fn test_grant_spent_after_lookup_is_rejected() {
    let fx = fixture().await;
    let code = issue_code(&fx, "read").await;
    let db = fx.db.as_ref();

    // Both redemptions read the row while it is still valid.
    let first = store::find_session_by_token(db, &code, TokenKind::GrantToken)
        .await
        .unwrap()
        .unwrap();
    let stale = first.clone();
    assert!(stale.is_active());

    consume_grant_token(db, &first).await.unwrap();
    let err = protocol(consume_grant_token(db, &stale).await.unwrap_err());
    assert_eq!(err.error, ErrorCode::InvalidGrant);

    let err = protocol(
        fx.tokens
            .exchange_code(&fx.client, Some(code.as_str()), None, &origin())
            .await
            .unwrap_err(),
    );
    assert_eq!(err.error, ErrorCode::InvalidGrant);
}

#[tokio::test]
async fn test_code_bound_to_issuing_client() {
    let fx = fixture().await;
    let other = register_client(&fx.db, "Pioneer", ClientType::Confidential).await;
    let code = issue_code(&fx, "read").await;

    let err = protocol(
        fx.tokens
            .exchange_code(&other, Some(code.as_str()), None, &origin())
            .await
            .unwrap_err(),
    );
    assert_eq!(err.error, ErrorCode::InvalidGrant);

    // The failed attempt must not burn the code.
    assert!(
        fx.tokens
            .exchange_code(&fx.client, Some(code.as_str()), None, &origin())
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_expired_code_is_rejected() {
    let fx = fixture().await;
    let code = issue_code(&fx, "read").await;
    backdate(&fx.db, &code, TokenKind::GrantToken).await;

    let err = protocol(
        fx.tokens
            .exchange_code(&fx.client, Some(code.as_str()), None, &origin())
            .await
            .unwrap_err(),
    );
    assert_eq!(err.error, ErrorCode::InvalidGrant);
}

#[tokio::test]
async fn test_exchange_with_unregistered_redirect_is_rejected() {
    let fx = fixture().await;
    let code = issue_code(&fx, "read").await;
    let err = protocol(
        fx.tokens
            .exchange_code(
                &fx.client,
                Some(code.as_str()),
                Some("https://attacker.example/cb"),
                &origin(),
            )
            .await
            .unwrap_err(),
    );
    assert_eq!(err.error, ErrorCode::InvalidGrant);
}

#[tokio::test]
async fn test_unknown_and_missing_codes() {
    let fx = fixture().await;
    let err = protocol(
        fx.tokens
            .exchange_code(&fx.client, Some("not-a-code"), None, &origin())
            .await
            .unwrap_err(),
    );
    assert_eq!(err.error, ErrorCode::InvalidGrant);

    let err = protocol(
        fx.tokens
            .exchange_code(&fx.client, None, None, &origin())
            .await
            .unwrap_err(),
    );
    assert_eq!(err.error, ErrorCode::InvalidRequest);
}

#[tokio::test]
async fn test_configured_lifetimes_are_applied() {
    let fx = fixture_with(OAuth2Config {
        grant_token_lifetime: 60,
        access_token_lifetime: 900,
        action_token_lifetime: 120,
    })
    .await;
    let code = issue_code(&fx, "read").await;
    let grant = store::find_session_by_token(fx.db.as_ref(), &code, TokenKind::GrantToken)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(grant.expires_in, 60);

    let issued = fx
        .tokens
        .exchange_code(&fx.client, Some(code.as_str()), None, &origin())
        .await
        .unwrap();
    assert_eq!(issued.expires_in, 900);

    let refresh =
        store::find_session_by_token(fx.db.as_ref(), &issued.refresh_token, TokenKind::RefreshToken)
            .await
            .unwrap()
            .unwrap();
    assert_eq!(refresh.expires_in, 0);
    assert_eq!(refresh.ip, "127.0.0.1");
    assert_eq!(refresh.user_agent, "fixture-agent/1.0");
}

// =============================================================================
// Refresh
// =============================================================================

async fn token_pair(fx: &Fixture, scope: &str) -> space::oauth2::TokenGrant {
    let code = issue_code(fx, scope).await;
    fx.tokens
        .exchange_code(&fx.client, Some(code.as_str()), None, &origin())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_refresh_keeps_scope_and_refresh_token() {
    let fx = fixture().await;
    let pair = token_pair(&fx, "read").await;

    let refreshed = fx
        .tokens
        .refresh(&fx.client, Some(pair.refresh_token.as_str()), None, &origin())
        .await
        .unwrap();
    assert_eq!(refreshed.scope, Scope::Read);
    assert_eq!(refreshed.refresh_token, pair.refresh_token);
    assert_ne!(refreshed.access_token, pair.access_token);

    // Not rotated: the same refresh token keeps working.
    assert!(
        fx.tokens
            .refresh(&fx.client, Some(pair.refresh_token.as_str()), None, &origin())
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_refresh_scope_rules() {
    let fx = fixture().await;
    let pair = token_pair(&fx, "read").await;

    let narrower = fx
        .tokens
        .refresh(&fx.client, Some(pair.refresh_token.as_str()), Some("public"), &origin())
        .await
        .unwrap();
    assert_eq!(narrower.scope, Scope::Public);

    let same = fx
        .tokens
        .refresh(&fx.client, Some(pair.refresh_token.as_str()), Some("read"), &origin())
        .await
        .unwrap();
    assert_eq!(same.scope, Scope::Read);

    for requested in ["read_write", "admin"] {
        let err = protocol(
            fx.tokens
                .refresh(&fx.client, Some(pair.refresh_token.as_str()), Some(requested), &origin())
                .await
                .unwrap_err(),
        );
        assert_eq!(err.error, ErrorCode::InvalidScope, "requested {requested}");
    }
}

#[tokio::test]
async fn test_refresh_rejections() {
    let fx = fixture().await;
    let other = register_client(&fx.db, "Pioneer", ClientType::Confidential).await;
    let pair = token_pair(&fx, "read").await;

    let err = protocol(
        fx.tokens
            .refresh(&other, Some(pair.refresh_token.as_str()), None, &origin())
            .await
            .unwrap_err(),
    );
    assert_eq!(err.error, ErrorCode::InvalidGrant);

    // An access token is not a refresh token.
    let err = protocol(
        fx.tokens
            .refresh(&fx.client, Some(pair.access_token.as_str()), None, &origin())
            .await
            .unwrap_err(),
    );
    assert_eq!(err.error, ErrorCode::InvalidGrant);

    let refresh =
        store::find_session_by_token(fx.db.as_ref(), &pair.refresh_token, TokenKind::RefreshToken)
            .await
            .unwrap()
            .unwrap();
    store::invalidate_session(fx.db.as_ref(), &refresh).await.unwrap();
    let err = protocol(
        fx.tokens
            .refresh(&fx.client, Some(pair.refresh_token.as_str()), None, &origin())
            .await
            .unwrap_err(),
    );
    assert_eq!(err.error, ErrorCode::InvalidGrant);

    let err = protocol(
        fx.tokens
            .refresh(&fx.client, None, None, &origin())
            .await
            .unwrap_err(),
    );
    assert_eq!(err.error, ErrorCode::InvalidRequest);
}

// =============================================================================
// Token endpoint dispatch
// =============================================================================

#[tokio::test]
async fn test_unsupported_grant_types() {
    let fx = fixture().await;
    for grant_type in ["password", "client_credentials"] {
        let request = TokenRequest {
            grant_type: grant_type.into(),
            ..Default::default()
        };
        let err = protocol(
            fx.tokens
                .token(&fx.client, &request, &origin())
                .await
                .unwrap_err(),
        );
        assert_eq!(err.error, ErrorCode::UnsupportedGrantType);
    }

    let request = TokenRequest {
        grant_type: "magic".into(),
        ..Default::default()
    };
    let err = protocol(
        fx.tokens
            .token(&fx.client, &request, &origin())
            .await
            .unwrap_err(),
    );
    assert_eq!(err.error, ErrorCode::InvalidRequest);
}

#[tokio::test]
async fn test_token_dispatches_to_exchange_and_refresh() {
    let fx = fixture().await;
    let code = issue_code(&fx, "read").await;
    let pair = fx
        .tokens
        .token(
            &fx.client,
            &TokenRequest {
                grant_type: "authorization_code".into(),
                code: Some(code),
                redirect_uri: Some(CALLBACK.into()),
                ..Default::default()
            },
            &origin(),
        )
        .await
        .unwrap();

    let refreshed = fx
        .tokens
        .token(
            &fx.client,
            &TokenRequest {
                grant_type: "refresh_token".into(),
                refresh_token: Some(pair.refresh_token.clone()),
                scope: Some("public".into()),
                ..Default::default()
            },
            &origin(),
        )
        .await
        .unwrap();
    assert_eq!(refreshed.scope, Scope::Public);
}

// =============================================================================
// First-party tokens
// =============================================================================

#[tokio::test]
async fn test_action_token_has_no_exchange_step() {
    let fx = fixture().await;
    let token = fx
        .tokens
        .mint_action_token(&fx.user, &fx.client, Scope::ReadWrite, &origin())
        .await
        .unwrap();
    assert_eq!(token.token_type, TokenKind::ActionToken);
    assert_eq!(token.scopes, Scope::ReadWrite);
    assert_eq!(token.expires_in, 3600);
    assert!(token.is_active());
}

#[tokio::test]
async fn test_first_party_handoff_is_single_use() {
    let fx = fixture().await;
    let jupiter = find_or_create_client(fx.db.as_ref(), "Jupiter", "http://localhost:8080")
        .await
        .unwrap();
    let grant = fx
        .tokens
        .issue_first_party_code(&jupiter, &fx.user, &origin())
        .await
        .unwrap();

    let handoff = FirstPartyHandoff {
        client_id: jupiter.key.clone(),
        code: grant.token.clone(),
        grant_type: "authorization_code".into(),
        scope: "public".into(),
    };
    let user = fx
        .tokens
        .redeem_first_party_code(&jupiter, &handoff)
        .await
        .unwrap();
    assert_eq!(user.id, fx.user.id);

    let err = protocol(
        fx.tokens
            .redeem_first_party_code(&jupiter, &handoff)
            .await
            .unwrap_err(),
    );
    assert_eq!(err.error, ErrorCode::InvalidGrant);
}

#[tokio::test]
async fn test_first_party_handoff_parameters_checked() {
    let fx = fixture().await;
    let jupiter = find_or_create_client(fx.db.as_ref(), "Jupiter", "http://localhost:8080")
        .await
        .unwrap();
    let grant = fx
        .tokens
        .issue_first_party_code(&jupiter, &fx.user, &origin())
        .await
        .unwrap();

    let wrong_scope = FirstPartyHandoff {
        client_id: jupiter.key.clone(),
        code: grant.token.clone(),
        grant_type: "authorization_code".into(),
        scope: "read".into(),
    };
    let err = protocol(
        fx.tokens
            .redeem_first_party_code(&jupiter, &wrong_scope)
            .await
            .unwrap_err(),
    );
    assert_eq!(err.error, ErrorCode::InvalidRequest);

    // A third-party code cannot be redeemed as a first-party one.
    let third_party = issue_code(&fx, "public").await;
    let smuggled = FirstPartyHandoff {
        client_id: jupiter.key.clone(),
        code: third_party,
        grant_type: "authorization_code".into(),
        scope: "public".into(),
    };
    let err = protocol(
        fx.tokens
            .redeem_first_party_code(&jupiter, &smuggled)
            .await
            .unwrap_err(),
    );
    assert_eq!(err.error, ErrorCode::InvalidGrant);
}
