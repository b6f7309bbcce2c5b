// ABOUTME: Token endpoint integration tests across all six grant types
// ABOUTME: Covers exactly-once code exchange, PKCE binding, rotation, and delegate gating
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::sync::Arc;

use common::{
    obtain_authorization_code, setup, tenant, CLIENT_ID, CLIENT_SECRET, CODE_VERIFIER,
    REDIRECT_URI,
};
use idp_engine::token::client_auth::ClientCredentialsInput;
use idp_engine::token::TokenRequestParams;

fn code_exchange_params(code: &str, verifier: &str) -> TokenRequestParams {
    TokenRequestParams {
        grant_type: Some("authorization_code".to_owned()),
        code: Some(code.to_owned()),
        redirect_uri: Some(REDIRECT_URI.to_owned()),
        code_verifier: Some(verifier.to_owned()),
        ..TokenRequestParams::default()
    }
}

fn basic_credentials() -> ClientCredentialsInput {
    ClientCredentialsInput::basic(CLIENT_ID, CLIENT_SECRET)
}

#[tokio::test]
async fn code_exchange_with_valid_pkce_yields_tokens() {
    let env = setup();
    let code = obtain_authorization_code(&env, "openid profile").await;

    let response = env
        .token
        .token(
            &tenant(),
            code_exchange_params(&code, CODE_VERIFIER),
            &basic_credentials(),
        )
        .await
        .expect("exchange must succeed");

    assert!(!response.access_token.is_empty());
    assert_eq!(response.token_type, "Bearer");
    assert!(response.expires_in > 0);
    assert!(response.refresh_token.is_some());
    // openid scope earns an ID token
    assert!(response.id_token.is_some());
    let scope = response.scope.unwrap();
    assert!(scope.contains("openid"));
    assert!(scope.contains("profile"));
}

#[tokio::test]
async fn replayed_code_fails_with_invalid_grant() {
    let env = setup();
    let code = obtain_authorization_code(&env, "openid").await;

    env.token
        .token(
            &tenant(),
            code_exchange_params(&code, CODE_VERIFIER),
            &basic_credentials(),
        )
        .await
        .expect("first exchange succeeds");

    let err = env
        .token
        .token(
            &tenant(),
            code_exchange_params(&code, CODE_VERIFIER),
            &basic_credentials(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn concurrent_duplicate_exchange_succeeds_exactly_once() {
    let env = Arc::new(setup());
    let code = obtain_authorization_code(&env, "openid").await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let env = Arc::clone(&env);
        let code = code.clone();
        handles.push(tokio::spawn(async move {
            env.token
                .token(
                    &tenant(),
                    code_exchange_params(&code, CODE_VERIFIER),
                    &basic_credentials(),
                )
                .await
        }));
    }

    let mut successes = 0;
    let mut invalid_grants = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => successes += 1,
            Err(err) => {
                assert_eq!(err.error, "invalid_grant");
                invalid_grants += 1;
            }
        }
    }
    assert_eq!(successes, 1, "exactly one exchange may succeed");
    assert_eq!(invalid_grants, 7);
}

#[tokio::test]
async fn wrong_pkce_verifier_is_rejected() {
    let env = setup();
    let code = obtain_authorization_code(&env, "openid").await;
    let wrong = "a".repeat(43);
    let err = env
        .token
        .token(
            &tenant(),
            code_exchange_params(&code, &wrong),
            &basic_credentials(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");
}

#[tokio::test]
async fn mismatched_redirect_uri_is_rejected() {
    let env = setup();
    let code = obtain_authorization_code(&env, "openid").await;
    let mut params = code_exchange_params(&code, CODE_VERIFIER);
    params.redirect_uri = Some("https://rp.example.com/other".to_owned());
    let err = env
        .token
        .token(&tenant(), params, &basic_credentials())
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");
}

#[tokio::test]
async fn wrong_client_secret_is_invalid_client() {
    let env = setup();
    let code = obtain_authorization_code(&env, "openid").await;
    let err = env
        .token
        .token(
            &tenant(),
            code_exchange_params(&code, CODE_VERIFIER),
            &ClientCredentialsInput::basic(CLIENT_ID, "nope"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_client");
    assert_eq!(err.status_code(), 401);
}

#[tokio::test]
async fn refresh_rotates_and_retires_the_old_value() {
    let env = setup();
    let code = obtain_authorization_code(&env, "openid profile").await;
    let first = env
        .token
        .token(
            &tenant(),
            code_exchange_params(&code, CODE_VERIFIER),
            &basic_credentials(),
        )
        .await
        .unwrap();
    let old_refresh = first.refresh_token.unwrap();

    let second = env
        .token
        .token(
            &tenant(),
            TokenRequestParams {
                grant_type: Some("refresh_token".to_owned()),
                refresh_token: Some(old_refresh.clone()),
                ..TokenRequestParams::default()
            },
            &basic_credentials(),
        )
        .await
        .expect("refresh must succeed");
    let new_refresh = second.refresh_token.unwrap();
    assert_ne!(old_refresh, new_refresh);
    assert_ne!(first.access_token, second.access_token);

    // The rotated-out value is dead
    let err = env
        .token
        .token(
            &tenant(),
            TokenRequestParams {
                grant_type: Some("refresh_token".to_owned()),
                refresh_token: Some(old_refresh),
                ..TokenRequestParams::default()
            },
            &basic_credentials(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");
}

#[tokio::test]
async fn non_rotating_refresh_keeps_the_value_and_retires_the_old_access_token() {
    let env = setup();
    // Fixed refresh policy for this client; must be seeded before the first
    // protocol call warms the config cache
    let mut client = common::confidential_client();
    client.refresh_token_rotation = Some(false);
    env.store.put_client_config(&tenant(), client);

    let code = obtain_authorization_code(&env, "openid profile").await;
    let first = env
        .token
        .token(
            &tenant(),
            code_exchange_params(&code, CODE_VERIFIER),
            &basic_credentials(),
        )
        .await
        .unwrap();
    let refresh = first.refresh_token.clone().unwrap();

    let second = env
        .token
        .token(
            &tenant(),
            TokenRequestParams {
                grant_type: Some("refresh_token".to_owned()),
                refresh_token: Some(refresh.clone()),
                ..TokenRequestParams::default()
            },
            &basic_credentials(),
        )
        .await
        .expect("refresh must succeed");

    // Fixed policy: the same refresh value comes back, only the access
    // token is re-minted
    assert_eq!(second.refresh_token.as_deref(), Some(refresh.as_str()));
    assert_ne!(first.access_token, second.access_token);

    // The replaced access value no longer resolves
    let claims = env
        .token
        .introspect(
            &tenant(),
            &idp_engine::token::introspection::IntrospectionRequest {
                token: Some(first.access_token),
                token_type_hint: None,
            },
            &basic_credentials(),
        )
        .await
        .unwrap();
    assert_eq!(claims, serde_json::json!({ "active": false }));

    // The replacement does
    let claims = env
        .token
        .introspect(
            &tenant(),
            &idp_engine::token::introspection::IntrospectionRequest {
                token: Some(second.access_token),
                token_type_hint: None,
            },
            &basic_credentials(),
        )
        .await
        .unwrap();
    assert_eq!(claims["active"], true);
}

#[tokio::test]
async fn refresh_scope_may_narrow_but_not_widen() {
    let env = setup();
    let code = obtain_authorization_code(&env, "openid profile").await;
    let first = env
        .token
        .token(
            &tenant(),
            code_exchange_params(&code, CODE_VERIFIER),
            &basic_credentials(),
        )
        .await
        .unwrap();
    let refresh = first.refresh_token.unwrap();

    let narrowed = env
        .token
        .token(
            &tenant(),
            TokenRequestParams {
                grant_type: Some("refresh_token".to_owned()),
                refresh_token: Some(refresh.clone()),
                scope: Some("openid".to_owned()),
                ..TokenRequestParams::default()
            },
            &basic_credentials(),
        )
        .await
        .unwrap();
    assert_eq!(narrowed.scope.as_deref(), Some("openid"));

    let err = env
        .token
        .token(
            &tenant(),
            TokenRequestParams {
                grant_type: Some("refresh_token".to_owned()),
                refresh_token: narrowed.refresh_token,
                scope: Some("openid email api:read".to_owned()),
                ..TokenRequestParams::default()
            },
            &basic_credentials(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_scope");
}

#[tokio::test]
async fn client_credentials_issues_a_user_less_token_without_refresh() {
    let env = setup();
    let response = env
        .token
        .token(
            &tenant(),
            TokenRequestParams {
                grant_type: Some("client_credentials".to_owned()),
                scope: Some("api:read".to_owned()),
                ..TokenRequestParams::default()
            },
            &basic_credentials(),
        )
        .await
        .unwrap();
    assert!(response.refresh_token.is_none());
    assert!(response.id_token.is_none());
    assert_eq!(response.scope.as_deref(), Some("api:read"));
}

#[tokio::test]
async fn password_grant_works_through_the_delegate() {
    let env = setup();
    let ok = env
        .token
        .token(
            &tenant(),
            TokenRequestParams {
                grant_type: Some("password".to_owned()),
                username: Some("alice".to_owned()),
                password: Some("wonderland".to_owned()),
                scope: Some("openid".to_owned()),
                ..TokenRequestParams::default()
            },
            &basic_credentials(),
        )
        .await
        .unwrap();
    assert!(ok.id_token.is_some());

    let err = env
        .token
        .token(
            &tenant(),
            TokenRequestParams {
                grant_type: Some("password".to_owned()),
                username: Some("alice".to_owned()),
                password: Some("queen-of-hearts".to_owned()),
                scope: Some("openid".to_owned()),
                ..TokenRequestParams::default()
            },
            &basic_credentials(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "invalid_grant");
}

#[tokio::test]
async fn jwt_bearer_assertion_maps_to_its_subject() {
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

    #[derive(serde::Serialize)]
    struct Claims<'a> {
        iss: &'a str,
        sub: &'a str,
        aud: &'a str,
        exp: i64,
    }

    let env = setup();
    let assertion = encode(
        &Header::new(Algorithm::HS256),
        &Claims {
            iss: CLIENT_ID,
            sub: "service-account-7",
            aud: "https://idp.example.com/tenant-1",
            exp: chrono::Utc::now().timestamp() + 300,
        },
        &EncodingKey::from_secret(CLIENT_SECRET.as_bytes()),
    )
    .unwrap();

    let response = env
        .token
        .token(
            &tenant(),
            TokenRequestParams {
                grant_type: Some("urn:ietf:params:oauth:grant-type:jwt-bearer".to_owned()),
                assertion: Some(assertion),
                scope: Some("api:read".to_owned()),
                ..TokenRequestParams::default()
            },
            &basic_credentials(),
        )
        .await
        .unwrap();
    // Assertion grants issue no refresh token
    assert!(response.refresh_token.is_none());

    // The issued token introspects with the asserted subject
    let claims = env
        .token
        .introspect(
            &tenant(),
            &idp_engine::token::introspection::IntrospectionRequest {
                token: Some(response.access_token),
                token_type_hint: None,
            },
            &basic_credentials(),
        )
        .await
        .unwrap();
    assert_eq!(claims["sub"], "service-account-7");
}

#[tokio::test]
async fn verifiable_credential_requests_earn_a_c_nonce() {
    let env = setup();
    let mut params = common::code_request_params("openid");
    params.authorization_details =
        Some(r#"[{"type":"openid_credential","credential_configuration_id":"idcard"}]"#.to_owned());
    let outcome = env.oauth.request(&tenant(), &params, None).await;
    let idp_engine::oauth::OAuthRequestOutcome::InteractionRequired { request_id } = outcome
    else {
        panic!("expected interaction");
    };
    let code = common::authorize_request(&env, request_id).await;

    let response = env
        .token
        .token(
            &tenant(),
            code_exchange_params(&code, CODE_VERIFIER),
            &basic_credentials(),
        )
        .await
        .unwrap();
    assert!(response.c_nonce.is_some());
    assert_eq!(response.c_nonce_expires_in, Some(3600));
}

#[tokio::test]
async fn unknown_grant_type_is_unsupported() {
    let env = setup();
    let err = env
        .token
        .token(
            &tenant(),
            TokenRequestParams {
                grant_type: Some("implicit".to_owned()),
                ..TokenRequestParams::default()
            },
            &basic_credentials(),
        )
        .await
        .unwrap_err();
    assert_eq!(err.error, "unsupported_grant_type");
}
