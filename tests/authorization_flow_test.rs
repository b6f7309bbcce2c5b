// ABOUTME: Authorization endpoint integration tests: request validation, decisions, SSO merge
// ABOUTME: Exercises the redirectable vs non-redirectable split and the standing-consent record
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
#![allow(missing_docs)]

mod common;

use std::collections::BTreeSet;
use uuid::Uuid;

use common::{
    authorize_request, code_request_params, extract_param, obtain_authorization_code,
    password_authentication, setup, tenant, test_user, CLIENT_ID, REDIRECT_URI,
};
use idp_engine::oauth::{
    AuthorizationRequestParams, AuthorizeOutcome, DenyReason, OAuthAuthorizeRequest,
    OAuthRequestOutcome, PushedRequestOutcome,
};
use idp_engine::storage::AuthorizationGrantedRepository;
use idp_engine::token::client_auth::ClientCredentialsInput;

#[tokio::test]
async fn code_flow_produces_a_code_on_the_registered_redirect() {
    let env = setup();
    let outcome = env
        .oauth
        .request(&tenant(), &code_request_params("openid profile"), None)
        .await;
    let request_id = match outcome {
        OAuthRequestOutcome::InteractionRequired { request_id } => request_id,
        other => panic!("expected interaction, got {other:?}"),
    };

    let code = authorize_request(&env, request_id).await;
    assert!(!code.is_empty());
}

#[tokio::test]
async fn authorize_redirect_echoes_state_in_query_for_code() {
    let env = setup();
    let outcome = env
        .oauth
        .request(&tenant(), &code_request_params("openid"), None)
        .await;
    let OAuthRequestOutcome::InteractionRequired { request_id } = outcome else {
        panic!("expected interaction");
    };
    let decision = env
        .oauth
        .authorize(&OAuthAuthorizeRequest {
            tenant_id: tenant(),
            authorization_request_id: request_id,
            user: test_user(),
            authentication: password_authentication(),
            granted_scopes: BTreeSet::new(),
            denied_scopes: BTreeSet::new(),
            custom_properties: serde_json::Map::new(),
        })
        .await;
    let AuthorizeOutcome::Redirect { location } = decision else {
        panic!("expected redirect");
    };
    assert!(location.starts_with(&format!("{REDIRECT_URI}?")));
    assert_eq!(extract_param(&location, "state").as_deref(), Some("af0ifjsldkj"));
}

#[tokio::test]
async fn unregistered_redirect_uri_never_redirects() {
    let env = setup();
    let mut params = code_request_params("openid");
    params.redirect_uri = Some("https://evil.example.com/cb".to_owned());
    let outcome = env.oauth.request(&tenant(), &params, None).await;
    match outcome {
        OAuthRequestOutcome::BadRequest { error, .. } => assert_eq!(error, "invalid_request"),
        other => panic!("expected inline bad request, got {other:?}"),
    }
}

#[tokio::test]
async fn unknown_client_is_a_non_redirectable_error() {
    let env = setup();
    let mut params = code_request_params("openid");
    params.client_id = Some("ghost".to_owned());
    let outcome = env.oauth.request(&tenant(), &params, None).await;
    assert!(matches!(outcome, OAuthRequestOutcome::BadRequest { .. }));
}

#[tokio::test]
async fn unregistered_scope_errors_via_redirect() {
    let env = setup();
    let mut params = code_request_params("openid payments:write");
    params.scope = Some("openid payments:write".to_owned());
    let outcome = env.oauth.request(&tenant(), &params, None).await;
    match outcome {
        OAuthRequestOutcome::RedirectableError { location } => {
            assert!(location.starts_with(REDIRECT_URI));
            assert_eq!(
                extract_param(&location, "error").as_deref(),
                Some("invalid_scope")
            );
            assert_eq!(
                extract_param(&location, "state").as_deref(),
                Some("af0ifjsldkj")
            );
        }
        other => panic!("expected redirectable error, got {other:?}"),
    }
}

#[tokio::test]
async fn public_client_without_pkce_is_rejected() {
    let env = setup();
    let params = AuthorizationRequestParams {
        response_type: Some("code".to_owned()),
        client_id: Some(common::PUBLIC_CLIENT_ID.to_owned()),
        redirect_uri: Some("com.example.app:/callback".to_owned()),
        scope: Some("openid".to_owned()),
        ..AuthorizationRequestParams::default()
    };
    let outcome = env.oauth.request(&tenant(), &params, None).await;
    match outcome {
        OAuthRequestOutcome::RedirectableError { location } => {
            assert_eq!(
                extract_param(&location, "error").as_deref(),
                Some("invalid_request")
            );
        }
        other => panic!("expected redirectable error, got {other:?}"),
    }
}

#[tokio::test]
async fn implicit_token_response_lands_in_the_fragment() {
    let env = setup();
    let params = AuthorizationRequestParams {
        response_type: Some("token".to_owned()),
        client_id: Some(CLIENT_ID.to_owned()),
        redirect_uri: Some(REDIRECT_URI.to_owned()),
        scope: Some("profile".to_owned()),
        state: Some("s1".to_owned()),
        ..AuthorizationRequestParams::default()
    };
    let OAuthRequestOutcome::InteractionRequired { request_id } =
        env.oauth.request(&tenant(), &params, None).await
    else {
        panic!("expected interaction");
    };
    let decision = env
        .oauth
        .authorize(&OAuthAuthorizeRequest {
            tenant_id: tenant(),
            authorization_request_id: request_id,
            user: test_user(),
            authentication: password_authentication(),
            granted_scopes: BTreeSet::new(),
            denied_scopes: BTreeSet::new(),
            custom_properties: serde_json::Map::new(),
        })
        .await;
    let AuthorizeOutcome::Redirect { location } = decision else {
        panic!("expected redirect");
    };
    let (_, fragment) = location.split_once('#').expect("fragment expected");
    assert!(fragment.contains("access_token="));
    assert!(fragment.contains("token_type=Bearer"));
    assert!(!location.split_once('#').unwrap().0.contains("access_token"));
}

#[tokio::test]
async fn hybrid_code_id_token_carries_both_artifacts() {
    let env = setup();
    let mut params = code_request_params("openid profile");
    params.response_type = Some("code id_token".to_owned());
    let OAuthRequestOutcome::InteractionRequired { request_id } =
        env.oauth.request(&tenant(), &params, None).await
    else {
        panic!("expected interaction");
    };
    let decision = env
        .oauth
        .authorize(&OAuthAuthorizeRequest {
            tenant_id: tenant(),
            authorization_request_id: request_id,
            user: test_user(),
            authentication: password_authentication(),
            granted_scopes: BTreeSet::new(),
            denied_scopes: BTreeSet::new(),
            custom_properties: serde_json::Map::new(),
        })
        .await;
    let AuthorizeOutcome::Redirect { location } = decision else {
        panic!("expected redirect");
    };
    assert!(extract_param(&location, "code").is_some());
    assert!(extract_param(&location, "id_token").is_some());
}

#[tokio::test]
async fn deny_redirects_with_reason_and_state() {
    let env = setup();
    let OAuthRequestOutcome::InteractionRequired { request_id } = env
        .oauth
        .request(&tenant(), &code_request_params("openid"), None)
        .await
    else {
        panic!("expected interaction");
    };
    let outcome = env
        .oauth
        .deny(&tenant(), request_id, DenyReason::AccessDenied)
        .await;
    let AuthorizeOutcome::Redirect { location } = outcome else {
        panic!("expected redirect");
    };
    assert_eq!(
        extract_param(&location, "error").as_deref(),
        Some("access_denied")
    );
    assert_eq!(
        extract_param(&location, "state").as_deref(),
        Some("af0ifjsldkj")
    );

    // A denied request is consumed
    let replay = env
        .oauth
        .deny(&tenant(), request_id, DenyReason::AccessDenied)
        .await;
    assert!(matches!(replay, AuthorizeOutcome::BadRequest { .. }));
}

#[tokio::test]
async fn unknown_request_identifier_cannot_be_authorized() {
    let env = setup();
    let outcome = env
        .oauth
        .authorize(&OAuthAuthorizeRequest {
            tenant_id: tenant(),
            authorization_request_id: Uuid::new_v4(),
            user: test_user(),
            authentication: password_authentication(),
            granted_scopes: BTreeSet::new(),
            denied_scopes: BTreeSet::new(),
            custom_properties: serde_json::Map::new(),
        })
        .await;
    assert!(matches!(outcome, AuthorizeOutcome::BadRequest { .. }));
}

#[tokio::test]
async fn standing_consent_grows_to_the_union_of_granted_scopes() {
    let env = setup();
    let _ = obtain_authorization_code(&env, "openid profile").await;
    let _ = obtain_authorization_code(&env, "openid email").await;

    let granted = env
        .store
        .find(&tenant(), CLIENT_ID, common::USER_SUB)
        .await
        .unwrap()
        .expect("standing consent must exist");
    for scope in ["openid", "profile", "email"] {
        assert!(
            granted.grant.scopes.contains(scope),
            "missing scope {scope} in {:?}",
            granted.grant.scopes
        );
    }
}

#[tokio::test]
async fn return_visit_with_covered_scopes_is_silently_authorizable() {
    let env = setup();
    let _ = obtain_authorization_code(&env, "openid profile").await;

    // Same scopes, same user session: no interaction needed
    let outcome = env
        .oauth
        .request(&tenant(), &code_request_params("openid"), Some(&test_user()))
        .await;
    assert!(matches!(
        outcome,
        OAuthRequestOutcome::SilentlyAuthorizable { .. }
    ));

    // A scope never consented to forces interaction again
    let outcome = env
        .oauth
        .request(
            &tenant(),
            &code_request_params("openid email"),
            Some(&test_user()),
        )
        .await;
    assert!(matches!(
        outcome,
        OAuthRequestOutcome::InteractionRequired { .. }
    ));
}

#[tokio::test]
async fn pushed_requests_return_a_request_uri_and_never_redirect() {
    let env = setup();
    let credentials = ClientCredentialsInput::basic(CLIENT_ID, common::CLIENT_SECRET);
    let outcome = env
        .oauth
        .push_request(&tenant(), &code_request_params("openid"), &credentials)
        .await;
    match outcome {
        PushedRequestOutcome::Created {
            request_uri,
            expires_in,
        } => {
            assert!(request_uri.starts_with("urn:ietf:params:oauth:request_uri:"));
            assert!(expires_in > 0);
        }
        other => panic!("expected created, got {other:?}"),
    }

    // Redirect-class errors fold into JSON for pushed requests
    let mut bad = code_request_params("openid payments:write");
    bad.scope = Some("openid payments:write".to_owned());
    let outcome = env.oauth.push_request(&tenant(), &bad, &credentials).await;
    match outcome {
        PushedRequestOutcome::BadRequest { error, .. } => assert_eq!(error, "invalid_scope"),
        other => panic!("expected bad request, got {other:?}"),
    }
}

#[tokio::test]
async fn a_pushed_request_is_picked_up_by_request_uri() {
    let env = setup();
    let credentials = ClientCredentialsInput::basic(CLIENT_ID, common::CLIENT_SECRET);
    let PushedRequestOutcome::Created { request_uri, .. } = env
        .oauth
        .push_request(&tenant(), &code_request_params("openid"), &credentials)
        .await
    else {
        panic!("push must succeed");
    };

    let follow_up = AuthorizationRequestParams {
        client_id: Some(CLIENT_ID.to_owned()),
        request_uri: Some(request_uri),
        ..AuthorizationRequestParams::default()
    };
    let OAuthRequestOutcome::InteractionRequired { request_id } =
        env.oauth.request(&tenant(), &follow_up, None).await
    else {
        panic!("request_uri must resolve the stored request");
    };

    // The resolved request authorizes exactly like a front-channel one
    let code = authorize_request(&env, request_id).await;
    assert!(!code.is_empty());
}

#[tokio::test]
async fn a_request_uri_from_another_client_is_rejected() {
    let env = setup();
    let credentials = ClientCredentialsInput::basic(CLIENT_ID, common::CLIENT_SECRET);
    let PushedRequestOutcome::Created { request_uri, .. } = env
        .oauth
        .push_request(&tenant(), &code_request_params("openid"), &credentials)
        .await
    else {
        panic!("push must succeed");
    };

    let follow_up = AuthorizationRequestParams {
        client_id: Some(common::PUBLIC_CLIENT_ID.to_owned()),
        request_uri: Some(request_uri),
        ..AuthorizationRequestParams::default()
    };
    let outcome = env.oauth.request(&tenant(), &follow_up, None).await;
    assert!(matches!(outcome, OAuthRequestOutcome::BadRequest { .. }));
}
