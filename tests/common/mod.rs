// ABOUTME: Shared fixtures for the integration suite: seeded store, wired protocols, stub delegates
// ABOUTME: Every test runs against the bundled in-memory store with one tenant and two clients
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use idp_engine::ciba::{CibaDeliveryMode, CibaNotifier, CibaProtocol, UserHintResolver};
use idp_engine::config::{
    ApplicationType, AuthorizationServerConfig, ClientConfig, ConfigResolver, SigningKeys,
};
use idp_engine::identity::{Authentication, User};
use idp_engine::oauth::{
    AuthorizationRequestParams, OAuthAuthorizeRequest, OAuthProtocol, OAuthRequestHandler,
    OAuthRequestOutcome, ResponseType,
};
use idp_engine::pkce::CodeChallengeMethod;
use idp_engine::session::{LogoutHandler, LogoutProtocol};
use idp_engine::storage::InMemoryStore;
use idp_engine::tenant::TenantId;
use idp_engine::token::handler::{PasswordCredentialsVerifier, TokenRequestHandler};
use idp_engine::token::introspection::TokenIntrospectionHandler;
use idp_engine::token::revocation::TokenRevocationHandler;
use idp_engine::token::{ClientAuthMethod, GrantType, TokenProtocol};

pub const TENANT: &str = "tenant-1";
pub const CLIENT_ID: &str = "client-1";
pub const CLIENT_SECRET: &str = "correct-horse-battery-staple";
pub const PUBLIC_CLIENT_ID: &str = "native-app";
pub const REDIRECT_URI: &str = "https://rp.example.com/cb";
pub const POST_LOGOUT_URI: &str = "https://rp.example.com/signed-out";
pub const USER_SUB: &str = "user-1";

pub fn tenant() -> TenantId {
    TenantId::new(TENANT)
}

pub fn server_config() -> AuthorizationServerConfig {
    AuthorizationServerConfig {
        issuer: "https://idp.example.com/tenant-1".to_owned(),
        scopes_supported: ["openid", "profile", "email", "offline_access", "api:read"]
            .iter()
            .map(|s| (*s).to_owned())
            .collect(),
        response_types_supported: vec![
            ResponseType::Code,
            ResponseType::Token,
            ResponseType::IdToken,
            ResponseType::CodeToken,
            ResponseType::CodeIdToken,
            ResponseType::TokenIdToken,
            ResponseType::CodeTokenIdToken,
        ],
        grant_types_supported: vec![
            GrantType::AuthorizationCode,
            GrantType::RefreshToken,
            GrantType::ClientCredentials,
            GrantType::Password,
            GrantType::Ciba,
            GrantType::JwtBearer,
        ],
        token_endpoint_auth_methods_supported: vec![
            ClientAuthMethod::ClientSecretBasic,
            ClientAuthMethod::ClientSecretPost,
            ClientAuthMethod::ClientSecretJwt,
            ClientAuthMethod::PrivateKeyJwt,
            ClientAuthMethod::None,
        ],
        code_challenge_methods_supported: vec![CodeChallengeMethod::S256],
        require_pkce_for_public_clients: true,
        authorization_request_ttl_secs: 1800,
        authorization_code_ttl_secs: 600,
        access_token_ttl_secs: 3600,
        refresh_token_ttl_secs: 86_400,
        id_token_ttl_secs: 3600,
        refresh_token_rotation: true,
        backchannel_auth_request_ttl_secs: 300,
        backchannel_polling_interval_secs: 5,
        signing: SigningKeys::hs256("integration-test-signing-secret-32b"),
    }
}

pub fn confidential_client() -> ClientConfig {
    ClientConfig {
        client_id: CLIENT_ID.to_owned(),
        client_secret: Some(CLIENT_SECRET.to_owned()),
        client_name: "Relying Party".to_owned(),
        redirect_uris: vec![REDIRECT_URI.to_owned()],
        post_logout_redirect_uris: vec![POST_LOGOUT_URI.to_owned()],
        grant_types: vec![
            GrantType::AuthorizationCode,
            GrantType::RefreshToken,
            GrantType::ClientCredentials,
            GrantType::Password,
            GrantType::Ciba,
            GrantType::JwtBearer,
        ],
        response_types: vec![
            ResponseType::Code,
            ResponseType::Token,
            ResponseType::IdToken,
            ResponseType::CodeToken,
            ResponseType::CodeIdToken,
            ResponseType::TokenIdToken,
            ResponseType::CodeTokenIdToken,
        ],
        scopes: ["openid", "profile", "email", "offline_access", "api:read"]
            .iter()
            .map(|s| (*s).to_owned())
            .collect(),
        token_endpoint_auth_method: ClientAuthMethod::ClientSecretBasic,
        application_type: ApplicationType::Web,
        jwks: None,
        tls_client_auth_subject_dn: None,
        backchannel_token_delivery_mode: CibaDeliveryMode::Poll,
        backchannel_client_notification_endpoint: None,
        access_token_ttl_secs: None,
        refresh_token_ttl_secs: None,
        refresh_token_rotation: None,
        enabled: true,
    }
}

pub fn public_client() -> ClientConfig {
    ClientConfig {
        client_id: PUBLIC_CLIENT_ID.to_owned(),
        client_secret: None,
        client_name: "Native App".to_owned(),
        redirect_uris: vec!["com.example.app:/callback".to_owned()],
        post_logout_redirect_uris: vec![],
        grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
        response_types: vec![ResponseType::Code],
        scopes: vec!["openid".to_owned(), "profile".to_owned()],
        token_endpoint_auth_method: ClientAuthMethod::None,
        application_type: ApplicationType::Native,
        jwks: None,
        tls_client_auth_subject_dn: None,
        backchannel_token_delivery_mode: CibaDeliveryMode::Poll,
        backchannel_client_notification_endpoint: None,
        access_token_ttl_secs: None,
        refresh_token_ttl_secs: None,
        refresh_token_rotation: None,
        enabled: true,
    }
}

pub fn test_user() -> User {
    let mut user = User::with_subject(USER_SUB);
    user.name = Some("Test User".to_owned());
    user.email = Some("user@example.com".to_owned());
    user
}

pub fn password_authentication() -> Authentication {
    Authentication::new(vec!["pwd".to_owned()])
}

/// Stub credential verifier: accepts alice/wonderland within any tenant.
pub struct StubPasswordVerifier;

#[async_trait]
impl PasswordCredentialsVerifier for StubPasswordVerifier {
    async fn verify(
        &self,
        _tenant: &TenantId,
        username: &str,
        password: &str,
    ) -> anyhow::Result<Option<User>> {
        if username == "alice" && password == "wonderland" {
            Ok(Some(User::with_subject("alice")))
        } else {
            Ok(None)
        }
    }
}

/// Stub hint resolver: `user@example.com` maps to the test user.
pub struct StubHintResolver;

#[async_trait]
impl UserHintResolver for StubHintResolver {
    async fn resolve(&self, _tenant: &TenantId, hint: &str) -> anyhow::Result<Option<User>> {
        if hint == "user@example.com" {
            Ok(Some(test_user()))
        } else {
            Ok(None)
        }
    }
}

/// Records backchannel notifications instead of delivering them.
#[derive(Default)]
pub struct RecordingNotifier {
    pub deliveries: Mutex<Vec<(String, serde_json::Value)>>,
}

#[async_trait]
impl CibaNotifier for RecordingNotifier {
    async fn notify(
        &self,
        endpoint: &str,
        _client_notification_token: Option<&str>,
        payload: serde_json::Value,
    ) -> anyhow::Result<()> {
        self.deliveries
            .lock()
            .unwrap()
            .push((endpoint.to_owned(), payload));
        Ok(())
    }
}

/// Fully wired engine over one in-memory store.
pub struct TestEnv {
    pub store: Arc<InMemoryStore>,
    pub oauth: OAuthProtocol,
    pub token: TokenProtocol,
    pub ciba: CibaProtocol,
    pub logout: LogoutProtocol,
    pub notifier: Arc<RecordingNotifier>,
}

pub fn setup() -> TestEnv {
    // First caller installs the subscriber; later calls are no-ops
    idp_engine::logging::init(&idp_engine::logging::LoggingConfig::default()).ok();

    let store = Arc::new(InMemoryStore::new());
    let tenant = tenant();
    store.put_server_config(&tenant, server_config());
    store.put_client_config(&tenant, confidential_client());
    store.put_client_config(&tenant, public_client());

    let resolver = Arc::new(ConfigResolver::new(store.clone(), store.clone()));
    let notifier = Arc::new(RecordingNotifier::default());

    let oauth = OAuthProtocol::new(OAuthRequestHandler::new(
        resolver.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
    ));
    let token = TokenProtocol::new(
        TokenRequestHandler::new(
            resolver.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            Some(Arc::new(StubPasswordVerifier)),
        ),
        TokenIntrospectionHandler::new(resolver.clone(), store.clone()),
        TokenRevocationHandler::new(resolver.clone(), store.clone()),
    );
    let ciba = CibaProtocol::new(
        resolver.clone(),
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(StubHintResolver),
        Some(notifier.clone()),
    );
    let logout = LogoutProtocol::new(LogoutHandler::new(resolver, store.clone()));

    TestEnv {
        store,
        oauth,
        token,
        ciba,
        logout,
        notifier,
    }
}

/// PKCE pair used across the flow tests (RFC 7636 appendix B vector).
pub const CODE_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
pub const CODE_CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

pub fn code_request_params(scope: &str) -> AuthorizationRequestParams {
    AuthorizationRequestParams {
        response_type: Some("code".to_owned()),
        client_id: Some(CLIENT_ID.to_owned()),
        redirect_uri: Some(REDIRECT_URI.to_owned()),
        scope: Some(scope.to_owned()),
        state: Some("af0ifjsldkj".to_owned()),
        nonce: Some("n-0S6_WzA2Mj".to_owned()),
        code_challenge: Some(CODE_CHALLENGE.to_owned()),
        code_challenge_method: Some("S256".to_owned()),
        ..AuthorizationRequestParams::default()
    }
}

/// Run request + authorize for the confidential client and return the
/// authorization code extracted from the redirect.
pub async fn obtain_authorization_code(env: &TestEnv, scope: &str) -> String {
    let outcome = env.oauth.request(&tenant(), &code_request_params(scope), None).await;
    let request_id = match outcome {
        OAuthRequestOutcome::InteractionRequired { request_id }
        | OAuthRequestOutcome::SilentlyAuthorizable { request_id } => request_id,
        other => panic!("authorize request failed: {other:?}"),
    };
    authorize_request(env, request_id).await
}

/// Approve a stored request with the test user and return the code.
pub async fn authorize_request(env: &TestEnv, request_id: Uuid) -> String {
    let outcome = env
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
    let location = match outcome {
        idp_engine::oauth::AuthorizeOutcome::Redirect { location } => location,
        other => panic!("authorize decision failed: {other:?}"),
    };
    extract_param(&location, "code").expect("redirect carries no code")
}

/// Pull one query/fragment parameter out of a redirect location.
pub fn extract_param(location: &str, name: &str) -> Option<String> {
    let params = location.split_once(['?', '#'])?.1;
    params.split('&').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        if key == name {
            Some(urlencoding::decode(value).ok()?.into_owned())
        } else {
            None
        }
    })
}
