// ABOUTME: Per-tenant authorization server configuration consumed by context builders
// ABOUTME: Carries supported protocol surface, token lifetimes, and ID-token signing material
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use serde::{Deserialize, Serialize};

use super::environment::ServerDefaults;
use crate::oauth::response::ResponseType;
use crate::pkce::CodeChallengeMethod;
use crate::token::{ClientAuthMethod, GrantType};

/// Signature algorithm for ID tokens and logout-hint verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SigningAlg {
    /// HMAC with SHA-256, keyed by `hmac_secret`
    HS256,
    /// RSA PKCS#1 v1.5 with SHA-256, keyed by the PEM pair
    RS256,
}

/// ID-token signing material for one tenant.
///
/// Exactly one key family is populated, matching `alg`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningKeys {
    /// Signature algorithm
    pub alg: SigningAlg,
    /// Shared secret for `HS256`
    #[serde(default)]
    pub hmac_secret: Option<String>,
    /// PKCS#8 PEM private key for `RS256`
    #[serde(default)]
    pub rsa_private_key_pem: Option<String>,
    /// PEM public key for `RS256` verification
    #[serde(default)]
    pub rsa_public_key_pem: Option<String>,
    /// Key id advertised in JWT headers
    #[serde(default)]
    pub kid: Option<String>,
}

impl SigningKeys {
    /// HS256 keys from a shared secret
    pub fn hs256(secret: impl Into<String>) -> Self {
        Self {
            alg: SigningAlg::HS256,
            hmac_secret: Some(secret.into()),
            rsa_private_key_pem: None,
            rsa_public_key_pem: None,
            kid: None,
        }
    }
}

/// Authorization server configuration for one tenant.
///
/// Mirrors the discovery-document surface the control plane manages; only the
/// fields this engine consults are modeled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationServerConfig {
    /// Issuer identifier (`iss` in every token this tenant mints)
    pub issuer: String,
    /// Scopes this tenant recognizes
    pub scopes_supported: Vec<String>,
    /// Response types the authorization endpoint accepts
    pub response_types_supported: Vec<ResponseType>,
    /// Grant types the token endpoint accepts
    pub grant_types_supported: Vec<GrantType>,
    /// Client authentication methods the token endpoint accepts
    pub token_endpoint_auth_methods_supported: Vec<ClientAuthMethod>,
    /// PKCE challenge methods accepted; an empty list disables PKCE entirely
    pub code_challenge_methods_supported: Vec<CodeChallengeMethod>,
    /// Require PKCE from public clients (RFC 7636 recommendation)
    #[serde(default = "default_true")]
    pub require_pkce_for_public_clients: bool,
    /// Lifetime of a stored authorization request
    #[serde(default = "default_request_ttl")]
    pub authorization_request_ttl_secs: i64,
    /// Lifetime of an issued authorization code
    #[serde(default = "default_code_ttl")]
    pub authorization_code_ttl_secs: i64,
    /// Default access-token lifetime, overridable per client
    #[serde(default = "default_access_ttl")]
    pub access_token_ttl_secs: i64,
    /// Default refresh-token lifetime, overridable per client
    #[serde(default = "default_refresh_ttl")]
    pub refresh_token_ttl_secs: i64,
    /// ID-token lifetime
    #[serde(default = "default_access_ttl")]
    pub id_token_ttl_secs: i64,
    /// Default rotation policy for refresh tokens, overridable per client
    #[serde(default = "default_true")]
    pub refresh_token_rotation: bool,
    /// Lifetime of a CIBA `auth_req_id`
    #[serde(default = "default_ciba_ttl")]
    pub backchannel_auth_request_ttl_secs: i64,
    /// Minimum polling interval handed to CIBA clients
    #[serde(default = "default_ciba_interval")]
    pub backchannel_polling_interval_secs: i64,
    /// ID-token signing material
    pub signing: SigningKeys,
}

const fn default_true() -> bool {
    true
}
const fn default_request_ttl() -> i64 {
    1800
}
const fn default_code_ttl() -> i64 {
    600
}
const fn default_access_ttl() -> i64 {
    3600
}
const fn default_refresh_ttl() -> i64 {
    86_400 * 30
}
const fn default_ciba_ttl() -> i64 {
    300
}
const fn default_ciba_interval() -> i64 {
    5
}

impl AuthorizationServerConfig {
    /// Baseline configuration for a new tenant: code flow with PKCE and
    /// refresh tokens, lifetimes seeded from the server-level defaults.
    ///
    /// The control plane widens the protocol surface from here.
    pub fn new(issuer: impl Into<String>, signing: SigningKeys, defaults: &ServerDefaults) -> Self {
        Self {
            issuer: issuer.into(),
            scopes_supported: vec!["openid".to_owned()],
            response_types_supported: vec![ResponseType::Code],
            grant_types_supported: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
            token_endpoint_auth_methods_supported: vec![ClientAuthMethod::ClientSecretBasic],
            code_challenge_methods_supported: vec![CodeChallengeMethod::S256],
            require_pkce_for_public_clients: true,
            authorization_request_ttl_secs: default_request_ttl(),
            authorization_code_ttl_secs: defaults.authorization_code_ttl_secs,
            access_token_ttl_secs: defaults.access_token_ttl_secs,
            refresh_token_ttl_secs: defaults.refresh_token_ttl_secs,
            id_token_ttl_secs: defaults.access_token_ttl_secs,
            refresh_token_rotation: defaults.refresh_token_rotation,
            backchannel_auth_request_ttl_secs: default_ciba_ttl(),
            backchannel_polling_interval_secs: default_ciba_interval(),
            signing,
        }
    }

    /// Whether the tenant accepts this response type at all
    #[must_use]
    pub fn supports_response_type(&self, response_type: ResponseType) -> bool {
        self.response_types_supported.contains(&response_type)
    }

    /// Whether the tenant accepts this grant type at all
    #[must_use]
    pub fn supports_grant_type(&self, grant_type: GrantType) -> bool {
        self.grant_types_supported.contains(&grant_type)
    }

    /// Whether the tenant accepts this PKCE challenge method
    #[must_use]
    pub fn supports_code_challenge_method(&self, method: CodeChallengeMethod) -> bool {
        self.code_challenge_methods_supported.contains(&method)
    }

    /// Whether every requested scope is recognized by the tenant
    #[must_use]
    pub fn recognizes_scopes<'a>(&self, scopes: impl IntoIterator<Item = &'a str>) -> bool {
        scopes
            .into_iter()
            .all(|scope| self.scopes_supported.iter().any(|s| s == scope))
    }
}
