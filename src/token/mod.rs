// ABOUTME: Issued credential set (access/refresh/ID token) and token-endpoint building blocks
// ABOUTME: Tokens are immutable once created; revocation produces a replacement value
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

/// Client authentication at the token endpoint
pub mod client_auth;
/// Validated token request context
pub mod context;
/// Token endpoint error shape
pub mod error;
/// Per-grant-type creation services
pub mod grants;
/// Token endpoint dispatch
pub mod handler;
/// ID-token minting
pub mod id_token;
/// RFC 7662 introspection
pub mod introspection;
/// Token entry points
pub mod protocol;
/// RFC 7009 revocation
pub mod revocation;

pub use client_auth::{AuthenticatedClient, ClientCredentialsInput};
pub use error::TokenError;
pub use handler::TokenRequestParams;
pub use protocol::{TokenProtocol, TokenResponse};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::grant::AuthorizationGrant;
use crate::tenant::TenantId;

/// `grant_type` values the token endpoint dispatches on.
///
/// Closed set: adding a grant type means adding a variant and a handler arm,
/// and the compiler walks every dispatch site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrantType {
    /// RFC 6749 §4.1
    #[serde(rename = "authorization_code")]
    AuthorizationCode,
    /// RFC 6749 §6
    #[serde(rename = "refresh_token")]
    RefreshToken,
    /// RFC 6749 §4.4
    #[serde(rename = "client_credentials")]
    ClientCredentials,
    /// RFC 6749 §4.3, delegated to a credential verifier
    #[serde(rename = "password")]
    Password,
    /// OpenID CIBA core
    #[serde(rename = "urn:openid:params:grant-type:ciba")]
    Ciba,
    /// RFC 7523 §2.1
    #[serde(rename = "urn:ietf:params:oauth:grant-type:jwt-bearer")]
    JwtBearer,
}

impl GrantType {
    /// Parse the wire value
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "authorization_code" => Some(Self::AuthorizationCode),
            "refresh_token" => Some(Self::RefreshToken),
            "client_credentials" => Some(Self::ClientCredentials),
            "password" => Some(Self::Password),
            "urn:openid:params:grant-type:ciba" => Some(Self::Ciba),
            "urn:ietf:params:oauth:grant-type:jwt-bearer" => Some(Self::JwtBearer),
            _ => None,
        }
    }

    /// Wire representation
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::RefreshToken => "refresh_token",
            Self::ClientCredentials => "client_credentials",
            Self::Password => "password",
            Self::Ciba => "urn:openid:params:grant-type:ciba",
            Self::JwtBearer => "urn:ietf:params:oauth:grant-type:jwt-bearer",
        }
    }
}

/// `token_endpoint_auth_method` values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClientAuthMethod {
    /// HTTP Basic with client id/secret
    #[serde(rename = "client_secret_basic")]
    ClientSecretBasic,
    /// id/secret in the form body
    #[serde(rename = "client_secret_post")]
    ClientSecretPost,
    /// HS256 assertion keyed by the client secret
    #[serde(rename = "client_secret_jwt")]
    ClientSecretJwt,
    /// Asymmetric assertion verified against the client JWKS
    #[serde(rename = "private_key_jwt")]
    PrivateKeyJwt,
    /// Mutual-TLS subject-DN binding
    #[serde(rename = "tls_client_auth")]
    TlsClientAuth,
    /// Public client; PKCE stands in for a secret
    #[serde(rename = "none")]
    None,
}

impl ClientAuthMethod {
    /// Wire representation
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ClientSecretBasic => "client_secret_basic",
            Self::ClientSecretPost => "client_secret_post",
            Self::ClientSecretJwt => "client_secret_jwt",
            Self::PrivateKeyJwt => "private_key_jwt",
            Self::TlsClientAuth => "tls_client_auth",
            Self::None => "none",
        }
    }
}

/// Access-token component of an issued credential set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessToken {
    /// Opaque token value
    pub value: String,
    /// Issue time
    pub issued_at: DateTime<Utc>,
    /// Expiry time
    pub expires_at: DateTime<Utc>,
    /// Revocation flag; revoked tokens are retained for audit
    pub revoked: bool,
}

impl AccessToken {
    /// Whether the token is expired at `now`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Remaining lifetime in whole seconds, floored at zero
    #[must_use]
    pub fn expires_in(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }
}

/// Refresh-token component of an issued credential set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshToken {
    /// Opaque token value
    pub value: String,
    /// Issue time
    pub issued_at: DateTime<Utc>,
    /// Expiry time
    pub expires_at: DateTime<Utc>,
    /// Revocation flag
    pub revoked: bool,
}

impl RefreshToken {
    /// Whether the token is expired at `now`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Issued credential set: one access token, optionally a refresh token, an ID
/// token, and a `c_nonce` for verifiable-credential binding.
///
/// The record is looked up by either opaque token value for introspection and
/// revocation. Revoking either component revokes both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthToken {
    /// Record identifier
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Grant payload the tokens were issued under
    pub grant: AuthorizationGrant,
    /// Access-token component
    pub access_token: AccessToken,
    /// Refresh-token component, when the grant type earns one
    pub refresh_token: Option<RefreshToken>,
    /// Signed ID token, when the grant is an OIDC grant
    pub id_token: Option<String>,
    /// Verifiable-credential nonce
    pub c_nonce: Option<String>,
    /// `c_nonce` lifetime in seconds
    pub c_nonce_expires_in: Option<i64>,
}

impl OAuthToken {
    /// The record with both components marked revoked.
    ///
    /// Pure; the repository replaces the stored record with the result so the
    /// two flags flip in one write.
    #[must_use]
    pub fn revoked(&self) -> Self {
        let mut next = self.clone();
        next.access_token.revoked = true;
        if let Some(refresh) = next.refresh_token.as_mut() {
            refresh.revoked = true;
        }
        next
    }

    /// Whether any component is already revoked
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.access_token.revoked
            || self
                .refresh_token
                .as_ref()
                .is_some_and(|refresh| refresh.revoked)
    }

    /// The record with only the refresh component marked revoked, used when
    /// rotation retires the old value but the access token keeps its natural
    /// expiry.
    #[must_use]
    pub fn refresh_revoked(&self) -> Self {
        let mut next = self.clone();
        if let Some(refresh) = next.refresh_token.as_mut() {
            refresh.revoked = true;
        }
        next
    }

    /// The record re-issued with a fresh access token and, under a fixed
    /// (non-rotating) refresh policy, the same refresh value.
    #[must_use]
    pub fn with_access_token(&self, access_token: AccessToken) -> Self {
        Self {
            access_token,
            ..self.clone()
        }
    }
}

/// Mint an opaque access token with the given lifetime.
///
/// # Errors
/// Propagates random-source failure.
pub fn mint_access_token(ttl_secs: i64) -> anyhow::Result<AccessToken> {
    let now = Utc::now();
    Ok(AccessToken {
        value: crate::crypto::random_url_safe(32)?,
        issued_at: now,
        expires_at: now + Duration::seconds(ttl_secs),
        revoked: false,
    })
}

/// Mint an opaque refresh token with the given lifetime.
///
/// # Errors
/// Propagates random-source failure.
pub fn mint_refresh_token(ttl_secs: i64) -> anyhow::Result<RefreshToken> {
    let now = Utc::now();
    Ok(RefreshToken {
        value: crate::crypto::random_url_safe(32)?,
        issued_at: now,
        expires_at: now + Duration::seconds(ttl_secs),
        revoked: false,
    })
}
