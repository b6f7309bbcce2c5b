// ABOUTME: Token endpoint family entry points: token, introspection, revocation
// ABOUTME: Translates issued credential sets and typed failures into wire shapes
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use chrono::Utc;
use serde::Serialize;

use super::client_auth::ClientCredentialsInput;
use super::error::TokenError;
use super::handler::{TokenRequestHandler, TokenRequestParams};
use super::introspection::{IntrospectionRequest, TokenIntrospectionHandler};
use super::revocation::{RevocationRequest, TokenRevocationHandler};
use super::OAuthToken;
use crate::tenant::TenantId;

/// Token endpoint success body
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    /// Opaque access token
    pub access_token: String,
    /// Always `Bearer`
    pub token_type: &'static str,
    /// Seconds until the access token expires
    pub expires_in: i64,
    /// Granted scope, space-separated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Refresh token, when issued
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Signed ID token, when the grant is an OIDC grant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    /// Verifiable-credential nonce
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c_nonce: Option<String>,
    /// `c_nonce` lifetime in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c_nonce_expires_in: Option<i64>,
}

impl From<&OAuthToken> for TokenResponse {
    fn from(token: &OAuthToken) -> Self {
        Self {
            access_token: token.access_token.value.clone(),
            token_type: "Bearer",
            expires_in: token.access_token.expires_in(Utc::now()),
            scope: Some(token.grant.scope_value()),
            refresh_token: token.refresh_token.as_ref().map(|r| r.value.clone()),
            id_token: token.id_token.clone(),
            c_nonce: token.c_nonce.clone(),
            c_nonce_expires_in: token.c_nonce_expires_in,
        }
    }
}

/// Token endpoint family entry points.
pub struct TokenProtocol {
    handler: TokenRequestHandler,
    introspection: TokenIntrospectionHandler,
    revocation: TokenRevocationHandler,
}

impl TokenProtocol {
    /// Assemble from wired handlers
    #[must_use]
    pub fn new(
        handler: TokenRequestHandler,
        introspection: TokenIntrospectionHandler,
        revocation: TokenRevocationHandler,
    ) -> Self {
        Self {
            handler,
            introspection,
            revocation,
        }
    }

    /// `POST /token`
    ///
    /// # Errors
    /// RFC-shaped [`TokenError`] with the matching 400/401/500 status.
    pub async fn token(
        &self,
        tenant: &TenantId,
        params: TokenRequestParams,
        credentials: &ClientCredentialsInput,
    ) -> Result<TokenResponse, TokenError> {
        let token = self.handler.handle(tenant, params, credentials).await?;
        Ok(TokenResponse::from(&token))
    }

    /// `POST /introspect`
    ///
    /// # Errors
    /// Only client-authentication failures; token problems answer inactive.
    pub async fn introspect(
        &self,
        tenant: &TenantId,
        request: &IntrospectionRequest,
        credentials: &ClientCredentialsInput,
    ) -> Result<serde_json::Value, TokenError> {
        self.introspection.handle(tenant, request, credentials).await
    }

    /// `POST /revoke`: empty 200 on success, including unknown tokens
    ///
    /// # Errors
    /// `invalid_client` / `invalid_request` only.
    pub async fn revoke(
        &self,
        tenant: &TenantId,
        request: &RevocationRequest,
        credentials: &ClientCredentialsInput,
    ) -> Result<(), TokenError> {
        self.revocation.handle(tenant, request, credentials).await
    }
}
