// ABOUTME: RFC 7662 token introspection: active tokens answer with claims, everything else inactive
// ABOUTME: Failure never leaks whether a token exists; the only negative answer is active=false
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use super::client_auth::{self, ClientCredentialsInput};
use super::error::TokenError;
use super::OAuthToken;
use crate::config::{ConfigError, ConfigResolver};
use crate::storage::OAuthTokenRepository;
use crate::tenant::TenantId;

/// Raw introspection parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntrospectionRequest {
    /// The token under inspection
    pub token: Option<String>,
    /// Optional `access_token` / `refresh_token` hint
    pub token_type_hint: Option<String>,
}

/// Which component of the record matched the presented value
enum Matched {
    Access,
    Refresh,
}

/// Introspection handler.
pub struct TokenIntrospectionHandler {
    config_resolver: Arc<ConfigResolver>,
    token_repo: Arc<dyn OAuthTokenRepository>,
}

impl TokenIntrospectionHandler {
    /// Wire the handler to its collaborators
    pub fn new(
        config_resolver: Arc<ConfigResolver>,
        token_repo: Arc<dyn OAuthTokenRepository>,
    ) -> Self {
        Self {
            config_resolver,
            token_repo,
        }
    }

    /// Introspect one token.
    ///
    /// Verification order: token exists, then unexpired, then unrevoked; any
    /// failure answers `{"active": false}` with no further claims. A
    /// malformed `token` parameter short-circuits before any lookup.
    ///
    /// # Errors
    /// Only client-authentication failures error out (401); token problems do
    /// not.
    pub async fn handle(
        &self,
        tenant: &TenantId,
        request: &IntrospectionRequest,
        credentials: &ClientCredentialsInput,
    ) -> Result<serde_json::Value, TokenError> {
        let server_config = self
            .config_resolver
            .server_config(tenant)
            .await
            .map_err(config_error)?;
        let client_id = credentials
            .claimed_client_id()
            .ok_or_else(|| TokenError::invalid_client("no client identification present"))?;
        let client_config = self
            .config_resolver
            .client_config(tenant, &client_id)
            .await
            .map_err(config_error)?;
        client_auth::authenticate(credentials, &client_config, &server_config)?;

        // Malformed parameter: fail fast as an inactive token, before lookup
        let Some(value) = request.token.as_deref().filter(|v| !v.is_empty()) else {
            return Ok(inactive());
        };

        // token_type_hint is accepted but the lookup order stays fixed:
        // access-token value first, refresh-token value second
        let (token, matched) = match self.token_repo.find_by_access_token(tenant, value).await? {
            Some(token) => (token, Matched::Access),
            None => match self.token_repo.find_by_refresh_token(tenant, value).await? {
                Some(token) => (token, Matched::Refresh),
                None => return Ok(inactive()),
            },
        };

        // exp/iat describe the presented component, not the record's access
        // token
        let now = Utc::now();
        let (expired, revoked, token_type, expires_at, issued_at) = match matched {
            Matched::Access => (
                token.access_token.is_expired(now),
                token.access_token.revoked,
                "Bearer",
                token.access_token.expires_at,
                token.access_token.issued_at,
            ),
            Matched::Refresh => match token.refresh_token.as_ref() {
                Some(refresh) => (
                    refresh.is_expired(now),
                    refresh.revoked,
                    "refresh_token",
                    refresh.expires_at,
                    refresh.issued_at,
                ),
                None => return Ok(inactive()),
            },
        };
        if expired || revoked {
            return Ok(inactive());
        }

        Ok(active_claims(
            &token,
            &server_config.issuer,
            token_type,
            expires_at,
            issued_at,
        ))
    }
}

fn inactive() -> serde_json::Value {
    json!({ "active": false })
}

fn active_claims(
    token: &OAuthToken,
    issuer: &str,
    token_type: &str,
    expires_at: DateTime<Utc>,
    issued_at: DateTime<Utc>,
) -> serde_json::Value {
    let mut claims = json!({
        "active": true,
        "scope": token.grant.scope_value(),
        "client_id": token.grant.client_id,
        "token_type": token_type,
        "exp": expires_at.timestamp(),
        "iat": issued_at.timestamp(),
        "iss": issuer,
        "aud": token.grant.client_id,
    });
    if let Some(sub) = token.grant.subject() {
        claims["sub"] = json!(sub);
    }
    claims
}

fn config_error(err: ConfigError) -> TokenError {
    match err {
        ConfigError::ClientNotFound { .. } => TokenError::invalid_client("unknown client"),
        ConfigError::ServerNotFound(_) => TokenError::invalid_request("tenant is not configured"),
        ConfigError::Store(inner) => inner.into(),
    }
}
