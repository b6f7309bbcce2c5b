// ABOUTME: RFC 7009 token revocation: idempotent, atomic across both token components
// ABOUTME: Unknown and already-revoked tokens fold into success, as RFC 7009 requires
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use serde::Deserialize;
use std::sync::Arc;

use super::client_auth::{self, ClientCredentialsInput};
use super::error::TokenError;
use crate::config::{ConfigError, ConfigResolver};
use crate::storage::OAuthTokenRepository;
use crate::tenant::TenantId;

/// Raw revocation parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RevocationRequest {
    /// The token being revoked
    pub token: Option<String>,
    /// Optional `access_token` / `refresh_token` hint
    pub token_type_hint: Option<String>,
}

/// Revocation handler.
pub struct TokenRevocationHandler {
    config_resolver: Arc<ConfigResolver>,
    token_repo: Arc<dyn OAuthTokenRepository>,
}

impl TokenRevocationHandler {
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

    /// Revoke one token.
    ///
    /// Revoking either value invalidates both components of the credential
    /// set in a single record replacement. Unknown tokens, already-revoked
    /// tokens, and tokens belonging to a different client all return success.
    ///
    /// # Errors
    /// `invalid_client` for failed client authentication, `invalid_request`
    /// for a missing `token` parameter.
    pub async fn handle(
        &self,
        tenant: &TenantId,
        request: &RevocationRequest,
        credentials: &ClientCredentialsInput,
    ) -> Result<(), TokenError> {
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
        let authenticated =
            client_auth::authenticate(credentials, &client_config, &server_config)?;

        let value = request
            .token
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| TokenError::invalid_request("token is required"))?;

        let token = match self.token_repo.find_by_access_token(tenant, value).await? {
            Some(token) => Some(token),
            None => self.token_repo.find_by_refresh_token(tenant, value).await?,
        };
        let Some(token) = token else {
            // Unknown token: success, per RFC 7009 §2.2
            return Ok(());
        };

        if token.grant.client_id != authenticated.client_id {
            // Another client's token is not ours to revoke; still not an error
            tracing::warn!(
                tenant = %tenant,
                client_id = %authenticated.client_id,
                owner = %token.grant.client_id,
                "revocation request for a foreign token ignored"
            );
            return Ok(());
        }
        if token.is_revoked() {
            return Ok(());
        }

        self.token_repo.update(tenant, &token.revoked()).await?;
        tracing::info!(
            tenant = %tenant,
            client_id = %authenticated.client_id,
            token_id = %token.id,
            "token revoked"
        );
        Ok(())
    }
}

fn config_error(err: ConfigError) -> TokenError {
    match err {
        ConfigError::ClientNotFound { .. } => TokenError::invalid_client("unknown client"),
        ConfigError::ServerNotFound(_) => TokenError::invalid_request("tenant is not configured"),
        ConfigError::Store(inner) => inner.into(),
    }
}
