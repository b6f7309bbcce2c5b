// ABOUTME: Token endpoint dispatch: client authentication, grant-type gating, service selection
// ABOUTME: Shared preconditions run here so every grant service starts from the same guarantees
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::client_auth::{self, ClientCredentialsInput};
use super::context::TokenRequestContext;
use super::error::TokenError;
use super::{GrantType, OAuthToken};
use crate::config::{ConfigError, ConfigResolver};
use crate::identity::User;
use crate::storage::{
    AuthorizationCodeGrantRepository, AuthorizationGrantedRepository,
    AuthorizationRequestRepository, CibaGrantRepository, OAuthTokenRepository,
};
use crate::tenant::TenantId;

/// Delegated verification of resource-owner password credentials.
///
/// The engine never sees how credentials are stored; an absent delegate turns
/// the password grant off entirely.
#[async_trait]
pub trait PasswordCredentialsVerifier: Send + Sync {
    /// Verify the credentials, returning the user on success
    async fn verify(
        &self,
        tenant: &TenantId,
        username: &str,
        password: &str,
    ) -> anyhow::Result<Option<User>>;
}

/// Raw token endpoint parameters, as the adapter decoded the form body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequestParams {
    /// `grant_type`
    pub grant_type: Option<String>,
    /// `code` (authorization_code)
    pub code: Option<String>,
    /// `redirect_uri` (authorization_code)
    pub redirect_uri: Option<String>,
    /// `code_verifier` (PKCE)
    pub code_verifier: Option<String>,
    /// `refresh_token` (refresh_token)
    pub refresh_token: Option<String>,
    /// `scope`
    pub scope: Option<String>,
    /// `username` (password)
    pub username: Option<String>,
    /// `password` (password)
    pub password: Option<String>,
    /// `auth_req_id` (CIBA)
    pub auth_req_id: Option<String>,
    /// `assertion` (jwt-bearer)
    pub assertion: Option<String>,
}

/// Token endpoint dispatch over the per-grant creation services.
pub struct TokenRequestHandler {
    pub(super) config_resolver: Arc<ConfigResolver>,
    pub(super) request_repo: Arc<dyn AuthorizationRequestRepository>,
    pub(super) code_grant_repo: Arc<dyn AuthorizationCodeGrantRepository>,
    pub(super) token_repo: Arc<dyn OAuthTokenRepository>,
    pub(super) granted_repo: Arc<dyn AuthorizationGrantedRepository>,
    pub(super) ciba_grant_repo: Arc<dyn CibaGrantRepository>,
    pub(super) password_verifier: Option<Arc<dyn PasswordCredentialsVerifier>>,
}

impl TokenRequestHandler {
    /// Wire the handler to its collaborators; `password_verifier` is optional
    /// and gates the password grant.
    pub fn new(
        config_resolver: Arc<ConfigResolver>,
        request_repo: Arc<dyn AuthorizationRequestRepository>,
        code_grant_repo: Arc<dyn AuthorizationCodeGrantRepository>,
        token_repo: Arc<dyn OAuthTokenRepository>,
        granted_repo: Arc<dyn AuthorizationGrantedRepository>,
        ciba_grant_repo: Arc<dyn CibaGrantRepository>,
        password_verifier: Option<Arc<dyn PasswordCredentialsVerifier>>,
    ) -> Self {
        Self {
            config_resolver,
            request_repo,
            code_grant_repo,
            token_repo,
            granted_repo,
            ciba_grant_repo,
            password_verifier,
        }
    }

    /// Handle one token request end to end.
    ///
    /// # Errors
    /// RFC-shaped [`TokenError`]s; store failures surface as `server_error`.
    pub async fn handle(
        &self,
        tenant: &TenantId,
        params: TokenRequestParams,
        credentials: &ClientCredentialsInput,
    ) -> Result<OAuthToken, TokenError> {
        let raw_grant_type = params.grant_type.as_deref().unwrap_or_default();
        let grant_type = GrantType::parse(raw_grant_type).ok_or_else(|| {
            TokenError::unsupported_grant_type(format!(
                "unknown grant_type: {raw_grant_type:?}"
            ))
        })?;

        let claimed_client_id = credentials
            .claimed_client_id()
            .ok_or_else(|| TokenError::invalid_client("no client identification present"))?;
        let server_config = self
            .config_resolver
            .server_config(tenant)
            .await
            .map_err(map_config_error)?;
        let client_config = self
            .config_resolver
            .client_config(tenant, &claimed_client_id)
            .await
            .map_err(map_config_error)?;

        let authenticated =
            client_auth::authenticate(credentials, &client_config, &server_config)?;

        if !server_config.supports_grant_type(grant_type) {
            return Err(TokenError::unsupported_grant_type(format!(
                "grant_type {} is not supported by this tenant",
                grant_type.as_str()
            )));
        }
        if !client_config.allows_grant_type(grant_type) {
            return Err(TokenError::unauthorized_client(format!(
                "client is not registered for grant_type {}",
                grant_type.as_str()
            )));
        }

        let context = TokenRequestContext {
            tenant_id: tenant.clone(),
            grant_type,
            params,
            server_config,
            client_config,
            authenticated,
        };

        let token = match grant_type {
            GrantType::AuthorizationCode => self.authorization_code_grant(&context).await,
            GrantType::RefreshToken => self.refresh_token_grant(&context).await,
            GrantType::ClientCredentials => self.client_credentials_grant(&context).await,
            GrantType::Password => self.password_grant(&context).await,
            GrantType::Ciba => self.ciba_grant(&context).await,
            GrantType::JwtBearer => self.jwt_bearer_grant(&context).await,
        }?;

        tracing::info!(
            tenant = %tenant,
            client_id = %context.client_id(),
            grant_type = grant_type.as_str(),
            "token issued"
        );
        Ok(token)
    }
}

fn map_config_error(err: ConfigError) -> TokenError {
    match err {
        ConfigError::ClientNotFound { .. } => TokenError::invalid_client("unknown client"),
        ConfigError::ServerNotFound(_) => {
            TokenError::invalid_request("tenant is not configured")
        }
        ConfigError::Store(inner) => inner.into(),
    }
}
