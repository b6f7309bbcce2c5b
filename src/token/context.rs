// ABOUTME: Validated token request context: parameters, configurations, authenticated client
// ABOUTME: Grant services read lifetimes and policy through this, never from globals
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use std::sync::Arc;

use super::client_auth::AuthenticatedClient;
use super::handler::TokenRequestParams;
use super::GrantType;
use crate::config::{AuthorizationServerConfig, ClientConfig};
use crate::tenant::TenantId;

/// Everything a grant service needs, assembled by the dispatch handler after
/// client authentication succeeded.
#[derive(Debug, Clone)]
pub struct TokenRequestContext {
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Parsed grant type
    pub grant_type: GrantType,
    /// Raw request parameters
    pub params: TokenRequestParams,
    /// Tenant configuration
    pub server_config: Arc<AuthorizationServerConfig>,
    /// Client configuration
    pub client_config: Arc<ClientConfig>,
    /// Result of client authentication
    pub authenticated: AuthenticatedClient,
}

impl TokenRequestContext {
    /// Authenticated client id
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.authenticated.client_id
    }

    /// Access-token lifetime: client override or server default
    #[must_use]
    pub fn access_token_ttl_secs(&self) -> i64 {
        self.client_config
            .access_token_ttl_secs
            .unwrap_or(self.server_config.access_token_ttl_secs)
    }

    /// Refresh-token lifetime: client override or server default
    #[must_use]
    pub fn refresh_token_ttl_secs(&self) -> i64 {
        self.client_config
            .refresh_token_ttl_secs
            .unwrap_or(self.server_config.refresh_token_ttl_secs)
    }

    /// Whether refresh tokens rotate on use for this client
    #[must_use]
    pub fn rotates_refresh_tokens(&self) -> bool {
        self.client_config
            .refresh_token_rotation
            .unwrap_or(self.server_config.refresh_token_rotation)
    }

    /// Whether this client may be issued refresh tokens at all
    #[must_use]
    pub fn refresh_tokens_allowed(&self) -> bool {
        self.client_config.allows_grant_type(GrantType::RefreshToken)
    }
}
