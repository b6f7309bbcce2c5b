// ABOUTME: Configuration query repositories plus a read-through caching resolver
// ABOUTME: Missing configuration is a client-visible bad request, never a server error
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use super::{AuthorizationServerConfig, ClientConfig};
use crate::tenant::TenantId;

/// Failure modes of configuration resolution
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No authorization server configuration exists for the tenant
    #[error("authorization server configuration not found for tenant {0}")]
    ServerNotFound(TenantId),
    /// No client configuration exists for the (tenant, client) pair
    #[error("client configuration not found: {client_id}")]
    ClientNotFound {
        /// Tenant queried
        tenant_id: TenantId,
        /// Client queried
        client_id: String,
    },
    /// The configuration store itself failed
    #[error("configuration store error: {0}")]
    Store(#[from] anyhow::Error),
}

/// Query access to per-tenant server configuration
#[async_trait]
pub trait ServerConfigRepository: Send + Sync {
    /// Fetch the tenant's authorization server configuration
    async fn find(&self, tenant: &TenantId) -> anyhow::Result<Option<AuthorizationServerConfig>>;
}

/// Query access to per-client configuration
#[async_trait]
pub trait ClientConfigRepository: Send + Sync {
    /// Fetch one client's configuration within a tenant
    async fn find(
        &self,
        tenant: &TenantId,
        client_id: &str,
    ) -> anyhow::Result<Option<ClientConfig>>;
}

/// Read-through caching resolver over the two configuration repositories.
///
/// The cache is the only in-process mutable state the engine holds; entries
/// are keyed by tenant (and client) and never invalidated here; the hosting
/// process recycles the resolver when the control plane pushes changes.
pub struct ConfigResolver {
    server_repo: Arc<dyn ServerConfigRepository>,
    client_repo: Arc<dyn ClientConfigRepository>,
    server_cache: DashMap<TenantId, Arc<AuthorizationServerConfig>>,
    client_cache: DashMap<(TenantId, String), Arc<ClientConfig>>,
}

impl ConfigResolver {
    /// Build a resolver over the given repositories
    pub fn new(
        server_repo: Arc<dyn ServerConfigRepository>,
        client_repo: Arc<dyn ClientConfigRepository>,
    ) -> Self {
        Self {
            server_repo,
            client_repo,
            server_cache: DashMap::new(),
            client_cache: DashMap::new(),
        }
    }

    /// Resolve the tenant's server configuration.
    ///
    /// # Errors
    /// `ConfigError::ServerNotFound` when the tenant is unknown;
    /// `ConfigError::Store` when the backing store fails.
    pub async fn server_config(
        &self,
        tenant: &TenantId,
    ) -> Result<Arc<AuthorizationServerConfig>, ConfigError> {
        if let Some(cached) = self.server_cache.get(tenant) {
            return Ok(Arc::clone(&cached));
        }
        let config = self
            .server_repo
            .find(tenant)
            .await?
            .ok_or_else(|| ConfigError::ServerNotFound(tenant.clone()))?;
        let config = Arc::new(config);
        self.server_cache
            .insert(tenant.clone(), Arc::clone(&config));
        Ok(config)
    }

    /// Resolve one client's configuration within a tenant.
    ///
    /// Disabled clients resolve as not found; callers never see a disabled
    /// client as trustworthy.
    ///
    /// # Errors
    /// `ConfigError::ClientNotFound` for unknown or disabled clients;
    /// `ConfigError::Store` when the backing store fails.
    pub async fn client_config(
        &self,
        tenant: &TenantId,
        client_id: &str,
    ) -> Result<Arc<ClientConfig>, ConfigError> {
        let key = (tenant.clone(), client_id.to_owned());
        if let Some(cached) = self.client_cache.get(&key) {
            return Ok(Arc::clone(&cached));
        }
        let not_found = || ConfigError::ClientNotFound {
            tenant_id: tenant.clone(),
            client_id: client_id.to_owned(),
        };
        let config = self
            .client_repo
            .find(tenant, client_id)
            .await?
            .ok_or_else(not_found)?;
        if !config.enabled {
            return Err(not_found());
        }
        let config = Arc::new(config);
        self.client_cache.insert(key, Arc::clone(&config));
        Ok(config)
    }
}
