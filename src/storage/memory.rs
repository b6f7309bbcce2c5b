// ABOUTME: In-memory implementation of every repository trait, keyed per tenant
// ABOUTME: Backs the test suite and single-node development; concurrency-safe via DashMap
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use super::{
    AuthorizationCodeGrantRepository, AuthorizationGrantedRepository,
    AuthorizationRequestRepository, CibaGrantRepository, OAuthTokenRepository,
    OpSessionRepository,
};
use crate::config::{
    AuthorizationServerConfig, ClientConfig, ClientConfigRepository, ServerConfigRepository,
};
use crate::grant::{AuthorizationCodeGrant, AuthorizationGrant, AuthorizationGranted, CibaGrant};
use crate::oauth::request::AuthorizationRequest;
use crate::session::OpSession;
use crate::tenant::TenantId;
use crate::token::OAuthToken;

type Key = (TenantId, String);

fn key(tenant: &TenantId, id: &str) -> Key {
    (tenant.clone(), id.to_owned())
}

/// In-memory store implementing all repository traits.
///
/// `consume` operations are `DashMap::remove`, which is atomic per key, so
/// the exactly-once contracts hold under concurrent access. The
/// `merge_or_register` read-modify-write runs inside the map's entry lock.
#[derive(Default)]
pub struct InMemoryStore {
    server_configs: DashMap<TenantId, AuthorizationServerConfig>,
    client_configs: DashMap<Key, ClientConfig>,
    authorization_requests: DashMap<(TenantId, Uuid), AuthorizationRequest>,
    code_grants: DashMap<Key, AuthorizationCodeGrant>,
    granted: DashMap<Key, AuthorizationGranted>,
    tokens: DashMap<(TenantId, Uuid), OAuthToken>,
    access_index: DashMap<Key, Uuid>,
    refresh_index: DashMap<Key, Uuid>,
    ciba_grants: DashMap<Key, CibaGrant>,
    sessions: DashMap<Key, OpSession>,
}

impl InMemoryStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a tenant's server configuration
    pub fn put_server_config(&self, tenant: &TenantId, config: AuthorizationServerConfig) {
        self.server_configs.insert(tenant.clone(), config);
    }

    /// Seed a client configuration
    pub fn put_client_config(&self, tenant: &TenantId, config: ClientConfig) {
        self.client_configs
            .insert(key(tenant, &config.client_id), config);
    }

    fn granted_key(tenant: &TenantId, client_id: &str, subject: &str) -> Key {
        (tenant.clone(), format!("{client_id}\u{1f}{subject}"))
    }
}

#[async_trait]
impl ServerConfigRepository for InMemoryStore {
    async fn find(&self, tenant: &TenantId) -> Result<Option<AuthorizationServerConfig>> {
        Ok(self.server_configs.get(tenant).map(|c| c.clone()))
    }
}

#[async_trait]
impl ClientConfigRepository for InMemoryStore {
    async fn find(&self, tenant: &TenantId, client_id: &str) -> Result<Option<ClientConfig>> {
        Ok(self.client_configs.get(&key(tenant, client_id)).map(|c| c.clone()))
    }
}

#[async_trait]
impl AuthorizationRequestRepository for InMemoryStore {
    async fn register(&self, tenant: &TenantId, request: &AuthorizationRequest) -> Result<()> {
        self.authorization_requests
            .insert((tenant.clone(), request.id), request.clone());
        Ok(())
    }

    async fn find(&self, tenant: &TenantId, id: Uuid) -> Result<Option<AuthorizationRequest>> {
        Ok(self
            .authorization_requests
            .get(&(tenant.clone(), id))
            .map(|r| r.clone()))
    }

    async fn delete(&self, tenant: &TenantId, id: Uuid) -> Result<()> {
        self.authorization_requests.remove(&(tenant.clone(), id));
        Ok(())
    }
}

#[async_trait]
impl AuthorizationCodeGrantRepository for InMemoryStore {
    async fn register(&self, tenant: &TenantId, grant: &AuthorizationCodeGrant) -> Result<()> {
        self.code_grants.insert(key(tenant, &grant.code), grant.clone());
        Ok(())
    }

    async fn consume(
        &self,
        tenant: &TenantId,
        code: &str,
    ) -> Result<Option<AuthorizationCodeGrant>> {
        // remove() is the compare-and-delete: one concurrent caller wins
        Ok(self.code_grants.remove(&key(tenant, code)).map(|(_, v)| v))
    }
}

#[async_trait]
impl AuthorizationGrantedRepository for InMemoryStore {
    async fn find(
        &self,
        tenant: &TenantId,
        client_id: &str,
        subject: &str,
    ) -> Result<Option<AuthorizationGranted>> {
        Ok(self
            .granted
            .get(&Self::granted_key(tenant, client_id, subject))
            .map(|g| g.clone()))
    }

    async fn merge_or_register(
        &self,
        tenant: &TenantId,
        grant: &AuthorizationGrant,
    ) -> Result<AuthorizationGranted> {
        let subject = grant.subject().unwrap_or_default().to_owned();
        let map_key = Self::granted_key(tenant, &grant.client_id, &subject);
        // Entry API holds the shard lock across the read-modify-write
        let mut entry = self
            .granted
            .entry(map_key)
            .or_insert_with(|| AuthorizationGranted::new(grant.clone()));
        let merged = entry.merged_with(grant);
        *entry = merged.clone();
        Ok(merged)
    }

    async fn revoke(&self, tenant: &TenantId, client_id: &str, subject: &str) -> Result<()> {
        self.granted
            .remove(&Self::granted_key(tenant, client_id, subject));
        Ok(())
    }
}

#[async_trait]
impl OAuthTokenRepository for InMemoryStore {
    async fn register(&self, tenant: &TenantId, token: &OAuthToken) -> Result<()> {
        self.tokens.insert((tenant.clone(), token.id), token.clone());
        self.access_index
            .insert(key(tenant, &token.access_token.value), token.id);
        if let Some(refresh) = &token.refresh_token {
            self.refresh_index.insert(key(tenant, &refresh.value), token.id);
        }
        Ok(())
    }

    async fn find_by_access_token(
        &self,
        tenant: &TenantId,
        value: &str,
    ) -> Result<Option<OAuthToken>> {
        let Some(id) = self.access_index.get(&key(tenant, value)).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.tokens.get(&(tenant.clone(), id)).map(|t| t.clone()))
    }

    async fn find_by_refresh_token(
        &self,
        tenant: &TenantId,
        value: &str,
    ) -> Result<Option<OAuthToken>> {
        let Some(id) = self.refresh_index.get(&key(tenant, value)).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.tokens.get(&(tenant.clone(), id)).map(|t| t.clone()))
    }

    async fn update(&self, tenant: &TenantId, token: &OAuthToken) -> Result<()> {
        // Evict index entries for values the replacement no longer carries,
        // so a rotated-away token value stops resolving
        let previous = self
            .tokens
            .get(&(tenant.clone(), token.id))
            .map(|t| t.clone());
        if let Some(previous) = previous {
            if previous.access_token.value != token.access_token.value {
                self.access_index
                    .remove(&key(tenant, &previous.access_token.value));
            }
            if let Some(old_refresh) = &previous.refresh_token {
                let replaced = token
                    .refresh_token
                    .as_ref()
                    .map_or(true, |refresh| refresh.value != old_refresh.value);
                if replaced {
                    self.refresh_index.remove(&key(tenant, &old_refresh.value));
                }
            }
        }

        self.tokens.insert((tenant.clone(), token.id), token.clone());
        self.access_index
            .insert(key(tenant, &token.access_token.value), token.id);
        if let Some(refresh) = &token.refresh_token {
            self.refresh_index.insert(key(tenant, &refresh.value), token.id);
        }
        Ok(())
    }
}

#[async_trait]
impl CibaGrantRepository for InMemoryStore {
    async fn register(&self, tenant: &TenantId, grant: &CibaGrant) -> Result<()> {
        self.ciba_grants
            .insert(key(tenant, &grant.auth_req_id), grant.clone());
        Ok(())
    }

    async fn find(&self, tenant: &TenantId, auth_req_id: &str) -> Result<Option<CibaGrant>> {
        Ok(self.ciba_grants.get(&key(tenant, auth_req_id)).map(|g| g.clone()))
    }

    async fn update(&self, tenant: &TenantId, grant: &CibaGrant) -> Result<()> {
        self.ciba_grants
            .insert(key(tenant, &grant.auth_req_id), grant.clone());
        Ok(())
    }

    async fn consume(&self, tenant: &TenantId, auth_req_id: &str) -> Result<Option<CibaGrant>> {
        Ok(self
            .ciba_grants
            .remove(&key(tenant, auth_req_id))
            .map(|(_, v)| v))
    }
}

#[async_trait]
impl OpSessionRepository for InMemoryStore {
    async fn register(&self, tenant: &TenantId, session: &OpSession) -> Result<()> {
        self.sessions.insert(key(tenant, &session.sid), session.clone());
        Ok(())
    }

    async fn find(&self, tenant: &TenantId, sid: &str) -> Result<Option<OpSession>> {
        Ok(self.sessions.get(&key(tenant, sid)).map(|s| s.clone()))
    }

    async fn terminate(&self, tenant: &TenantId, sid: &str) -> Result<Option<OpSession>> {
        Ok(self.sessions.remove(&key(tenant, sid)).map(|(_, v)| v))
    }
}
