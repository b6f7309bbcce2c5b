// ABOUTME: Repository traits for every persisted protocol entity
// ABOUTME: Cross-step state lives behind these seams; the engine keeps nothing in memory
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

/// Bundled in-memory store for tests and single-node development
pub mod memory;

pub use memory::InMemoryStore;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::grant::{AuthorizationCodeGrant, AuthorizationGrant, AuthorizationGranted, CibaGrant};
use crate::oauth::request::AuthorizationRequest;
use crate::session::OpSession;
use crate::tenant::TenantId;
use crate::token::OAuthToken;

/// Storage for pending authorization requests.
#[async_trait]
pub trait AuthorizationRequestRepository: Send + Sync {
    /// Persist a new request
    async fn register(&self, tenant: &TenantId, request: &AuthorizationRequest) -> Result<()>;
    /// Fetch a request by identifier
    async fn find(&self, tenant: &TenantId, id: Uuid) -> Result<Option<AuthorizationRequest>>;
    /// Remove a consumed request; missing ids are a no-op
    async fn delete(&self, tenant: &TenantId, id: Uuid) -> Result<()>;
}

/// Storage for issued authorization codes.
#[async_trait]
pub trait AuthorizationCodeGrantRepository: Send + Sync {
    /// Persist a freshly issued code grant
    async fn register(&self, tenant: &TenantId, grant: &AuthorizationCodeGrant) -> Result<()>;
    /// Atomically fetch-and-delete the grant for a code.
    ///
    /// This must be compare-and-delete, not read-then-delete: under
    /// concurrent replay exactly one caller may receive the grant. SQL
    /// adapters should use `DELETE ... RETURNING` or an equivalent
    /// conditional delete.
    async fn consume(&self, tenant: &TenantId, code: &str)
        -> Result<Option<AuthorizationCodeGrant>>;
}

/// Storage for standing-consent records.
#[async_trait]
pub trait AuthorizationGrantedRepository: Send + Sync {
    /// Fetch the live record for (tenant, client, user), if any
    async fn find(
        &self,
        tenant: &TenantId,
        client_id: &str,
        subject: &str,
    ) -> Result<Option<AuthorizationGranted>>;

    /// Merge the incoming grant into the existing record, or create the first
    /// record for the key.
    ///
    /// Implementations must serialize concurrent calls for the same
    /// (tenant, client, user) key (row-level locking or optimistic retry)
    /// so simultaneous authorizations cannot drop each other's scopes.
    async fn merge_or_register(
        &self,
        tenant: &TenantId,
        grant: &AuthorizationGrant,
    ) -> Result<AuthorizationGranted>;

    /// Remove a record on explicit consent revocation; missing keys are a no-op
    async fn revoke(&self, tenant: &TenantId, client_id: &str, subject: &str) -> Result<()>;
}

/// Storage for issued credential sets.
#[async_trait]
pub trait OAuthTokenRepository: Send + Sync {
    /// Persist a freshly issued token record
    async fn register(&self, tenant: &TenantId, token: &OAuthToken) -> Result<()>;
    /// Look up by opaque access-token value
    async fn find_by_access_token(
        &self,
        tenant: &TenantId,
        value: &str,
    ) -> Result<Option<OAuthToken>>;
    /// Look up by opaque refresh-token value
    async fn find_by_refresh_token(
        &self,
        tenant: &TenantId,
        value: &str,
    ) -> Result<Option<OAuthToken>>;
    /// Replace the stored record (revocation, rotation); the record is
    /// addressed by its id
    async fn update(&self, tenant: &TenantId, token: &OAuthToken) -> Result<()>;
}

/// Storage for backchannel authentication grants.
#[async_trait]
pub trait CibaGrantRepository: Send + Sync {
    /// Persist a new grant
    async fn register(&self, tenant: &TenantId, grant: &CibaGrant) -> Result<()>;
    /// Fetch by `auth_req_id`
    async fn find(&self, tenant: &TenantId, auth_req_id: &str) -> Result<Option<CibaGrant>>;
    /// Replace the stored grant (authorize / deny transitions)
    async fn update(&self, tenant: &TenantId, grant: &CibaGrant) -> Result<()>;
    /// Atomically fetch-and-delete an authorized grant for token issuance.
    ///
    /// Same exactly-once contract as authorization-code consumption.
    async fn consume(&self, tenant: &TenantId, auth_req_id: &str) -> Result<Option<CibaGrant>>;
}

/// Storage for OP-level sessions, addressed by `sid`.
#[async_trait]
pub trait OpSessionRepository: Send + Sync {
    /// Persist a session
    async fn register(&self, tenant: &TenantId, session: &OpSession) -> Result<()>;
    /// Fetch by session id
    async fn find(&self, tenant: &TenantId, sid: &str) -> Result<Option<OpSession>>;
    /// Terminate (remove) a session, returning it when it existed
    async fn terminate(&self, tenant: &TenantId, sid: &str) -> Result<Option<OpSession>>;
}
