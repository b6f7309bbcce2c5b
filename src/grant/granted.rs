// ABOUTME: Durable standing-consent record keyed by (tenant, client, user)
// ABOUTME: Grows by union on every re-authorization; this is what makes silent SSO possible
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AuthorizationGrant;

/// Standing consent for one (tenant, client, user) triple.
///
/// At most one live record exists per key. Re-authorization merges into the
/// existing record instead of creating a sibling, so returning users can be
/// silently re-authorized for any previously consented scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationGranted {
    /// Record identifier
    pub id: Uuid,
    /// Consented payload, monotonically growing
    pub grant: AuthorizationGrant,
    /// First consent time
    pub created_at: DateTime<Utc>,
    /// Last merge time
    pub updated_at: DateTime<Utc>,
}

impl AuthorizationGranted {
    /// First consent for this key
    #[must_use]
    pub fn new(grant: AuthorizationGrant) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            grant,
            created_at: now,
            updated_at: now,
        }
    }

    /// A new record value with the incoming grant merged in.
    ///
    /// Pure: the caller (repository) is responsible for replacing the stored
    /// record under its per-key serialization.
    #[must_use]
    pub fn merged_with(&self, incoming: &AuthorizationGrant) -> Self {
        Self {
            id: self.id,
            grant: self.grant.merge(incoming),
            created_at: self.created_at,
            updated_at: Utc::now(),
        }
    }
}
