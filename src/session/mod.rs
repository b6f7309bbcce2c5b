// ABOUTME: OP-level session record and RP-initiated logout
// ABOUTME: Sessions are created by the authentication subsystem; this crate terminates them
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

/// RP-initiated logout handling
pub mod logout;

pub use logout::{
    LogoutError, LogoutHandler, LogoutOutcome, LogoutProtocol, LogoutRequest, LogoutResponse,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tenant::TenantId;

/// One OP-level session, addressed by the `sid` claim minted into ID tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpSession {
    /// Session id (`sid` claim)
    pub sid: String,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Subject the session belongs to
    pub subject: String,
    /// Session creation time
    pub created_at: DateTime<Utc>,
}

impl OpSession {
    /// New session for a subject
    pub fn new(tenant_id: TenantId, sid: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            sid: sid.into(),
            tenant_id,
            subject: subject.into(),
            created_at: Utc::now(),
        }
    }
}
