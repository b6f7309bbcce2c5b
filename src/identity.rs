// ABOUTME: End-user identity and authentication-event records carried through grants and tokens
// ABOUTME: Credential verification itself is delegated; this module only models the outcome
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account status of an authenticated user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    /// Account is active and may receive tokens
    Active,
    /// Account is temporarily locked
    Locked,
    /// Account has been deactivated
    Deactivated,
}

/// Authenticated end user, as resolved by the authentication-interaction
/// subsystem.
///
/// Only the attributes token and ID-token issuance need are carried here;
/// profile storage lives outside this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable subject identifier (`sub` claim)
    pub sub: String,
    /// Display name, when known
    pub name: Option<String>,
    /// Primary email, when known
    pub email: Option<String>,
    /// Account status
    pub status: UserStatus,
}

impl User {
    /// Minimal active user with the given subject
    pub fn with_subject(sub: impl Into<String>) -> Self {
        Self {
            sub: sub.into(),
            name: None,
            email: None,
            status: UserStatus::Active,
        }
    }

    /// Whether tokens may be issued for this user
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self.status, UserStatus::Active)
    }
}

/// Record of a completed authentication event.
///
/// Supplied by the interaction subsystem at authorize-decision time and echoed
/// into ID tokens (`auth_time`, `amr`, `acr`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authentication {
    /// When the user authenticated
    pub time: DateTime<Utc>,
    /// Authentication method references (`amr`), e.g. `pwd`, `otp`, `hwk`
    pub methods: Vec<String>,
    /// Authentication context class reference (`acr`), when asserted
    pub acr: Option<String>,
}

impl Authentication {
    /// Authentication event recorded now with the given method references
    pub fn new(methods: Vec<String>) -> Self {
        Self {
            time: Utc::now(),
            methods,
            acr: None,
        }
    }

    /// A decision with no recorded method is not acceptable as proof of
    /// authentication.
    #[must_use]
    pub fn is_populated(&self) -> bool {
        !self.methods.is_empty()
    }
}
