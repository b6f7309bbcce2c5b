// ABOUTME: CIBA backchannel grant record and its pending/authorized/denied state machine
// ABOUTME: Plays the role an authorization code plays in the front-channel flow
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AuthorizationGrant;
use crate::ciba::CibaDeliveryMode;
use crate::identity::{Authentication, User};

/// Decision state of a backchannel authentication request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CibaGrantStatus {
    /// Waiting for the out-of-band authentication to complete
    Pending,
    /// User approved; token endpoint may exchange it once
    Authorized,
    /// User refused
    Denied,
}

/// One backchannel authentication attempt, keyed by `auth_req_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CibaGrant {
    /// Opaque `auth_req_id` handed to the client
    pub auth_req_id: String,
    /// Grant payload; user/authentication are filled in on authorize
    pub grant: AuthorizationGrant,
    /// How the client learns about completion
    pub delivery_mode: CibaDeliveryMode,
    /// Decision state
    pub status: CibaGrantStatus,
    /// Minimum seconds between token-endpoint polls
    pub interval_secs: i64,
    /// Hard expiry of the request
    pub expires_at: DateTime<Utc>,
    /// Bearer token for ping/push notifications, when the client supplied one
    pub client_notification_token: Option<String>,
}

impl CibaGrant {
    /// Whether the request has passed its expiry at `now`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// The grant after user approval: payload gains the user's identity and
    /// the authentication event; state moves to `Authorized`.
    #[must_use]
    pub fn authorized(&self, user: User, authentication: Authentication) -> Self {
        let mut grant = self.grant.clone();
        grant.user = Some(user);
        grant.authentication = Some(authentication);
        Self {
            grant,
            status: CibaGrantStatus::Authorized,
            ..self.clone()
        }
    }

    /// The grant after user refusal
    #[must_use]
    pub fn denied(&self) -> Self {
        Self {
            status: CibaGrantStatus::Denied,
            ..self.clone()
        }
    }
}
