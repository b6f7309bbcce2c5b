// ABOUTME: Authorization code grant record binding an issued code to its request and consent
// ABOUTME: Consumed exactly once at token-exchange time via an atomic repository delete
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AuthorizationGrant;
use crate::pkce::CodeChallengeMethod;

/// One issued authorization code, bound to the originating request, the
/// consenting user, and the PKCE challenge presented at authorize time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCodeGrant {
    /// The opaque code value handed to the client
    pub code: String,
    /// Identifier of the stored authorization request this code came from
    pub authorization_request_id: Uuid,
    /// Grant payload carried into token exchange
    pub grant: AuthorizationGrant,
    /// Redirect URI the code was delivered to; must match bit-for-bit at exchange
    pub redirect_uri: String,
    /// PKCE challenge from the authorization request
    pub code_challenge: Option<String>,
    /// PKCE challenge method from the authorization request
    pub code_challenge_method: Option<CodeChallengeMethod>,
    /// Hard expiry of the code
    pub expires_at: DateTime<Utc>,
}

impl AuthorizationCodeGrant {
    /// Whether the code may still be exchanged at `now`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
