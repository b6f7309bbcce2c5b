// ABOUTME: The stored authorization request and the raw parameter set it is built from
// ABOUTME: Owned by its repository; later steps reference it by identifier only
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use super::response::{ResponseMode, ResponseType};
use crate::pkce::CodeChallengeMethod;
use crate::tenant::TenantId;

/// Raw authorization-endpoint parameters, as the transport adapter decoded
/// them. Everything is optional here; the context builder decides what is
/// missing vs invalid.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthorizationRequestParams {
    /// `response_type`
    pub response_type: Option<String>,
    /// `client_id`
    pub client_id: Option<String>,
    /// `redirect_uri`
    pub redirect_uri: Option<String>,
    /// `scope`, space-separated
    pub scope: Option<String>,
    /// `state`
    pub state: Option<String>,
    /// `nonce`
    pub nonce: Option<String>,
    /// `response_mode`
    pub response_mode: Option<String>,
    /// `code_challenge`
    pub code_challenge: Option<String>,
    /// `code_challenge_method`
    pub code_challenge_method: Option<String>,
    /// `claims` (JSON, OIDC core §5.5)
    pub claims: Option<String>,
    /// `authorization_details` (JSON, RFC 9396)
    pub authorization_details: Option<String>,
    /// `request_uri` referencing a pushed authorization request
    pub request_uri: Option<String>,
    /// Extension parameters the adapter chose to forward
    #[serde(default)]
    pub custom: serde_json::Map<String, serde_json::Value>,
}

/// One pending authorization attempt, validated and persisted.
///
/// Read-only after creation; consumed once a response or deny is produced
/// (the code path retains it until token exchange completes).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Identifier later steps reference
    pub id: Uuid,
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Requesting client
    pub client_id: String,
    /// Validated response type
    pub response_type: ResponseType,
    /// Validated redirect target
    pub redirect_uri: String,
    /// Requested scopes
    pub scopes: BTreeSet<String>,
    /// Client state, echoed into responses
    pub state: Option<String>,
    /// OIDC nonce
    pub nonce: Option<String>,
    /// Explicit response mode, when the client sent one
    pub response_mode: Option<ResponseMode>,
    /// PKCE challenge
    pub code_challenge: Option<String>,
    /// PKCE challenge method
    pub code_challenge_method: Option<CodeChallengeMethod>,
    /// Requested ID-token claims from the `claims` parameter
    pub id_token_claims: BTreeSet<String>,
    /// Requested userinfo claims from the `claims` parameter
    pub userinfo_claims: BTreeSet<String>,
    /// RFC 9396 authorization details, verbatim
    pub authorization_details: Option<serde_json::Value>,
    /// Extension state carried through to the grant
    pub custom_properties: serde_json::Map<String, serde_json::Value>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Hard expiry; expired requests cannot be authorized or denied
    pub expires_at: DateTime<Utc>,
}

impl AuthorizationRequest {
    /// Whether the request has passed its expiry at `now`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// OIDC requests carry the `openid` scope
    #[must_use]
    pub fn is_oidc(&self) -> bool {
        self.scopes.contains("openid")
    }

    /// Whether the request asks for a verifiable-credential issuance
    /// (`authorization_details` entry of type `openid_credential`)
    #[must_use]
    pub fn is_verifiable_credential_request(&self) -> bool {
        self.authorization_details
            .as_ref()
            .and_then(serde_json::Value::as_array)
            .is_some_and(|details| {
                details.iter().any(|detail| {
                    detail.get("type").and_then(serde_json::Value::as_str)
                        == Some("openid_credential")
                })
            })
    }

    /// Parameter placement for responses: explicit `response_mode` wins,
    /// otherwise the response type's default
    #[must_use]
    pub fn effective_response_mode(&self) -> ResponseMode {
        self.response_mode
            .unwrap_or_else(|| self.response_type.default_response_mode())
    }

    /// The `request_uri` value a pushed request is referenced by
    #[must_use]
    pub fn request_uri(&self) -> String {
        format!("urn:ietf:params:oauth:request_uri:{}", self.id)
    }

    /// Parse an identifier back out of a `request_uri` value
    #[must_use]
    pub fn parse_request_uri(value: &str) -> Option<Uuid> {
        value
            .strip_prefix("urn:ietf:params:oauth:request_uri:")
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }
}
