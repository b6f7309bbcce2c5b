// ABOUTME: Authorization grant value object and the records that carry it between steps
// ABOUTME: Merging grants is a pure function; repositories replace stored records with the result
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

/// CIBA backchannel grant record
pub mod ciba_grant;
/// Single-use authorization code grant record
pub mod code_grant;
/// Durable standing-consent record
pub mod granted;

pub use ciba_grant::{CibaGrant, CibaGrantStatus};
pub use code_grant::AuthorizationCodeGrant;
pub use granted::AuthorizationGranted;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::identity::{Authentication, User};
use crate::tenant::TenantId;
use crate::token::GrantType;

/// The payload every code, CIBA grant, and token carries: who granted what to
/// which client.
///
/// This is an in-memory value, never persisted on its own; it is the unit
/// merged into [`AuthorizationGranted`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationGrant {
    /// Owning tenant
    pub tenant_id: TenantId,
    /// Granting user; `None` for client-credentials grants
    pub user: Option<User>,
    /// Authentication event backing the grant, when a user is present
    pub authentication: Option<Authentication>,
    /// Client the grant was issued to
    pub client_id: String,
    /// Grant type that produced this payload
    pub grant_type: GrantType,
    /// Scopes the user consented to
    pub scopes: BTreeSet<String>,
    /// ID-token claims the user consented to
    pub id_token_claims: BTreeSet<String>,
    /// Userinfo claims the user consented to
    pub userinfo_claims: BTreeSet<String>,
    /// Scopes the user explicitly refused
    pub denied_scopes: BTreeSet<String>,
    /// Extension state carried from the authorization request
    pub custom_properties: serde_json::Map<String, serde_json::Value>,
}

impl AuthorizationGrant {
    /// Subject of the granting user, when one exists
    #[must_use]
    pub fn subject(&self) -> Option<&str> {
        self.user.as_ref().map(|user| user.sub.as_str())
    }

    /// Space-separated scope string for wire responses
    #[must_use]
    pub fn scope_value(&self) -> String {
        self.scopes.iter().cloned().collect::<Vec<_>>().join(" ")
    }

    /// Whether `openid` was granted
    #[must_use]
    pub fn has_openid_scope(&self) -> bool {
        self.scopes.contains("openid")
    }

    /// Whether every requested scope is already covered by this grant
    #[must_use]
    pub fn covers_scopes<'a>(&self, requested: impl IntoIterator<Item = &'a str>) -> bool {
        requested.into_iter().all(|scope| self.scopes.contains(scope))
    }

    /// Merge a newer grant into this one, producing the union payload.
    ///
    /// Scopes and claims union; user, authentication, and custom properties
    /// come from the newer grant; denied scopes reflect only the newest
    /// decision. The result replaces the stored record; this function never
    /// mutates.
    #[must_use]
    pub fn merge(&self, newer: &Self) -> Self {
        let union = |ours: &BTreeSet<String>, theirs: &BTreeSet<String>| {
            ours.union(theirs).cloned().collect::<BTreeSet<_>>()
        };
        Self {
            tenant_id: self.tenant_id.clone(),
            user: newer.user.clone().or_else(|| self.user.clone()),
            authentication: newer
                .authentication
                .clone()
                .or_else(|| self.authentication.clone()),
            client_id: self.client_id.clone(),
            grant_type: self.grant_type,
            scopes: union(&self.scopes, &newer.scopes),
            id_token_claims: union(&self.id_token_claims, &newer.id_token_claims),
            userinfo_claims: union(&self.userinfo_claims, &newer.userinfo_claims),
            denied_scopes: newer.denied_scopes.clone(),
            custom_properties: newer.custom_properties.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(scopes: &[&str]) -> AuthorizationGrant {
        AuthorizationGrant {
            tenant_id: TenantId::new("t1"),
            user: Some(User::with_subject("user-1")),
            authentication: Some(Authentication::new(vec!["pwd".to_owned()])),
            client_id: "client-1".to_owned(),
            grant_type: GrantType::AuthorizationCode,
            scopes: scopes.iter().map(|s| (*s).to_owned()).collect(),
            id_token_claims: BTreeSet::new(),
            userinfo_claims: BTreeSet::new(),
            denied_scopes: BTreeSet::new(),
            custom_properties: serde_json::Map::new(),
        }
    }

    #[test]
    fn merge_unions_scopes() {
        let first = grant(&["openid", "profile"]);
        let second = grant(&["openid", "email"]);
        let merged = first.merge(&second);
        let expected: BTreeSet<String> = ["email", "openid", "profile"]
            .iter()
            .map(|s| (*s).to_owned())
            .collect();
        assert_eq!(merged.scopes, expected);
    }

    #[test]
    fn merge_is_idempotent_for_identical_grants() {
        let first = grant(&["openid"]);
        let merged = first.merge(&first.clone());
        assert_eq!(merged.scopes, first.scopes);
    }

    #[test]
    fn covers_scopes_checks_subset() {
        let g = grant(&["openid", "profile"]);
        assert!(g.covers_scopes(["openid"]));
        assert!(!g.covers_scopes(["openid", "email"]));
    }

    #[test]
    fn scope_value_is_space_separated() {
        let g = grant(&["profile", "openid"]);
        assert_eq!(g.scope_value(), "openid profile");
    }
}
