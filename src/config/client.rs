// ABOUTME: Per-client configuration record resolved for every protocol call
// ABOUTME: Registration itself is control-plane work; this crate only reads the result
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::ciba::CibaDeliveryMode;
use crate::oauth::response::ResponseType;
use crate::token::{ClientAuthMethod, GrantType};

/// OAuth application type (RFC 7591 `application_type`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationType {
    /// Confidential web application
    Web,
    /// Native/public application
    Native,
}

/// Client configuration for one registered relying party.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Client identifier
    pub client_id: String,
    /// Client secret; absent for public clients
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Display name
    #[serde(default)]
    pub client_name: String,
    /// Registered redirect URIs (exact-match set)
    pub redirect_uris: Vec<String>,
    /// Registered post-logout redirect URIs (exact-match set)
    #[serde(default)]
    pub post_logout_redirect_uris: Vec<String>,
    /// Grant types this client may use at the token endpoint
    pub grant_types: Vec<GrantType>,
    /// Response types this client may use at the authorization endpoint
    pub response_types: Vec<ResponseType>,
    /// Scopes this client may request
    pub scopes: Vec<String>,
    /// How the client authenticates at the token endpoint
    pub token_endpoint_auth_method: ClientAuthMethod,
    /// Application type; `Native` clients are treated as public
    #[serde(default = "default_application_type")]
    pub application_type: ApplicationType,
    /// Client JWKS document (JSON) for `private_key_jwt` and jwt-bearer
    #[serde(default)]
    pub jwks: Option<String>,
    /// Expected certificate subject DN for `tls_client_auth`
    #[serde(default)]
    pub tls_client_auth_subject_dn: Option<String>,
    /// CIBA token delivery mode
    #[serde(default)]
    pub backchannel_token_delivery_mode: CibaDeliveryMode,
    /// CIBA notification endpoint for ping/push modes
    #[serde(default)]
    pub backchannel_client_notification_endpoint: Option<String>,
    /// Access-token lifetime override
    #[serde(default)]
    pub access_token_ttl_secs: Option<i64>,
    /// Refresh-token lifetime override
    #[serde(default)]
    pub refresh_token_ttl_secs: Option<i64>,
    /// Refresh-token rotation override
    #[serde(default)]
    pub refresh_token_rotation: Option<bool>,
    /// Disabled clients fail every protocol call
    #[serde(default = "default_true")]
    pub enabled: bool,
}

const fn default_true() -> bool {
    true
}
const fn default_application_type() -> ApplicationType {
    ApplicationType::Web
}

impl ClientConfig {
    /// Public clients authenticate with `none` and must carry PKCE
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.token_endpoint_auth_method == ClientAuthMethod::None
            || matches!(self.application_type, ApplicationType::Native)
    }

    /// Exact-match check against the registered redirect URI set
    #[must_use]
    pub fn is_registered_redirect_uri(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|uri| uri == redirect_uri)
    }

    /// The single registered redirect URI, when exactly one exists.
    ///
    /// RFC 6749 §3.1.2.3 lets the request omit `redirect_uri` only in that
    /// case.
    #[must_use]
    pub fn sole_registered_redirect_uri(&self) -> Option<&str> {
        match self.redirect_uris.as_slice() {
            [only] => Some(only.as_str()),
            _ => None,
        }
    }

    /// Exact-match check against the registered post-logout URI set
    #[must_use]
    pub fn is_registered_post_logout_redirect_uri(&self, uri: &str) -> bool {
        self.post_logout_redirect_uris.iter().any(|u| u == uri)
    }

    /// Whether the client registered for this grant type
    #[must_use]
    pub fn allows_grant_type(&self, grant_type: GrantType) -> bool {
        self.grant_types.contains(&grant_type)
    }

    /// Whether the client registered for this response type
    #[must_use]
    pub fn allows_response_type(&self, response_type: ResponseType) -> bool {
        self.response_types.contains(&response_type)
    }

    /// Requested scopes the client did not register for
    #[must_use]
    pub fn unregistered_scopes<'a>(
        &self,
        requested: impl IntoIterator<Item = &'a str>,
    ) -> BTreeSet<String> {
        requested
            .into_iter()
            .filter(|scope| !self.scopes.iter().any(|s| s == scope))
            .map(ToOwned::to_owned)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_client() -> ClientConfig {
        ClientConfig {
            client_id: "client-1".to_owned(),
            client_secret: Some("secret".to_owned()),
            client_name: "Test".to_owned(),
            redirect_uris: vec!["https://rp.example.com/cb".to_owned()],
            post_logout_redirect_uris: vec![],
            grant_types: vec![GrantType::AuthorizationCode],
            response_types: vec![ResponseType::Code],
            scopes: vec!["openid".to_owned(), "profile".to_owned()],
            token_endpoint_auth_method: ClientAuthMethod::ClientSecretBasic,
            application_type: ApplicationType::Web,
            jwks: None,
            tls_client_auth_subject_dn: None,
            backchannel_token_delivery_mode: CibaDeliveryMode::Poll,
            backchannel_client_notification_endpoint: None,
            access_token_ttl_secs: None,
            refresh_token_ttl_secs: None,
            refresh_token_rotation: None,
            enabled: true,
        }
    }

    #[test]
    fn redirect_uri_matching_is_exact() {
        let client = base_client();
        assert!(client.is_registered_redirect_uri("https://rp.example.com/cb"));
        assert!(!client.is_registered_redirect_uri("https://rp.example.com/cb/"));
        assert!(!client.is_registered_redirect_uri("https://rp.example.com"));
    }

    #[test]
    fn sole_redirect_uri_requires_exactly_one_registration() {
        let mut client = base_client();
        assert_eq!(
            client.sole_registered_redirect_uri(),
            Some("https://rp.example.com/cb")
        );
        client
            .redirect_uris
            .push("https://rp.example.com/cb2".to_owned());
        assert_eq!(client.sole_registered_redirect_uri(), None);
    }

    #[test]
    fn native_clients_are_public() {
        let mut client = base_client();
        assert!(!client.is_public());
        client.application_type = ApplicationType::Native;
        assert!(client.is_public());
    }

    #[test]
    fn unregistered_scopes_are_reported() {
        let client = base_client();
        let extra = client.unregistered_scopes(["openid", "payments"]);
        assert_eq!(extra.len(), 1);
        assert!(extra.contains("payments"));
    }
}
