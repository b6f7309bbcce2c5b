// ABOUTME: Validated, immutable contexts for the authorize request and decision steps
// ABOUTME: Redirect target is validated before any error is allowed to redirect
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use chrono::{Duration, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use super::error::OAuthRequestError;
use super::request::{AuthorizationRequest, AuthorizationRequestParams};
use super::response::{ResponseMode, ResponseType};
use crate::config::{AuthorizationServerConfig, ClientConfig};
use crate::grant::AuthorizationGrant;
use crate::identity::{Authentication, User};
use crate::pkce::{self, CodeChallengeMethod};
use crate::tenant::TenantId;
use crate::token::GrantType;

/// Validated context for one authorization request.
///
/// Construction is the only validation point; holding a value of this type
/// means the client, redirect target, and parameter combination were all
/// accepted.
#[derive(Debug, Clone)]
pub struct AuthorizationRequestContext {
    /// The validated, ready-to-persist request
    pub request: AuthorizationRequest,
    /// Tenant configuration used for validation
    pub server_config: Arc<AuthorizationServerConfig>,
    /// Client configuration used for validation
    pub client_config: Arc<ClientConfig>,
}

impl AuthorizationRequestContext {
    /// Validate raw parameters against the resolved configurations.
    ///
    /// Ordering is safety-critical: the redirect target is established first,
    /// and only failures after that point are redirectable.
    ///
    /// # Errors
    /// `BadRequest` until client + redirect URI are trustworthy,
    /// `Redirectable` afterwards.
    pub fn build(
        tenant: &TenantId,
        params: &AuthorizationRequestParams,
        server_config: Arc<AuthorizationServerConfig>,
        client_config: Arc<ClientConfig>,
    ) -> Result<Self, OAuthRequestError> {
        // -- non-redirectable zone: redirect target not yet trustworthy --
        let redirect_uri = match params.redirect_uri.as_deref() {
            Some(uri) => {
                if !client_config.is_registered_redirect_uri(uri) {
                    return Err(OAuthRequestError::invalid_request(
                        "redirect_uri is not registered for this client",
                    ));
                }
                uri.to_owned()
            }
            None => client_config
                .sole_registered_redirect_uri()
                .ok_or_else(|| {
                    OAuthRequestError::invalid_request(
                        "redirect_uri is required when multiple URIs are registered",
                    )
                })?
                .to_owned(),
        };

        // -- redirectable zone --
        let state = params.state.clone();
        let raw_response_type = params.response_type.clone().unwrap_or_default();
        let response_type = ResponseType::parse(&raw_response_type);

        let response_mode = match params.response_mode.as_deref() {
            None => None,
            Some("query") => Some(ResponseMode::Query),
            Some("fragment") => Some(ResponseMode::Fragment),
            Some(other) => {
                return Err(redirectable(
                    &redirect_uri,
                    response_type,
                    "invalid_request",
                    format!("unsupported response_mode: {other}"),
                    state,
                ))
            }
        };

        let Some(response_type) = response_type else {
            return Err(redirectable(
                &redirect_uri,
                None,
                "unsupported_response_type",
                format!("cannot parse response_type: {raw_response_type:?}"),
                state,
            ));
        };
        let fail = |error: &'static str, description: String| {
            redirectable(
                &redirect_uri,
                Some(response_type),
                error,
                description,
                params.state.clone(),
            )
        };

        if !server_config.supports_response_type(response_type) {
            return Err(fail(
                "unsupported_response_type",
                format!("server does not support response_type {raw_response_type}"),
            ));
        }
        if !client_config.allows_response_type(response_type) {
            return Err(fail(
                "unauthorized_client",
                format!("client is not registered for response_type {raw_response_type}"),
            ));
        }
        // Tokens in the query string would end up in logs and referrers
        if response_mode == Some(ResponseMode::Query) && response_type != ResponseType::Code {
            return Err(fail(
                "invalid_request",
                "response_mode=query is not allowed for token-bearing response types".to_owned(),
            ));
        }

        let scopes: BTreeSet<String> = params
            .scope
            .as_deref()
            .unwrap_or_default()
            .split_ascii_whitespace()
            .map(ToOwned::to_owned)
            .collect();
        if scopes.is_empty() {
            return Err(fail("invalid_scope", "scope is required".to_owned()));
        }
        if !server_config.recognizes_scopes(scopes.iter().map(String::as_str)) {
            return Err(fail(
                "invalid_scope",
                "request contains scopes unknown to this tenant".to_owned(),
            ));
        }
        let unregistered = client_config.unregistered_scopes(scopes.iter().map(String::as_str));
        if !unregistered.is_empty() {
            return Err(fail(
                "invalid_scope",
                format!(
                    "client is not registered for scopes: {}",
                    unregistered.into_iter().collect::<Vec<_>>().join(" ")
                ),
            ));
        }

        let code_challenge_method = match (&params.code_challenge, &params.code_challenge_method) {
            (None, _) => None,
            (Some(challenge), raw_method) => {
                if !pkce::challenge_format_valid(challenge) {
                    return Err(fail(
                        "invalid_request",
                        "code_challenge must be between 43 and 128 characters".to_owned(),
                    ));
                }
                // RFC 7636 defaults the method to plain when omitted
                let method = match raw_method.as_deref() {
                    None => CodeChallengeMethod::Plain,
                    Some(raw) => CodeChallengeMethod::parse(raw).ok_or_else(|| {
                        fail(
                            "invalid_request",
                            format!("unknown code_challenge_method: {raw}"),
                        )
                    })?,
                };
                if !server_config.supports_code_challenge_method(method) {
                    return Err(fail(
                        "invalid_request",
                        format!(
                            "code_challenge_method {} is not accepted by this tenant",
                            method.as_str()
                        ),
                    ));
                }
                Some(method)
            }
        };
        if client_config.is_public()
            && server_config.require_pkce_for_public_clients
            && response_type.includes_code()
            && params.code_challenge.is_none()
        {
            return Err(fail(
                "invalid_request",
                "public clients must send a PKCE code_challenge".to_owned(),
            ));
        }

        if response_type.includes_id_token() && params.nonce.is_none() {
            return Err(fail(
                "invalid_request",
                "nonce is required when response_type includes id_token".to_owned(),
            ));
        }

        let (id_token_claims, userinfo_claims) = match params.claims.as_deref() {
            None => (BTreeSet::new(), BTreeSet::new()),
            Some(raw) => parse_claims(raw)
                .map_err(|description| fail("invalid_request", description))?,
        };

        let authorization_details = match params.authorization_details.as_deref() {
            None => None,
            Some(raw) => Some(serde_json::from_str::<serde_json::Value>(raw).map_err(|e| {
                fail(
                    "invalid_request",
                    format!("authorization_details is not valid JSON: {e}"),
                )
            })?),
        };

        let now = Utc::now();
        let request = AuthorizationRequest {
            id: Uuid::new_v4(),
            tenant_id: tenant.clone(),
            client_id: client_config.client_id.clone(),
            response_type,
            redirect_uri,
            scopes,
            state: params.state.clone(),
            nonce: params.nonce.clone(),
            response_mode,
            code_challenge: params.code_challenge.clone(),
            code_challenge_method,
            id_token_claims,
            userinfo_claims,
            authorization_details,
            custom_properties: params.custom.clone(),
            created_at: now,
            expires_at: now + Duration::seconds(server_config.authorization_request_ttl_secs),
        };

        Ok(Self {
            request,
            server_config,
            client_config,
        })
    }
}

fn redirectable(
    redirect_uri: &str,
    response_type: Option<ResponseType>,
    error: &'static str,
    description: String,
    state: Option<String>,
) -> OAuthRequestError {
    OAuthRequestError::Redirectable {
        redirect_uri: redirect_uri.to_owned(),
        response_mode: response_type
            .map_or(ResponseMode::Query, ResponseType::default_response_mode),
        error,
        description,
        state,
    }
}

/// Extract requested claim names from an OIDC `claims` parameter document.
fn parse_claims(raw: &str) -> Result<(BTreeSet<String>, BTreeSet<String>), String> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| format!("claims is not valid JSON: {e}"))?;
    let names = |section: &str| -> BTreeSet<String> {
        value
            .get(section)
            .and_then(serde_json::Value::as_object)
            .map(|object| object.keys().cloned().collect())
            .unwrap_or_default()
    };
    Ok((names("id_token"), names("userinfo")))
}

/// Validated context for one authorize decision.
///
/// Combines the stored request with the authenticated user, the interaction's
/// scope decisions, and both configurations.
#[derive(Debug, Clone)]
pub struct AuthorizeContext {
    /// The stored authorization request
    pub request: AuthorizationRequest,
    /// Authenticated user
    pub user: User,
    /// Authentication event backing the decision
    pub authentication: Authentication,
    /// Scopes the interaction granted (already filtered to the request)
    pub granted_scopes: BTreeSet<String>,
    /// Scopes the user refused
    pub denied_scopes: BTreeSet<String>,
    /// Extension state from the decision step
    pub custom_properties: serde_json::Map<String, serde_json::Value>,
    /// Tenant configuration
    pub server_config: Arc<AuthorizationServerConfig>,
    /// Client configuration
    pub client_config: Arc<ClientConfig>,
}

impl AuthorizeContext {
    /// Parameter placement for the response
    #[must_use]
    pub fn response_mode(&self) -> ResponseMode {
        self.request.effective_response_mode()
    }

    /// The grant payload this decision produces.
    #[must_use]
    pub fn authorize(&self) -> AuthorizationGrant {
        let mut custom_properties = self.request.custom_properties.clone();
        custom_properties.extend(self.custom_properties.clone());
        AuthorizationGrant {
            tenant_id: self.request.tenant_id.clone(),
            user: Some(self.user.clone()),
            authentication: Some(self.authentication.clone()),
            client_id: self.request.client_id.clone(),
            grant_type: GrantType::AuthorizationCode,
            scopes: self.granted_scopes.clone(),
            id_token_claims: self.request.id_token_claims.clone(),
            userinfo_claims: self.request.userinfo_claims.clone(),
            denied_scopes: self.denied_scopes.clone(),
            custom_properties,
        }
    }
}
