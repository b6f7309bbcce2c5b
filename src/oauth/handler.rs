// ABOUTME: Authorization endpoint handlers: request, pushed request, authorize decision, deny
// ABOUTME: Performs the persisted side effects and the standing-consent merge at authorize time
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use super::context::{AuthorizationRequestContext, AuthorizeContext};
use super::error::OAuthRequestError;
use super::request::{AuthorizationRequest, AuthorizationRequestParams};
use super::response::{create_authorization_response, AuthorizationResponse};
use crate::config::ConfigResolver;
use crate::identity::{Authentication, User};
use crate::storage::{
    AuthorizationCodeGrantRepository, AuthorizationGrantedRepository,
    AuthorizationRequestRepository, OAuthTokenRepository,
};
use crate::tenant::TenantId;
use crate::token::client_auth::{self, ClientCredentialsInput};

/// Machine-readable reasons for a deny decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// User refused consent
    AccessDenied,
    /// Interaction could not establish a login
    LoginRequired,
    /// Consent could not be obtained
    ConsentRequired,
    /// Required interaction was not possible
    InteractionRequired,
}

impl DenyReason {
    /// RFC/OIDC error code
    #[must_use]
    pub fn error_code(self) -> &'static str {
        match self {
            Self::AccessDenied => "access_denied",
            Self::LoginRequired => "login_required",
            Self::ConsentRequired => "consent_required",
            Self::InteractionRequired => "interaction_required",
        }
    }
}

/// Inputs to the authorize-decision step, delivered by the interaction
/// subsystem once the user finished authenticating and consenting.
#[derive(Debug, Clone)]
pub struct OAuthAuthorizeRequest {
    /// Tenant the request belongs to
    pub tenant_id: TenantId,
    /// Identifier of the stored authorization request
    pub authorization_request_id: Uuid,
    /// Authenticated user
    pub user: User,
    /// Authentication event
    pub authentication: Authentication,
    /// Scopes the user granted; empty means "everything requested"
    pub granted_scopes: BTreeSet<String>,
    /// Scopes the user refused
    pub denied_scopes: BTreeSet<String>,
    /// Extension state from the interaction
    pub custom_properties: serde_json::Map<String, serde_json::Value>,
}

/// Outcome of the authorize-request step
#[derive(Debug)]
pub struct OAuthRequestResult {
    /// The persisted request
    pub request: AuthorizationRequest,
    /// Whether standing consent already covers every requested scope, so the
    /// front end may skip the consent interaction
    pub silently_authorizable: bool,
}

/// Handlers for the authorization endpoint family.
pub struct OAuthRequestHandler {
    config_resolver: Arc<ConfigResolver>,
    request_repo: Arc<dyn AuthorizationRequestRepository>,
    code_grant_repo: Arc<dyn AuthorizationCodeGrantRepository>,
    token_repo: Arc<dyn OAuthTokenRepository>,
    granted_repo: Arc<dyn AuthorizationGrantedRepository>,
}

impl OAuthRequestHandler {
    /// Wire the handler to its collaborators
    pub fn new(
        config_resolver: Arc<ConfigResolver>,
        request_repo: Arc<dyn AuthorizationRequestRepository>,
        code_grant_repo: Arc<dyn AuthorizationCodeGrantRepository>,
        token_repo: Arc<dyn OAuthTokenRepository>,
        granted_repo: Arc<dyn AuthorizationGrantedRepository>,
    ) -> Self {
        Self {
            config_resolver,
            request_repo,
            code_grant_repo,
            token_repo,
            granted_repo,
        }
    }

    /// Validate an inbound authorization request and persist it.
    ///
    /// When a session user is supplied, the result reports whether standing
    /// consent already covers the requested scopes (silent re-authorization).
    ///
    /// # Errors
    /// Typed per the redirectable / non-redirectable split.
    pub async fn handle_request(
        &self,
        tenant: &TenantId,
        params: &AuthorizationRequestParams,
        session_user: Option<&User>,
    ) -> Result<OAuthRequestResult, OAuthRequestError> {
        // A request_uri picks up a previously pushed request instead of
        // building a fresh one
        let request = match params.request_uri.as_deref() {
            Some(raw) => {
                let id = AuthorizationRequest::parse_request_uri(raw).ok_or_else(|| {
                    OAuthRequestError::invalid_request("request_uri is not recognized")
                })?;
                let stored = self.load_live_request(tenant, id).await?;
                if params
                    .client_id
                    .as_deref()
                    .is_some_and(|client_id| client_id != stored.client_id)
                {
                    return Err(OAuthRequestError::invalid_request(
                        "request_uri was pushed by another client",
                    ));
                }
                stored
            }
            None => {
                let context = self.build_context(tenant, params).await?;
                self.request_repo.register(tenant, &context.request).await?;
                context.request
            }
        };

        let silently_authorizable = match session_user {
            Some(user) => self
                .granted_repo
                .find(tenant, &request.client_id, &user.sub)
                .await?
                .is_some_and(|granted| {
                    granted
                        .grant
                        .covers_scopes(request.scopes.iter().map(String::as_str))
                }),
            None => false,
        };

        tracing::debug!(
            tenant = %tenant,
            client_id = %request.client_id,
            request_id = %request.id,
            silently_authorizable,
            "authorization request accepted"
        );
        Ok(OAuthRequestResult {
            request,
            silently_authorizable,
        })
    }

    /// Validate and store a pushed authorization request (PAR).
    ///
    /// Confidential clients must authenticate; the stored request is later
    /// referenced by its `request_uri`.
    ///
    /// # Errors
    /// Always non-redirectable; the entry point renders JSON.
    pub async fn handle_push_request(
        &self,
        tenant: &TenantId,
        params: &AuthorizationRequestParams,
        credentials: &ClientCredentialsInput,
    ) -> Result<AuthorizationRequest, OAuthRequestError> {
        let context = self.build_context(tenant, params).await?;
        if !context.client_config.is_public() {
            let server_config = self.config_resolver.server_config(tenant).await?;
            client_auth::authenticate(credentials, &context.client_config, &server_config)
                .map_err(|e| OAuthRequestError::BadRequest {
                    error: "invalid_client",
                    description: e.to_string(),
                })?;
        }
        self.request_repo.register(tenant, &context.request).await?;
        Ok(context.request)
    }

    async fn build_context(
        &self,
        tenant: &TenantId,
        params: &AuthorizationRequestParams,
    ) -> Result<AuthorizationRequestContext, OAuthRequestError> {
        let client_id = params.client_id.as_deref().ok_or_else(|| {
            OAuthRequestError::invalid_request("client_id is required")
        })?;
        let client_config = self.config_resolver.client_config(tenant, client_id).await?;
        let server_config = self.config_resolver.server_config(tenant).await?;
        AuthorizationRequestContext::build(tenant, params, server_config, client_config)
    }

    /// Turn a completed interaction into an authorization response.
    ///
    /// Side effects, in order: persist the code grant when a code is issued,
    /// persist the token when an access token is issued, and always merge the
    /// standing-consent record. SSO registration happens here, not only at
    /// token exchange.
    ///
    /// # Errors
    /// `BadRequest` for unknown/expired identifiers or an empty decision;
    /// `Redirectable` for a decision that grants nothing.
    pub async fn handle_authorize(
        &self,
        request: &OAuthAuthorizeRequest,
    ) -> Result<AuthorizationResponse, OAuthRequestError> {
        if request.user.sub.is_empty() {
            return Err(OAuthRequestError::invalid_request(
                "authorize decision carries no user",
            ));
        }
        if !request.authentication.is_populated() {
            return Err(OAuthRequestError::invalid_request(
                "authorize decision carries no authentication record",
            ));
        }

        let tenant = &request.tenant_id;
        let stored = self.load_live_request(tenant, request.authorization_request_id).await?;
        let server_config = self.config_resolver.server_config(tenant).await?;
        let client_config = self
            .config_resolver
            .client_config(tenant, &stored.client_id)
            .await?;

        // The interaction's decision, clamped to what was requested
        let granted_scopes: BTreeSet<String> = if request.granted_scopes.is_empty() {
            stored
                .scopes
                .difference(&request.denied_scopes)
                .cloned()
                .collect()
        } else {
            request
                .granted_scopes
                .intersection(&stored.scopes)
                .filter(|scope| !request.denied_scopes.contains(*scope))
                .cloned()
                .collect()
        };
        if granted_scopes.is_empty() {
            return Err(OAuthRequestError::Redirectable {
                redirect_uri: stored.redirect_uri.clone(),
                response_mode: stored.effective_response_mode(),
                error: "access_denied",
                description: "no requested scope was granted".to_owned(),
                state: stored.state.clone(),
            });
        }

        let context = AuthorizeContext {
            request: stored,
            user: request.user.clone(),
            authentication: request.authentication.clone(),
            granted_scopes,
            denied_scopes: request.denied_scopes.clone(),
            custom_properties: request.custom_properties.clone(),
            server_config,
            client_config,
        };

        let created = create_authorization_response(&context)?;
        let grant = context.authorize();

        if let Some(code_grant) = &created.code_grant {
            self.code_grant_repo.register(tenant, code_grant).await?;
        }
        if let Some(token) = &created.token {
            self.token_repo.register(tenant, token).await?;
        }
        // Registering standing consent here is what lets a return visit skip
        // interaction before any token has ever been exchanged
        self.granted_repo.merge_or_register(tenant, &grant).await?;

        // The code path keeps the request alive until token exchange
        if !created.response.has_code() {
            self.request_repo.delete(tenant, context.request.id).await?;
        }

        tracing::info!(
            tenant = %tenant,
            client_id = %grant.client_id,
            request_id = %context.request.id,
            response_type = ?context.request.response_type,
            "authorization granted"
        );
        Ok(created.response)
    }

    /// Turn a deny decision into the RFC error redirect.
    ///
    /// No grant state is touched; the stored request is consumed.
    ///
    /// # Errors
    /// `BadRequest` for unknown or expired identifiers.
    pub async fn handle_deny(
        &self,
        tenant: &TenantId,
        authorization_request_id: Uuid,
        reason: DenyReason,
    ) -> Result<String, OAuthRequestError> {
        let stored = self.load_live_request(tenant, authorization_request_id).await?;
        self.request_repo.delete(tenant, stored.id).await?;

        let error = OAuthRequestError::Redirectable {
            redirect_uri: stored.redirect_uri.clone(),
            response_mode: stored.effective_response_mode(),
            error: reason.error_code(),
            description: "the authorization request was denied".to_owned(),
            state: stored.state.clone(),
        };
        tracing::info!(
            tenant = %tenant,
            client_id = %stored.client_id,
            request_id = %stored.id,
            reason = reason.error_code(),
            "authorization denied"
        );
        // Deny is a successfully produced error response, not a failure
        Ok(error
            .redirect_location()
            .unwrap_or_else(|| stored.redirect_uri.clone()))
    }

    async fn load_live_request(
        &self,
        tenant: &TenantId,
        id: Uuid,
    ) -> Result<AuthorizationRequest, OAuthRequestError> {
        let stored = self
            .request_repo
            .find(tenant, id)
            .await?
            .ok_or_else(|| OAuthRequestError::invalid_request("authorization request not found"))?;
        if stored.is_expired(Utc::now()) {
            self.request_repo.delete(tenant, id).await?;
            return Err(OAuthRequestError::invalid_request(
                "authorization request has expired",
            ));
        }
        Ok(stored)
    }
}
