// ABOUTME: Client-Initiated Backchannel Authentication: request, authorize, deny entry points
// ABOUTME: Token delivery happens at the token endpoint for poll/ping and by notification for push
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{ConfigError, ConfigResolver};
use crate::crypto::random_url_safe;
use crate::grant::{AuthorizationGrant, CibaGrant, CibaGrantStatus};
use crate::identity::{Authentication, User};
use crate::storage::{AuthorizationGrantedRepository, CibaGrantRepository, OAuthTokenRepository};
use crate::tenant::TenantId;
use crate::token::client_auth::{self, ClientCredentialsInput};
use crate::token::id_token::{mint_id_token, IdTokenInputs};
use crate::token::{mint_access_token, mint_refresh_token, GrantType, OAuthToken, TokenError};

/// CIBA token delivery modes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CibaDeliveryMode {
    /// Client polls the token endpoint
    #[default]
    Poll,
    /// Client is pinged, then polls the token endpoint
    Ping,
    /// Tokens are pushed to the client's notification endpoint
    Push,
}

/// Raw backchannel authentication request parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CibaRequestParams {
    /// `scope`, space-separated
    pub scope: Option<String>,
    /// `login_hint`
    pub login_hint: Option<String>,
    /// `login_hint_token`
    pub login_hint_token: Option<String>,
    /// `id_token_hint`
    pub id_token_hint: Option<String>,
    /// `client_notification_token`, required for ping/push
    pub client_notification_token: Option<String>,
    /// `binding_message`, displayed on the authentication device
    pub binding_message: Option<String>,
    /// `requested_expiry` in seconds
    pub requested_expiry: Option<i64>,
}

/// Successful backchannel authentication response
#[derive(Debug, Serialize)]
pub struct CibaIssueResponse {
    /// Handle the client polls or is notified about
    pub auth_req_id: String,
    /// Seconds until the request expires
    pub expires_in: i64,
    /// Minimum seconds between polls
    pub interval: i64,
}

/// Resolves a user hint (`login_hint` et al.) to a user.
///
/// Hint semantics are deployment-specific, so resolution is delegated the
/// same way credential verification is.
#[async_trait]
pub trait UserHintResolver: Send + Sync {
    /// Resolve the hint within a tenant
    async fn resolve(&self, tenant: &TenantId, hint: &str) -> anyhow::Result<Option<User>>;
}

/// Outbound completion notifications for ping and push delivery modes.
///
/// Transport lives outside this crate; implementations receive the client's
/// registered endpoint, its notification token, and the JSON payload.
#[async_trait]
pub trait CibaNotifier: Send + Sync {
    /// Deliver one notification
    async fn notify(
        &self,
        endpoint: &str,
        client_notification_token: Option<&str>,
        payload: serde_json::Value,
    ) -> anyhow::Result<()>;
}

/// CIBA entry points.
pub struct CibaProtocol {
    config_resolver: Arc<ConfigResolver>,
    ciba_grant_repo: Arc<dyn CibaGrantRepository>,
    token_repo: Arc<dyn OAuthTokenRepository>,
    granted_repo: Arc<dyn AuthorizationGrantedRepository>,
    hint_resolver: Arc<dyn UserHintResolver>,
    notifier: Option<Arc<dyn CibaNotifier>>,
}

impl CibaProtocol {
    /// Wire the protocol to its collaborators; `notifier` is only consulted
    /// for ping/push clients.
    pub fn new(
        config_resolver: Arc<ConfigResolver>,
        ciba_grant_repo: Arc<dyn CibaGrantRepository>,
        token_repo: Arc<dyn OAuthTokenRepository>,
        granted_repo: Arc<dyn AuthorizationGrantedRepository>,
        hint_resolver: Arc<dyn UserHintResolver>,
        notifier: Option<Arc<dyn CibaNotifier>>,
    ) -> Self {
        Self {
            config_resolver,
            ciba_grant_repo,
            token_repo,
            granted_repo,
            hint_resolver,
            notifier,
        }
    }

    /// `POST /bc-authorize`: open a backchannel authentication request.
    ///
    /// # Errors
    /// RFC/CIBA error codes as JSON; notably `unknown_user_id` when the hint
    /// resolves to nobody.
    pub async fn request(
        &self,
        tenant: &TenantId,
        params: &CibaRequestParams,
        credentials: &ClientCredentialsInput,
    ) -> Result<CibaIssueResponse, TokenError> {
        let server_config = self
            .config_resolver
            .server_config(tenant)
            .await
            .map_err(config_error)?;
        let client_id = credentials
            .claimed_client_id()
            .ok_or_else(|| TokenError::invalid_client("no client identification present"))?;
        let client_config = self
            .config_resolver
            .client_config(tenant, &client_id)
            .await
            .map_err(config_error)?;
        client_auth::authenticate(credentials, &client_config, &server_config)?;

        if !server_config.supports_grant_type(GrantType::Ciba) {
            return Err(TokenError::unsupported_grant_type(
                "backchannel authentication is not supported by this tenant",
            ));
        }
        if !client_config.allows_grant_type(GrantType::Ciba) {
            return Err(TokenError::unauthorized_client(
                "client is not registered for backchannel authentication",
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
            return Err(TokenError::invalid_scope("scope is required"));
        }
        let unregistered = client_config.unregistered_scopes(scopes.iter().map(String::as_str));
        if !unregistered.is_empty() {
            return Err(TokenError::invalid_scope(format!(
                "client is not registered for scopes: {}",
                unregistered.into_iter().collect::<Vec<_>>().join(" ")
            )));
        }

        let hint = params
            .login_hint
            .as_deref()
            .or(params.login_hint_token.as_deref())
            .or(params.id_token_hint.as_deref())
            .ok_or_else(|| {
                TokenError::invalid_request(
                    "one of login_hint, login_hint_token, id_token_hint is required",
                )
            })?;
        let user = self
            .hint_resolver
            .resolve(tenant, hint)
            .await?
            .ok_or_else(TokenError::unknown_user_id)?;
        if !user.is_active() {
            return Err(TokenError::access_denied("user account is not active"));
        }

        let delivery_mode = client_config.backchannel_token_delivery_mode;
        if delivery_mode != CibaDeliveryMode::Poll {
            if client_config
                .backchannel_client_notification_endpoint
                .is_none()
            {
                return Err(TokenError::invalid_request(
                    "client has no registered backchannel notification endpoint",
                ));
            }
            if params.client_notification_token.is_none() {
                return Err(TokenError::invalid_request(
                    "client_notification_token is required for ping and push delivery",
                ));
            }
        }

        let ttl = params
            .requested_expiry
            .map_or(server_config.backchannel_auth_request_ttl_secs, |requested| {
                requested.clamp(1, server_config.backchannel_auth_request_ttl_secs)
            });
        let grant = CibaGrant {
            auth_req_id: random_url_safe(32)?,
            grant: AuthorizationGrant {
                tenant_id: tenant.clone(),
                user: Some(user),
                authentication: None,
                client_id: client_config.client_id.clone(),
                grant_type: GrantType::Ciba,
                scopes,
                id_token_claims: BTreeSet::new(),
                userinfo_claims: BTreeSet::new(),
                denied_scopes: BTreeSet::new(),
                custom_properties: serde_json::Map::new(),
            },
            delivery_mode,
            status: CibaGrantStatus::Pending,
            interval_secs: server_config.backchannel_polling_interval_secs,
            expires_at: Utc::now() + Duration::seconds(ttl),
            client_notification_token: params.client_notification_token.clone(),
        };
        self.ciba_grant_repo.register(tenant, &grant).await?;

        tracing::info!(
            tenant = %tenant,
            client_id = %grant.grant.client_id,
            delivery_mode = ?delivery_mode,
            "backchannel authentication request opened"
        );
        Ok(CibaIssueResponse {
            auth_req_id: grant.auth_req_id,
            expires_in: ttl,
            interval: grant.interval_secs,
        })
    }

    /// Internal entry point: the out-of-band authentication succeeded.
    ///
    /// Marks the grant authorized, merges standing consent, and for ping/push
    /// clients dispatches the completion notification (push carries the
    /// freshly issued tokens).
    ///
    /// # Errors
    /// `invalid_grant` for unknown/terminal ids, `expired_token` past expiry.
    pub async fn authorize(
        &self,
        tenant: &TenantId,
        auth_req_id: &str,
        user: User,
        authentication: Authentication,
    ) -> Result<(), TokenError> {
        if !authentication.is_populated() {
            return Err(TokenError::invalid_request(
                "authorize decision carries no authentication record",
            ));
        }
        let grant = self.load_pending(tenant, auth_req_id).await?;
        let authorized = grant.authorized(user, authentication);
        self.ciba_grant_repo.update(tenant, &authorized).await?;
        self.granted_repo
            .merge_or_register(tenant, &authorized.grant)
            .await?;

        match authorized.delivery_mode {
            CibaDeliveryMode::Poll => {}
            CibaDeliveryMode::Ping => {
                self.dispatch_notification(
                    tenant,
                    &authorized,
                    serde_json::json!({ "auth_req_id": authorized.auth_req_id }),
                )
                .await;
            }
            CibaDeliveryMode::Push => {
                let token = self.issue_push_token(tenant, &authorized).await?;
                let payload = serde_json::json!({
                    "auth_req_id": authorized.auth_req_id,
                    "access_token": token.access_token.value,
                    "token_type": "Bearer",
                    "expires_in": token.access_token.expires_in(Utc::now()),
                    "refresh_token": token.refresh_token.as_ref().map(|r| r.value.clone()),
                    "id_token": token.id_token,
                });
                // Push grants are terminal once the tokens leave the engine
                self.ciba_grant_repo.consume(tenant, auth_req_id).await?;
                self.dispatch_notification(tenant, &authorized, payload).await;
            }
        }

        tracing::info!(tenant = %tenant, auth_req_id, "backchannel authentication authorized");
        Ok(())
    }

    /// Internal entry point: the out-of-band authentication was refused.
    ///
    /// # Errors
    /// Same identifier errors as [`Self::authorize`].
    pub async fn deny(&self, tenant: &TenantId, auth_req_id: &str) -> Result<(), TokenError> {
        let grant = self.load_pending(tenant, auth_req_id).await?;
        self.ciba_grant_repo.update(tenant, &grant.denied()).await?;
        tracing::info!(tenant = %tenant, auth_req_id, "backchannel authentication denied");
        Ok(())
    }

    async fn load_pending(
        &self,
        tenant: &TenantId,
        auth_req_id: &str,
    ) -> Result<CibaGrant, TokenError> {
        let grant = self
            .ciba_grant_repo
            .find(tenant, auth_req_id)
            .await?
            .ok_or_else(|| TokenError::invalid_grant("unknown auth_req_id"))?;
        if grant.is_expired(Utc::now()) {
            self.ciba_grant_repo.consume(tenant, auth_req_id).await?;
            return Err(TokenError::expired_token(
                "the backchannel authentication request has expired",
            ));
        }
        if grant.status != CibaGrantStatus::Pending {
            return Err(TokenError::invalid_grant(
                "the backchannel authentication request is already decided",
            ));
        }
        Ok(grant)
    }

    async fn issue_push_token(
        &self,
        tenant: &TenantId,
        grant: &CibaGrant,
    ) -> Result<OAuthToken, TokenError> {
        let server_config = self
            .config_resolver
            .server_config(tenant)
            .await
            .map_err(config_error)?;
        let client_config = self
            .config_resolver
            .client_config(tenant, &grant.grant.client_id)
            .await
            .map_err(config_error)?;

        let access_token = mint_access_token(
            client_config
                .access_token_ttl_secs
                .unwrap_or(server_config.access_token_ttl_secs),
        )?;
        let refresh_token = if client_config.allows_grant_type(GrantType::RefreshToken) {
            Some(mint_refresh_token(
                client_config
                    .refresh_token_ttl_secs
                    .unwrap_or(server_config.refresh_token_ttl_secs),
            )?)
        } else {
            None
        };
        let id_token = if grant.grant.has_openid_scope() {
            Some(
                mint_id_token(
                    &server_config,
                    &grant.grant,
                    &IdTokenInputs {
                        nonce: None,
                        access_token: Some(access_token.value.clone()),
                        authorization_code: None,
                    },
                )
                .map_err(TokenError::from)?,
            )
        } else {
            None
        };

        let token = OAuthToken {
            id: Uuid::new_v4(),
            tenant_id: tenant.clone(),
            grant: grant.grant.clone(),
            access_token,
            refresh_token,
            id_token,
            c_nonce: None,
            c_nonce_expires_in: None,
        };
        self.token_repo.register(tenant, &token).await?;
        Ok(token)
    }

    async fn dispatch_notification(
        &self,
        tenant: &TenantId,
        grant: &CibaGrant,
        payload: serde_json::Value,
    ) {
        let Some(notifier) = self.notifier.as_ref() else {
            tracing::warn!(
                tenant = %tenant,
                auth_req_id = %grant.auth_req_id,
                "no notifier configured; skipping backchannel notification"
            );
            return;
        };
        let endpoint = match self
            .config_resolver
            .client_config(tenant, &grant.grant.client_id)
            .await
        {
            Ok(config) => config.backchannel_client_notification_endpoint.clone(),
            Err(err) => {
                tracing::error!(tenant = %tenant, error = %err, "notification endpoint lookup failed");
                None
            }
        };
        let Some(endpoint) = endpoint else { return };
        if let Err(err) = notifier
            .notify(
                &endpoint,
                grant.client_notification_token.as_deref(),
                payload,
            )
            .await
        {
            tracing::error!(
                tenant = %tenant,
                auth_req_id = %grant.auth_req_id,
                error = %format!("{err:#}"),
                "backchannel notification delivery failed"
            );
        }
    }
}

fn config_error(err: ConfigError) -> TokenError {
    match err {
        ConfigError::ClientNotFound { .. } => TokenError::invalid_client("unknown client"),
        ConfigError::ServerNotFound(_) => TokenError::invalid_request("tenant is not configured"),
        ConfigError::Store(inner) => inner.into(),
    }
}
