// ABOUTME: Authorization endpoint entry points translating typed failures to wire outcomes
// ABOUTME: The only layer that decides between inline rendering and redirect delivery
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use chrono::Utc;
use uuid::Uuid;

use super::error::OAuthRequestError;
use super::handler::{DenyReason, OAuthAuthorizeRequest, OAuthRequestHandler};
use super::request::AuthorizationRequestParams;
use crate::identity::User;
use crate::tenant::TenantId;
use crate::token::client_auth::ClientCredentialsInput;

/// Wire outcome of the authorize-request step
#[derive(Debug)]
pub enum OAuthRequestOutcome {
    /// Request stored; the front end must run an interaction
    InteractionRequired {
        /// Stored request identifier
        request_id: Uuid,
    },
    /// Request stored and standing consent covers it; no interaction needed
    SilentlyAuthorizable {
        /// Stored request identifier
        request_id: Uuid,
    },
    /// Client/redirect target untrusted; render inline, never redirect
    BadRequest {
        /// RFC error code
        error: &'static str,
        /// Detail safe for the user agent
        error_description: String,
    },
    /// Redirect target is trustworthy; deliver the error by redirect
    RedirectableError {
        /// Full redirect location carrying the error parameters
        location: String,
    },
    /// Unanticipated failure; detail stays in the logs
    ServerError,
}

/// Wire outcome of authorize / deny decisions
#[derive(Debug)]
pub enum AuthorizeOutcome {
    /// Redirect the user agent (success or redirectable error)
    Redirect {
        /// Full redirect location
        location: String,
    },
    /// Identifier or decision invalid; render inline
    BadRequest {
        /// RFC error code
        error: &'static str,
        /// Detail safe for the user agent
        error_description: String,
    },
    /// Unanticipated failure
    ServerError,
}

/// Wire outcome of a pushed authorization request; errors are always JSON
#[derive(Debug)]
pub enum PushedRequestOutcome {
    /// Request accepted
    Created {
        /// `request_uri` the client passes to the authorization endpoint
        request_uri: String,
        /// Seconds until the stored request expires
        expires_in: i64,
    },
    /// Request rejected
    BadRequest {
        /// RFC error code
        error: &'static str,
        /// Detail
        error_description: String,
    },
    /// Unanticipated failure
    ServerError,
}

/// Authorization endpoint family entry points.
pub struct OAuthProtocol {
    handler: OAuthRequestHandler,
}

impl OAuthProtocol {
    /// Wrap a wired handler
    #[must_use]
    pub fn new(handler: OAuthRequestHandler) -> Self {
        Self { handler }
    }

    /// Shared handler, for composing with the interaction subsystem
    #[must_use]
    pub fn handler(&self) -> &OAuthRequestHandler {
        &self.handler
    }

    /// `GET/POST /authorize`
    pub async fn request(
        &self,
        tenant: &TenantId,
        params: &AuthorizationRequestParams,
        session_user: Option<&User>,
    ) -> OAuthRequestOutcome {
        match self.handler.handle_request(tenant, params, session_user).await {
            Ok(result) if result.silently_authorizable => {
                OAuthRequestOutcome::SilentlyAuthorizable {
                    request_id: result.request.id,
                }
            }
            Ok(result) => OAuthRequestOutcome::InteractionRequired {
                request_id: result.request.id,
            },
            Err(err) => match classify(err, "authorize request") {
                Classified::BadRequest {
                    error,
                    error_description,
                } => OAuthRequestOutcome::BadRequest {
                    error,
                    error_description,
                },
                Classified::Redirect { location } => {
                    OAuthRequestOutcome::RedirectableError { location }
                }
                Classified::ServerError => OAuthRequestOutcome::ServerError,
            },
        }
    }

    /// Pushed authorization request endpoint; never redirects
    pub async fn push_request(
        &self,
        tenant: &TenantId,
        params: &AuthorizationRequestParams,
        credentials: &ClientCredentialsInput,
    ) -> PushedRequestOutcome {
        match self.handler.handle_push_request(tenant, params, credentials).await {
            Ok(request) => PushedRequestOutcome::Created {
                request_uri: request.request_uri(),
                expires_in: (request.expires_at - Utc::now()).num_seconds().max(0),
            },
            Err(OAuthRequestError::BadRequest {
                error,
                description,
            }) => PushedRequestOutcome::BadRequest {
                error,
                error_description: description,
            },
            // PAR delivers every client error as JSON, including ones that
            // would redirect on the front channel
            Err(OAuthRequestError::Redirectable {
                error, description, ..
            }) => PushedRequestOutcome::BadRequest {
                error,
                error_description: description,
            },
            Err(OAuthRequestError::ServerError(err)) => {
                tracing::error!(error = %format!("{err:#}"), "pushed authorization request failed");
                PushedRequestOutcome::ServerError
            }
        }
    }

    /// Authorize-decision entry point, called after the interaction completes
    pub async fn authorize(&self, request: &OAuthAuthorizeRequest) -> AuthorizeOutcome {
        match self.handler.handle_authorize(request).await {
            Ok(response) => AuthorizeOutcome::Redirect {
                location: response.redirect_location(),
            },
            Err(err) => match classify(err, "authorize decision") {
                Classified::BadRequest {
                    error,
                    error_description,
                } => AuthorizeOutcome::BadRequest {
                    error,
                    error_description,
                },
                Classified::Redirect { location } => AuthorizeOutcome::Redirect { location },
                Classified::ServerError => AuthorizeOutcome::ServerError,
            },
        }
    }

    /// Deny entry point
    pub async fn deny(
        &self,
        tenant: &TenantId,
        authorization_request_id: Uuid,
        reason: DenyReason,
    ) -> AuthorizeOutcome {
        match self
            .handler
            .handle_deny(tenant, authorization_request_id, reason)
            .await
        {
            Ok(location) => AuthorizeOutcome::Redirect { location },
            Err(err) => match classify(err, "deny decision") {
                Classified::BadRequest {
                    error,
                    error_description,
                } => AuthorizeOutcome::BadRequest {
                    error,
                    error_description,
                },
                Classified::Redirect { location } => AuthorizeOutcome::Redirect { location },
                Classified::ServerError => AuthorizeOutcome::ServerError,
            },
        }
    }
}

enum Classified {
    BadRequest {
        error: &'static str,
        error_description: String,
    },
    Redirect {
        location: String,
    },
    ServerError,
}

fn classify(err: OAuthRequestError, step: &str) -> Classified {
    match err {
        OAuthRequestError::BadRequest { error, description } => {
            tracing::warn!(error, description = %description, "{step} rejected");
            Classified::BadRequest {
                error,
                error_description: description,
            }
        }
        redirectable @ OAuthRequestError::Redirectable { .. } => {
            // Safe by construction: the variant always yields a location
            match redirectable.redirect_location() {
                Some(location) => Classified::Redirect { location },
                None => Classified::ServerError,
            }
        }
        OAuthRequestError::ServerError(err) => {
            tracing::error!(error = %format!("{err:#}"), "{step} failed unexpectedly");
            Classified::ServerError
        }
    }
}
