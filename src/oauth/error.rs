// ABOUTME: Typed authorization-endpoint failures: non-redirectable, redirectable, server error
// ABOUTME: Redirecting an error to an unverified URI is an open redirect, so the type forbids it
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use super::response::{append_response_params, ResponseMode};
use crate::config::ConfigError;

/// Failure of an authorization-endpoint step.
///
/// `Redirectable` can only be constructed after the client and redirect URI
/// have been validated; everything earlier is `BadRequest` and must be
/// rendered inline.
#[derive(Debug, thiserror::Error)]
pub enum OAuthRequestError {
    /// Client or redirect target could not be established; render inline
    #[error("{error}: {description}")]
    BadRequest {
        /// RFC error code
        error: &'static str,
        /// Human-readable detail
        description: String,
    },
    /// Client and redirect target are trustworthy; deliver via redirect
    #[error("{error}: {description}")]
    Redirectable {
        /// Validated redirect target
        redirect_uri: String,
        /// Query vs fragment delivery
        response_mode: ResponseMode,
        /// RFC error code
        error: &'static str,
        /// Human-readable detail
        description: String,
        /// Client state, echoed back
        state: Option<String>,
    },
    /// Unanticipated failure; logged in full, generic outward
    #[error("server error")]
    ServerError(#[from] anyhow::Error),
}

impl OAuthRequestError {
    /// Non-redirectable `invalid_request`
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::BadRequest {
            error: "invalid_request",
            description: description.into(),
        }
    }

    /// Builds the error-carrying redirect location for the redirectable case.
    #[must_use]
    pub fn redirect_location(&self) -> Option<String> {
        let Self::Redirectable {
            redirect_uri,
            response_mode,
            error,
            description,
            state,
        } = self
        else {
            return None;
        };
        let mut params: Vec<(&str, &str)> =
            vec![("error", error), ("error_description", description)];
        if let Some(state) = state {
            params.push(("state", state));
        }
        Some(append_response_params(redirect_uri, *response_mode, &params))
    }
}

impl From<ConfigError> for OAuthRequestError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ServerNotFound(_) | ConfigError::ClientNotFound { .. } => {
                Self::invalid_request(err.to_string())
            }
            ConfigError::Store(inner) => Self::ServerError(inner),
        }
    }
}
