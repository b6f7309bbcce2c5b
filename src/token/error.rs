// ABOUTME: Token endpoint error shape per RFC 6749 §5.2 and the CIBA pending/denied codes
// ABOUTME: Serialized as the JSON error body; status code derives from the error kind
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use serde::Serialize;

/// Token endpoint error response.
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("{error}: {error_description}")]
pub struct TokenError {
    /// RFC error code
    pub error: &'static str,
    /// Human-readable detail
    pub error_description: String,
}

impl TokenError {
    fn new(error: &'static str, description: impl Into<String>) -> Self {
        Self {
            error,
            error_description: description.into(),
        }
    }

    /// `invalid_request`
    pub fn invalid_request(description: impl Into<String>) -> Self {
        Self::new("invalid_request", description)
    }

    /// `invalid_client`: client authentication failed
    pub fn invalid_client(description: impl Into<String>) -> Self {
        Self::new("invalid_client", description)
    }

    /// `invalid_grant`: code, refresh token, or assertion unusable
    pub fn invalid_grant(description: impl Into<String>) -> Self {
        Self::new("invalid_grant", description)
    }

    /// `unauthorized_client`: grant type not registered for this client
    pub fn unauthorized_client(description: impl Into<String>) -> Self {
        Self::new("unauthorized_client", description)
    }

    /// `unsupported_grant_type`
    pub fn unsupported_grant_type(description: impl Into<String>) -> Self {
        Self::new("unsupported_grant_type", description)
    }

    /// `invalid_scope`
    pub fn invalid_scope(description: impl Into<String>) -> Self {
        Self::new("invalid_scope", description)
    }

    /// CIBA: user has not completed the out-of-band authentication yet
    pub fn authorization_pending() -> Self {
        Self::new(
            "authorization_pending",
            "the authorization request is still pending",
        )
    }

    /// CIBA: user refused
    pub fn access_denied(description: impl Into<String>) -> Self {
        Self::new("access_denied", description)
    }

    /// CIBA: the user hint resolved to nobody
    #[must_use]
    pub fn unknown_user_id() -> Self {
        Self::new("unknown_user_id", "the supplied hint matches no user")
    }

    /// CIBA: the auth_req_id expired before completion
    pub fn expired_token(description: impl Into<String>) -> Self {
        Self::new("expired_token", description)
    }

    /// `server_error`; detail stays in the logs
    pub fn server_error() -> Self {
        Self::new("server_error", "an unexpected error occurred")
    }

    /// HTTP status for the JSON error body
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self.error {
            "invalid_client" => 401,
            "server_error" => 500,
            _ => 400,
        }
    }
}

impl From<anyhow::Error> for TokenError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %format!("{err:#}"), "token endpoint store failure");
        Self::server_error()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        assert_eq!(TokenError::invalid_client("x").status_code(), 401);
        assert_eq!(TokenError::invalid_grant("x").status_code(), 400);
        assert_eq!(TokenError::server_error().status_code(), 500);
    }

    #[test]
    fn serializes_to_rfc_shape() {
        let json = serde_json::to_value(TokenError::invalid_grant("code already used")).unwrap();
        assert_eq!(json["error"], "invalid_grant");
        assert_eq!(json["error_description"], "code already used");
    }
}
