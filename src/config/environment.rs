// ABOUTME: Environment-driven defaults for server-level token lifetimes and policies
// ABOUTME: Tenant configuration overrides these; deployments tune them without code changes
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use anyhow::{Context, Result};
use std::env;

/// Server-level defaults applied when a tenant configuration omits a value.
#[derive(Debug, Clone)]
pub struct ServerDefaults {
    /// Access-token lifetime in seconds
    pub access_token_ttl_secs: i64,
    /// Refresh-token lifetime in seconds
    pub refresh_token_ttl_secs: i64,
    /// Authorization-code lifetime in seconds
    pub authorization_code_ttl_secs: i64,
    /// Rotate refresh tokens on use
    pub refresh_token_rotation: bool,
}

impl Default for ServerDefaults {
    fn default() -> Self {
        Self {
            access_token_ttl_secs: 3600,
            refresh_token_ttl_secs: 86_400 * 30,
            authorization_code_ttl_secs: 600,
            refresh_token_rotation: true,
        }
    }
}

impl ServerDefaults {
    /// Load defaults from the environment, falling back field-by-field.
    ///
    /// Recognized variables: `IDP_ACCESS_TOKEN_TTL_SECS`,
    /// `IDP_REFRESH_TOKEN_TTL_SECS`, `IDP_AUTH_CODE_TTL_SECS`,
    /// `IDP_REFRESH_TOKEN_ROTATION`.
    ///
    /// # Errors
    /// Returns an error when a variable is present but unparsable, so a typo
    /// fails loudly at startup instead of silently shortening token lifetimes.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            access_token_ttl_secs: read_i64(
                "IDP_ACCESS_TOKEN_TTL_SECS",
                defaults.access_token_ttl_secs,
            )?,
            refresh_token_ttl_secs: read_i64(
                "IDP_REFRESH_TOKEN_TTL_SECS",
                defaults.refresh_token_ttl_secs,
            )?,
            authorization_code_ttl_secs: read_i64(
                "IDP_AUTH_CODE_TTL_SECS",
                defaults.authorization_code_ttl_secs,
            )?,
            refresh_token_rotation: read_bool(
                "IDP_REFRESH_TOKEN_ROTATION",
                defaults.refresh_token_rotation,
            )?,
        })
    }
}

fn read_i64(name: &str, fallback: i64) -> Result<i64> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<i64>()
            .with_context(|| format!("{name} must be an integer, got {raw:?}")),
        Err(_) => Ok(fallback),
    }
}

fn read_bool(name: &str, fallback: bool) -> Result<bool> {
    match env::var(name) {
        Ok(raw) => match raw.as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => anyhow::bail!("{name} must be true/false, got {other:?}"),
        },
        Err(_) => Ok(fallback),
    }
}
