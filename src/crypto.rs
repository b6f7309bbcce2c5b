// ABOUTME: Secure random value generation and constant-time secret comparison
// ABOUTME: Codes, token values, and auth_req_ids are all minted through this module
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use ring::rand::{SecureRandom, SystemRandom};
use subtle::ConstantTimeEq;

/// Generate a URL-safe random string from `byte_len` bytes of entropy.
///
/// # Errors
/// Returns an error when the system random source is unavailable.
pub fn random_url_safe(byte_len: usize) -> Result<String> {
    let rng = SystemRandom::new();
    let mut bytes = vec![0u8; byte_len];
    rng.fill(&mut bytes)
        .map_err(|_| anyhow!("system random source unavailable"))?;
    Ok(general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Constant-time equality for secrets and token values.
#[must_use]
pub fn secrets_match(left: &str, right: &str) -> bool {
    left.as_bytes().ct_eq(right.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn random_values_are_unique_and_url_safe() {
        let a = random_url_safe(32).unwrap();
        let b = random_url_safe(32).unwrap();
        assert_ne!(a, b);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn comparison_requires_exact_match() {
        assert!(secrets_match("s3cret", "s3cret"));
        assert!(!secrets_match("s3cret", "s3cret "));
        assert!(!secrets_match("s3cret", "S3cret"));
    }
}
