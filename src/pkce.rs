// ABOUTME: PKCE (RFC 7636) challenge parsing and code_verifier validation
// ABOUTME: Binds an authorization code to the client that initiated the request
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::secrets_match;

/// `code_challenge_method` values (RFC 7636 §4.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    /// Challenge is the verifier itself
    #[serde(rename = "plain")]
    Plain,
    /// Challenge is BASE64URL(SHA256(verifier))
    #[serde(rename = "S256")]
    S256,
}

impl CodeChallengeMethod {
    /// Parse the wire value; anything other than `plain` / `S256` is rejected
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "plain" => Some(Self::Plain),
            "S256" => Some(Self::S256),
            _ => None,
        }
    }

    /// Wire representation
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::S256 => "S256",
        }
    }
}

/// Verifier and challenge length lower bound from RFC 7636 §4.1/§4.2
pub const MIN_CHALLENGE_LEN: usize = 43;
/// Upper bound shared by verifier and challenge
pub const MAX_CHALLENGE_LEN: usize = 128;

/// Whether a `code_challenge` value is within the RFC length bounds.
#[must_use]
pub fn challenge_format_valid(challenge: &str) -> bool {
    (MIN_CHALLENGE_LEN..=MAX_CHALLENGE_LEN).contains(&challenge.len())
}

/// Derive the S256 challenge for a verifier.
#[must_use]
pub fn derive_s256_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

/// Check a `code_verifier` against the stored challenge.
///
/// The comparison is constant-time in both modes; a verifier outside the RFC
/// length bounds fails without hashing.
#[must_use]
pub fn verify(verifier: &str, challenge: &str, method: CodeChallengeMethod) -> bool {
    if !(MIN_CHALLENGE_LEN..=MAX_CHALLENGE_LEN).contains(&verifier.len()) {
        return false;
    }
    match method {
        CodeChallengeMethod::Plain => secrets_match(verifier, challenge),
        CodeChallengeMethod::S256 => secrets_match(&derive_s256_challenge(verifier), challenge),
    }
}
