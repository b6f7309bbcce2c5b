// ABOUTME: ID-token minting and server-key verification for logout hints
// ABOUTME: Signs with the tenant's configured key material (HS256 or RS256)
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use anyhow::{anyhow, Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::{AuthorizationServerConfig, SigningAlg};
use crate::grant::AuthorizationGrant;

/// Claims minted into an ID token
#[derive(Debug, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Issuer
    pub iss: String,
    /// Subject
    pub sub: String,
    /// Audience (client id)
    pub aud: String,
    /// Expiry (unix seconds)
    pub exp: i64,
    /// Issue time (unix seconds)
    pub iat: i64,
    /// Authentication time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_time: Option<i64>,
    /// Replay nonce from the authorization request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Authentication context class reference
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acr: Option<String>,
    /// Authentication method references
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amr: Option<Vec<String>>,
    /// OP session id, enabling RP-initiated logout by hint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,
    /// Access-token hash, when an access token was issued alongside
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at_hash: Option<String>,
    /// Authorization-code hash, when a code was issued alongside
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c_hash: Option<String>,
}

/// Per-response inputs that vary between code, implicit, and hybrid issuance
#[derive(Debug, Default)]
pub struct IdTokenInputs {
    /// Nonce from the authorization request
    pub nonce: Option<String>,
    /// Access token issued alongside, when any
    pub access_token: Option<String>,
    /// Authorization code issued alongside, when any
    pub authorization_code: Option<String>,
}

/// OIDC core §3.1.3.6 half-hash: base64url of the left half of SHA-256
fn half_hash(value: &str) -> String {
    use base64::{engine::general_purpose, Engine as _};
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(value.as_bytes());
    general_purpose::URL_SAFE_NO_PAD.encode(&digest[..16])
}

fn encoding_key(config: &AuthorizationServerConfig) -> Result<(Algorithm, EncodingKey)> {
    let keys = &config.signing;
    match keys.alg {
        SigningAlg::HS256 => {
            let secret = keys
                .hmac_secret
                .as_deref()
                .ok_or_else(|| anyhow!("HS256 configured without hmac_secret"))?;
            Ok((Algorithm::HS256, EncodingKey::from_secret(secret.as_bytes())))
        }
        SigningAlg::RS256 => {
            let pem = keys
                .rsa_private_key_pem
                .as_deref()
                .ok_or_else(|| anyhow!("RS256 configured without rsa_private_key_pem"))?;
            let key = EncodingKey::from_rsa_pem(pem.as_bytes())
                .context("rsa_private_key_pem is not a valid PEM key")?;
            Ok((Algorithm::RS256, key))
        }
    }
}

/// Verification key for tokens this tenant signed.
///
/// # Errors
/// Returns an error when the configured key material is absent or malformed.
pub fn decoding_key(config: &AuthorizationServerConfig) -> Result<(Algorithm, DecodingKey)> {
    let keys = &config.signing;
    match keys.alg {
        SigningAlg::HS256 => {
            let secret = keys
                .hmac_secret
                .as_deref()
                .ok_or_else(|| anyhow!("HS256 configured without hmac_secret"))?;
            Ok((Algorithm::HS256, DecodingKey::from_secret(secret.as_bytes())))
        }
        SigningAlg::RS256 => {
            let pem = keys
                .rsa_public_key_pem
                .as_deref()
                .ok_or_else(|| anyhow!("RS256 configured without rsa_public_key_pem"))?;
            let key = DecodingKey::from_rsa_pem(pem.as_bytes())
                .context("rsa_public_key_pem is not a valid PEM key")?;
            Ok((Algorithm::RS256, key))
        }
    }
}

/// Mint a signed ID token for the grant.
///
/// # Errors
/// Returns an error when the grant has no user or the signing key is
/// unusable.
pub fn mint_id_token(
    config: &AuthorizationServerConfig,
    grant: &AuthorizationGrant,
    inputs: &IdTokenInputs,
) -> Result<String> {
    let user = grant
        .user
        .as_ref()
        .ok_or_else(|| anyhow!("cannot mint an id token without a user"))?;
    let now = Utc::now();
    let sid = grant
        .custom_properties
        .get("sid")
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned);
    let claims = IdTokenClaims {
        iss: config.issuer.clone(),
        sub: user.sub.clone(),
        aud: grant.client_id.clone(),
        exp: (now + Duration::seconds(config.id_token_ttl_secs)).timestamp(),
        iat: now.timestamp(),
        auth_time: grant
            .authentication
            .as_ref()
            .map(|authentication| authentication.time.timestamp()),
        nonce: inputs.nonce.clone(),
        acr: grant
            .authentication
            .as_ref()
            .and_then(|authentication| authentication.acr.clone()),
        amr: grant
            .authentication
            .as_ref()
            .filter(|authentication| !authentication.methods.is_empty())
            .map(|authentication| authentication.methods.clone()),
        sid,
        at_hash: inputs.access_token.as_deref().map(half_hash),
        c_hash: inputs.authorization_code.as_deref().map(half_hash),
    };

    let (alg, key) = encoding_key(config)?;
    let mut header = Header::new(alg);
    header.kid = config.signing.kid.clone();
    jsonwebtoken::encode(&header, &claims, &key).context("id token signing failed")
}

/// Verify a JWS this tenant issued and return its claims.
///
/// Expired tokens are accepted when `allow_expired` is set; logout hints may
/// legitimately be past their `exp`.
///
/// # Errors
/// Returns an error on signature or issuer mismatch.
pub fn verify_own_jws(
    config: &AuthorizationServerConfig,
    token: &str,
    allow_expired: bool,
) -> Result<IdTokenClaims> {
    let (alg, key) = decoding_key(config)?;
    let mut validation = Validation::new(alg);
    validation.set_issuer(&[config.issuer.as_str()]);
    validation.validate_aud = false;
    if allow_expired {
        validation.validate_exp = false;
    }
    let data = jsonwebtoken::decode::<IdTokenClaims>(token, &key, &validation)
        .context("id token verification failed")?;
    Ok(data.claims)
}
