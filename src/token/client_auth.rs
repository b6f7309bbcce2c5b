// ABOUTME: Token endpoint client authentication across basic, post, JWT assertion, and mTLS
// ABOUTME: Every method resolves to the registered client or fails as invalid_client
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use base64::{engine::general_purpose, Engine as _};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use super::error::TokenError;
use super::ClientAuthMethod;
use crate::config::{AuthorizationServerConfig, ClientConfig};
use crate::crypto::secrets_match;

/// RFC 7523 assertion type for client authentication
pub const JWT_BEARER_CLIENT_ASSERTION: &str =
    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Raw client credentials as the transport adapter collected them.
#[derive(Debug, Clone, Default)]
pub struct ClientCredentialsInput {
    /// `Authorization` header value, when present
    pub authorization_header: Option<String>,
    /// `client_id` form parameter
    pub client_id: Option<String>,
    /// `client_secret` form parameter
    pub client_secret: Option<String>,
    /// `client_assertion` form parameter
    pub client_assertion: Option<String>,
    /// `client_assertion_type` form parameter
    pub client_assertion_type: Option<String>,
    /// Subject DN of the transport-verified client certificate
    pub mtls_subject_dn: Option<String>,
}

impl ClientCredentialsInput {
    /// Basic-auth credentials for tests and simple adapters
    #[must_use]
    pub fn basic(client_id: &str, client_secret: &str) -> Self {
        let encoded = general_purpose::STANDARD.encode(format!("{client_id}:{client_secret}"));
        Self {
            authorization_header: Some(format!("Basic {encoded}")),
            ..Self::default()
        }
    }

    /// The client id this request claims to act as, before any verification.
    ///
    /// Used only to resolve the client configuration; authentication decides
    /// whether the claim holds.
    #[must_use]
    pub fn claimed_client_id(&self) -> Option<String> {
        if let Some((id, _)) = self.decode_basic() {
            return Some(id);
        }
        if let Some(id) = &self.client_id {
            return Some(id.clone());
        }
        self.client_assertion
            .as_deref()
            .and_then(unverified_assertion_issuer)
    }

    fn decode_basic(&self) -> Option<(String, String)> {
        let header = self.authorization_header.as_deref()?;
        let encoded = header.strip_prefix("Basic ")?;
        let decoded = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;
        let (id, secret) = decoded.split_once(':')?;
        let id = urlencoding::decode(id).ok()?.into_owned();
        let secret = urlencoding::decode(secret).ok()?.into_owned();
        Some((id, secret))
    }
}

/// Outcome of client authentication
#[derive(Debug, Clone)]
pub struct AuthenticatedClient {
    /// Authenticated client id
    pub client_id: String,
    /// Method that succeeded
    pub method: ClientAuthMethod,
}

#[derive(Debug, Deserialize)]
struct ClientAssertionClaims {
    iss: String,
    sub: String,
}

#[derive(Debug, Deserialize)]
struct Jwks {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kty: String,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

/// Authenticate the request against the client's registered method.
///
/// # Errors
/// `invalid_client` with a descriptive reason; the caller maps it to 401.
pub fn authenticate(
    input: &ClientCredentialsInput,
    client: &ClientConfig,
    server: &AuthorizationServerConfig,
) -> Result<AuthenticatedClient, TokenError> {
    let method = client.token_endpoint_auth_method;
    if !server
        .token_endpoint_auth_methods_supported
        .contains(&method)
    {
        return Err(TokenError::invalid_client(format!(
            "token_endpoint_auth_method {} is not accepted by this tenant",
            method.as_str()
        )));
    }

    match method {
        ClientAuthMethod::ClientSecretBasic => {
            let (id, secret) = input
                .decode_basic()
                .ok_or_else(|| TokenError::invalid_client("missing or malformed Basic header"))?;
            verify_secret(client, &id, &secret)?;
        }
        ClientAuthMethod::ClientSecretPost => {
            let id = input
                .client_id
                .as_deref()
                .ok_or_else(|| TokenError::invalid_client("client_id is required"))?;
            let secret = input
                .client_secret
                .as_deref()
                .ok_or_else(|| TokenError::invalid_client("client_secret is required"))?;
            verify_secret(client, id, secret)?;
        }
        ClientAuthMethod::ClientSecretJwt => {
            let secret = registered_secret(client)?;
            let key = DecodingKey::from_secret(secret.as_bytes());
            verify_assertion(input, client, server, Algorithm::HS256, &key)?;
        }
        ClientAuthMethod::PrivateKeyJwt => {
            let key = assertion_decoding_key(client)?;
            verify_assertion(input, client, server, Algorithm::RS256, &key)?;
        }
        ClientAuthMethod::TlsClientAuth => {
            let presented = input.mtls_subject_dn.as_deref().ok_or_else(|| {
                TokenError::invalid_client("no client certificate was presented")
            })?;
            let registered = client.tls_client_auth_subject_dn.as_deref().ok_or_else(|| {
                TokenError::invalid_client("client has no registered certificate subject")
            })?;
            if !secrets_match(presented, registered) {
                return Err(TokenError::invalid_client(
                    "client certificate subject does not match registration",
                ));
            }
        }
        ClientAuthMethod::None => {
            // Public client: PKCE carries the proof; the id must still match
            let id = input
                .client_id
                .as_deref()
                .ok_or_else(|| TokenError::invalid_client("client_id is required"))?;
            if id != client.client_id {
                return Err(TokenError::invalid_client("unknown client_id"));
            }
        }
    }

    Ok(AuthenticatedClient {
        client_id: client.client_id.clone(),
        method,
    })
}

fn registered_secret(client: &ClientConfig) -> Result<&str, TokenError> {
    client
        .client_secret
        .as_deref()
        .ok_or_else(|| TokenError::invalid_client("client has no registered secret"))
}

fn verify_secret(client: &ClientConfig, id: &str, secret: &str) -> Result<(), TokenError> {
    let registered = registered_secret(client)?;
    if id != client.client_id || !secrets_match(secret, registered) {
        return Err(TokenError::invalid_client("client authentication failed"));
    }
    Ok(())
}

/// Verification key from the client's registered JWKS.
pub(super) fn assertion_decoding_key(client: &ClientConfig) -> Result<DecodingKey, TokenError> {
    let raw = client
        .jwks
        .as_deref()
        .ok_or_else(|| TokenError::invalid_client("client has no registered JWKS"))?;
    let jwks: Jwks = serde_json::from_str(raw)
        .map_err(|e| TokenError::invalid_client(format!("registered JWKS is malformed: {e}")))?;
    let rsa = jwks
        .keys
        .iter()
        .find(|key| key.kty == "RSA" && key.n.is_some() && key.e.is_some())
        .ok_or_else(|| TokenError::invalid_client("registered JWKS contains no usable RSA key"))?;
    let (Some(n), Some(e)) = (rsa.n.as_deref(), rsa.e.as_deref()) else {
        return Err(TokenError::invalid_client(
            "registered JWKS contains no usable RSA key",
        ));
    };
    DecodingKey::from_rsa_components(n, e)
        .map_err(|e| TokenError::invalid_client(format!("registered RSA key is unusable: {e}")))
}

fn verify_assertion(
    input: &ClientCredentialsInput,
    client: &ClientConfig,
    server: &AuthorizationServerConfig,
    alg: Algorithm,
    key: &DecodingKey,
) -> Result<(), TokenError> {
    let assertion_type = input.client_assertion_type.as_deref().unwrap_or_default();
    if assertion_type != JWT_BEARER_CLIENT_ASSERTION {
        return Err(TokenError::invalid_client(
            "client_assertion_type must be the jwt-bearer assertion type",
        ));
    }
    let assertion = input
        .client_assertion
        .as_deref()
        .ok_or_else(|| TokenError::invalid_client("client_assertion is required"))?;

    let mut validation = Validation::new(alg);
    validation.set_audience(&[server.issuer.as_str()]);
    let data = jsonwebtoken::decode::<ClientAssertionClaims>(assertion, key, &validation)
        .map_err(|e| TokenError::invalid_client(format!("client assertion rejected: {e}")))?;
    if data.claims.iss != client.client_id || data.claims.sub != client.client_id {
        return Err(TokenError::invalid_client(
            "client assertion iss/sub must equal the client_id",
        ));
    }
    Ok(())
}

/// Read `iss` from an assertion without verifying it, for client resolution.
fn unverified_assertion_issuer(assertion: &str) -> Option<String> {
    let payload = assertion.split('.').nth(1)?;
    let bytes = general_purpose::URL_SAFE_NO_PAD.decode(payload).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    value
        .get("iss")
        .and_then(serde_json::Value::as_str)
        .map(ToOwned::to_owned)
}
