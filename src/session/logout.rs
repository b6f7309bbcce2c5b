// ABOUTME: RP-initiated logout: hint classification, verification, session termination
// ABOUTME: Asymmetric JWE hints always fail descriptively; the server cannot hold client private keys
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce};
use base64::{engine::general_purpose, Engine as _};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use super::OpSession;
use crate::config::{ClientConfig, ConfigError, ConfigResolver};
use crate::oauth::response::{append_response_params, ResponseMode};
use crate::storage::OpSessionRepository;
use crate::tenant::TenantId;
use crate::token::id_token::{verify_own_jws, IdTokenClaims};

/// Raw logout request parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogoutRequest {
    /// Required previously issued ID token identifying the session
    pub id_token_hint: Option<String>,
    /// Where to send the user agent afterwards; must be registered
    pub post_logout_redirect_uri: Option<String>,
    /// Opaque client state, echoed on the redirect
    pub state: Option<String>,
    /// Initiating client, when the RP names itself explicitly
    pub client_id: Option<String>,
}

/// Successful logout outcome
#[derive(Debug)]
pub struct LogoutResponse {
    /// Redirect location when a registered URI was supplied; `None` means a
    /// bare 200
    pub redirect_location: Option<String>,
    /// The terminated session, when one was found for the hint's `sid`
    pub terminated_session: Option<OpSession>,
}

/// Logout validation failures; every variant is a client-visible 400 except
/// `ServerError`.
#[derive(Debug, thiserror::Error)]
pub enum LogoutError {
    /// Anonymous logout is not allowed
    #[error("id_token_hint is required")]
    MissingHint,
    /// Asymmetric key management cannot be decrypted server-side
    #[error("unsupported id_token_hint encryption ({0}): the server cannot hold the client's private decryption key")]
    UnsupportedEncryption(String),
    /// Signature, structure, or issuer problems
    #[error("id_token_hint rejected: {0}")]
    InvalidHint(String),
    /// `client_id` parameter and hint audience disagree
    #[error("client_id does not match the id_token_hint audience")]
    ClientMismatch,
    /// The redirect target is not in the client's registered set
    #[error("post_logout_redirect_uri is not registered for this client")]
    UnregisteredRedirectUri,
    /// Other request problems (unknown client, missing parameters)
    #[error("{0}")]
    BadRequest(String),
    /// Unanticipated failure
    #[error("server error")]
    ServerError(#[from] anyhow::Error),
}

impl LogoutError {
    /// HTTP status for the error page
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ServerError(_) => 500,
            _ => 400,
        }
    }
}

impl From<ConfigError> for LogoutError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ServerNotFound(_) | ConfigError::ClientNotFound { .. } => {
                Self::BadRequest(err.to_string())
            }
            ConfigError::Store(inner) => Self::ServerError(inner),
        }
    }
}

/// Cryptographic shape of a presented hint
enum HintShape<'a> {
    /// Three segments: signed only
    Jws(&'a str),
    /// Five segments: encrypted; holds the compact parts
    Jwe([&'a str; 5]),
}

fn classify_hint(hint: &str) -> Result<HintShape<'_>, LogoutError> {
    let parts: Vec<&str> = hint.split('.').collect();
    match parts.as_slice() {
        [_, _, _] => Ok(HintShape::Jws(hint)),
        [a, b, c, d, e] => Ok(HintShape::Jwe([a, b, c, d, e])),
        _ => Err(LogoutError::InvalidHint(
            "not a JWS or JWE compact serialization".to_owned(),
        )),
    }
}

#[derive(Debug, Deserialize)]
struct JweHeader {
    alg: String,
    enc: String,
}

/// Decrypt a `dir`-keyed JWE whose content key is derived from the client
/// secret (SHA-256), yielding the inner JWS.
fn decrypt_symmetric_jwe(parts: [&str; 5], client: &ClientConfig) -> Result<String, LogoutError> {
    let [header_b64, encrypted_key_b64, iv_b64, ciphertext_b64, tag_b64] = parts;

    let header_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(header_b64)
        .map_err(|_| LogoutError::InvalidHint("JWE header is not valid base64url".to_owned()))?;
    let header: JweHeader = serde_json::from_slice(&header_bytes)
        .map_err(|_| LogoutError::InvalidHint("JWE header is not valid JSON".to_owned()))?;

    // Direct symmetric encryption is the only key management the server can
    // perform without holding client private keys
    if header.alg != "dir" {
        return Err(LogoutError::UnsupportedEncryption(header.alg));
    }
    if header.enc != "A256GCM" {
        return Err(LogoutError::UnsupportedEncryption(header.enc));
    }
    if !encrypted_key_b64.is_empty() {
        return Err(LogoutError::InvalidHint(
            "dir JWE must not carry an encrypted key".to_owned(),
        ));
    }

    let secret = client.client_secret.as_deref().ok_or_else(|| {
        LogoutError::BadRequest("client has no secret to derive a decryption key from".to_owned())
    })?;
    let key_bytes = Sha256::digest(secret.as_bytes());
    let key = Key::<Aes256Gcm>::from_slice(&key_bytes);
    let cipher = Aes256Gcm::new(key);

    let decode = |segment: &str, what: &str| {
        general_purpose::URL_SAFE_NO_PAD
            .decode(segment)
            .map_err(|_| LogoutError::InvalidHint(format!("JWE {what} is not valid base64url")))
    };
    let iv = decode(iv_b64, "iv")?;
    if iv.len() != 12 {
        return Err(LogoutError::InvalidHint("JWE iv must be 96 bits".to_owned()));
    }
    let mut message = decode(ciphertext_b64, "ciphertext")?;
    message.extend(decode(tag_b64, "tag")?);

    let plaintext = cipher
        .decrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: &message,
                aad: header_b64.as_bytes(),
            },
        )
        .map_err(|_| LogoutError::InvalidHint("JWE decryption failed".to_owned()))?;
    String::from_utf8(plaintext)
        .map_err(|_| LogoutError::InvalidHint("JWE payload is not UTF-8".to_owned()))
}

/// RP-initiated logout handler.
pub struct LogoutHandler {
    config_resolver: Arc<ConfigResolver>,
    session_repo: Arc<dyn OpSessionRepository>,
}

impl LogoutHandler {
    /// Wire the handler to its collaborators
    pub fn new(
        config_resolver: Arc<ConfigResolver>,
        session_repo: Arc<dyn OpSessionRepository>,
    ) -> Self {
        Self {
            config_resolver,
            session_repo,
        }
    }

    /// Execute one logout request.
    ///
    /// Step order is load-bearing: the hint is classified and verified, the
    /// client is resolved and cross-checked, the redirect target is validated
    /// against the registration, and only then is the session terminated and
    /// a redirect constructed.
    ///
    /// # Errors
    /// [`LogoutError`] per failed step; nothing is terminated on failure.
    pub async fn handle(
        &self,
        tenant: &TenantId,
        request: &LogoutRequest,
    ) -> Result<LogoutResponse, LogoutError> {
        let hint = request.id_token_hint.as_deref().ok_or(LogoutError::MissingHint)?;
        let server_config = self.config_resolver.server_config(tenant).await?;

        // (1) classify + (2) verify against server keys and issuer
        let claims: IdTokenClaims = match classify_hint(hint)? {
            HintShape::Jws(jws) => verify_own_jws(&server_config, jws, true)
                .map_err(|e| LogoutError::InvalidHint(format!("{e:#}")))?,
            HintShape::Jwe(parts) => {
                // Decryption needs the client secret, so the client must be
                // named explicitly before the payload is readable
                let client_id = request.client_id.as_deref().ok_or_else(|| {
                    LogoutError::BadRequest(
                        "client_id is required for an encrypted id_token_hint".to_owned(),
                    )
                })?;
                let client_config = self.config_resolver.client_config(tenant, client_id).await?;
                let inner = decrypt_symmetric_jwe(parts, &client_config)?;
                verify_own_jws(&server_config, &inner, true)
                    .map_err(|e| LogoutError::InvalidHint(format!("{e:#}")))?
            }
        };

        // (3) resolve the client from the parameter and/or the hint audience
        let client_id = match (request.client_id.as_deref(), claims.aud.as_str()) {
            (Some(param), aud) if !aud.is_empty() => {
                if param != aud {
                    return Err(LogoutError::ClientMismatch);
                }
                param
            }
            (Some(param), _) => param,
            (None, aud) if !aud.is_empty() => aud,
            (None, _) => {
                return Err(LogoutError::BadRequest(
                    "neither client_id nor an audience in the hint is present".to_owned(),
                ))
            }
        };
        let client_config = self.config_resolver.client_config(tenant, client_id).await?;

        // (4) redirect target must match the registration exactly
        if let Some(uri) = request.post_logout_redirect_uri.as_deref() {
            if !client_config.is_registered_post_logout_redirect_uri(uri) {
                return Err(LogoutError::UnregisteredRedirectUri);
            }
        }

        // (5) terminate the OP session the hint names; absent sid or an
        // already-gone session is not an error
        let terminated_session = match claims.sid.as_deref() {
            Some(sid) => self.session_repo.terminate(tenant, sid).await?,
            None => None,
        };
        if let Some(session) = &terminated_session {
            tracing::info!(
                tenant = %tenant,
                client_id,
                sid = %session.sid,
                "OP session terminated by RP-initiated logout"
            );
        }

        // (6) redirect carrying state, or a bare 200
        let redirect_location = request.post_logout_redirect_uri.as_deref().map(|uri| {
            match request.state.as_deref() {
                Some(state) => {
                    append_response_params(uri, ResponseMode::Query, &[("state", state)])
                }
                None => uri.to_owned(),
            }
        });

        Ok(LogoutResponse {
            redirect_location,
            terminated_session,
        })
    }
}

/// Logout entry point with wire mapping.
pub struct LogoutProtocol {
    handler: LogoutHandler,
}

/// Wire outcome of a logout call
#[derive(Debug)]
pub enum LogoutOutcome {
    /// Redirect the user agent to the registered post-logout URI
    Redirect {
        /// Full redirect location
        location: String,
    },
    /// Logout completed without a redirect target
    Done,
    /// Validation failed; render the description with a 400
    BadRequest {
        /// Human-readable failure description
        error_description: String,
    },
    /// Unanticipated failure
    ServerError,
}

impl LogoutProtocol {
    /// Wrap a wired handler
    #[must_use]
    pub fn new(handler: LogoutHandler) -> Self {
        Self { handler }
    }

    /// `GET/POST /logout`
    pub async fn logout(&self, tenant: &TenantId, request: &LogoutRequest) -> LogoutOutcome {
        match self.handler.handle(tenant, request).await {
            Ok(response) => match response.redirect_location {
                Some(location) => LogoutOutcome::Redirect { location },
                None => LogoutOutcome::Done,
            },
            Err(LogoutError::ServerError(err)) => {
                tracing::error!(error = %format!("{err:#}"), "logout failed unexpectedly");
                LogoutOutcome::ServerError
            }
            Err(err) => {
                tracing::warn!(tenant = %tenant, error = %err, "logout request rejected");
                LogoutOutcome::BadRequest {
                    error_description: err.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;

    #[test]
    fn shape_classification_counts_segments() {
        assert!(matches!(classify_hint("a.b.c"), Ok(HintShape::Jws(_))));
        assert!(matches!(classify_hint("a.b.c.d.e"), Ok(HintShape::Jwe(_))));
        assert!(classify_hint("a.b").is_err());
        assert!(classify_hint("a.b.c.d").is_err());
    }

    #[test]
    fn asymmetric_jwe_fails_without_decryption_attempt() {
        let header =
            general_purpose::URL_SAFE_NO_PAD.encode(r#"{"alg":"RSA-OAEP","enc":"A256GCM"}"#);
        let client = test_client();
        let parts = [header.as_str(), "ek", "iv", "ct", "tag"];
        match decrypt_symmetric_jwe(parts, &client) {
            Err(LogoutError::UnsupportedEncryption(alg)) => assert_eq!(alg, "RSA-OAEP"),
            other => panic!("expected UnsupportedEncryption, got {other:?}"),
        }
    }

    #[test]
    fn dir_jwe_round_trips_with_derived_key() {
        let client = test_client();
        let secret = client.client_secret.clone().unwrap();
        let inner_jws = "eyJh.bGci.c2ln";

        let header_b64 =
            general_purpose::URL_SAFE_NO_PAD.encode(r#"{"alg":"dir","enc":"A256GCM"}"#);
        let key_bytes = Sha256::digest(secret.as_bytes());
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key_bytes));
        let iv = [7u8; 12];
        let sealed = cipher
            .encrypt(
                Nonce::from_slice(&iv),
                Payload {
                    msg: inner_jws.as_bytes(),
                    aad: header_b64.as_bytes(),
                },
            )
            .unwrap();
        let (ciphertext, tag) = sealed.split_at(sealed.len() - 16);
        let iv_b64 = general_purpose::URL_SAFE_NO_PAD.encode(iv);
        let ct_b64 = general_purpose::URL_SAFE_NO_PAD.encode(ciphertext);
        let tag_b64 = general_purpose::URL_SAFE_NO_PAD.encode(tag);
        let parts = [
            header_b64.as_str(),
            "",
            iv_b64.as_str(),
            ct_b64.as_str(),
            tag_b64.as_str(),
        ];
        let decrypted = decrypt_symmetric_jwe(parts, &client).unwrap();
        assert_eq!(decrypted, inner_jws);
    }

    fn test_client() -> ClientConfig {
        use crate::ciba::CibaDeliveryMode;
        use crate::config::ApplicationType;
        use crate::oauth::response::ResponseType;
        use crate::token::{ClientAuthMethod, GrantType};
        ClientConfig {
            client_id: "client-1".to_owned(),
            client_secret: Some("correct-horse-battery-staple".to_owned()),
            client_name: "Test".to_owned(),
            redirect_uris: vec!["https://rp.example.com/cb".to_owned()],
            post_logout_redirect_uris: vec!["https://rp.example.com/bye".to_owned()],
            grant_types: vec![GrantType::AuthorizationCode],
            response_types: vec![ResponseType::Code],
            scopes: vec!["openid".to_owned()],
            token_endpoint_auth_method: ClientAuthMethod::ClientSecretBasic,
            application_type: ApplicationType::Web,
            jwks: None,
            tls_client_auth_subject_dn: None,
            backchannel_token_delivery_mode: CibaDeliveryMode::Poll,
            backchannel_client_notification_endpoint: None,
            access_token_ttl_secs: None,
            refresh_token_ttl_secs: None,
            refresh_token_rotation: None,
            enabled: true,
        }
    }
}
