// ABOUTME: Response types, redirect construction, and per-response_type response creators
// ABOUTME: Each creator computes exactly the artifacts its response_type requires
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::context::AuthorizeContext;
use super::error::OAuthRequestError;
use crate::crypto::random_url_safe;
use crate::grant::AuthorizationCodeGrant;
use crate::token::id_token::{mint_id_token, IdTokenInputs};
use crate::token::{mint_access_token, AccessToken, OAuthToken};

/// `response_type` values, as a closed set.
///
/// Dispatch is an exhaustive match; adding a response type means adding a
/// variant and a creator arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseType {
    /// `code`
    #[serde(rename = "code")]
    Code,
    /// `token`
    #[serde(rename = "token")]
    Token,
    /// `id_token`
    #[serde(rename = "id_token")]
    IdToken,
    /// `code token`
    #[serde(rename = "code token")]
    CodeToken,
    /// `code id_token`
    #[serde(rename = "code id_token")]
    CodeIdToken,
    /// `id_token token`
    #[serde(rename = "id_token token")]
    TokenIdToken,
    /// `code id_token token`
    #[serde(rename = "code id_token token")]
    CodeTokenIdToken,
}

impl ResponseType {
    /// Parse the space-separated wire value, order-insensitively
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let mut code = false;
        let mut token = false;
        let mut id_token = false;
        for part in value.split_ascii_whitespace() {
            match part {
                "code" if !code => code = true,
                "token" if !token => token = true,
                "id_token" if !id_token => id_token = true,
                _ => return None,
            }
        }
        match (code, token, id_token) {
            (true, false, false) => Some(Self::Code),
            (false, true, false) => Some(Self::Token),
            (false, false, true) => Some(Self::IdToken),
            (true, true, false) => Some(Self::CodeToken),
            (true, false, true) => Some(Self::CodeIdToken),
            (false, true, true) => Some(Self::TokenIdToken),
            (true, true, true) => Some(Self::CodeTokenIdToken),
            (false, false, false) => None,
        }
    }

    /// Whether the response carries an authorization code
    #[must_use]
    pub fn includes_code(self) -> bool {
        matches!(
            self,
            Self::Code | Self::CodeToken | Self::CodeIdToken | Self::CodeTokenIdToken
        )
    }

    /// Whether the response carries an access token
    #[must_use]
    pub fn includes_token(self) -> bool {
        matches!(
            self,
            Self::Token | Self::CodeToken | Self::TokenIdToken | Self::CodeTokenIdToken
        )
    }

    /// Whether the response carries an ID token
    #[must_use]
    pub fn includes_id_token(self) -> bool {
        matches!(
            self,
            Self::IdToken | Self::CodeIdToken | Self::TokenIdToken | Self::CodeTokenIdToken
        )
    }

    /// Default response mode per OAuth 2.0 multiple-response-types:
    /// query for pure code, fragment whenever a token or ID token rides along.
    #[must_use]
    pub fn default_response_mode(self) -> ResponseMode {
        if self == Self::Code {
            ResponseMode::Query
        } else {
            ResponseMode::Fragment
        }
    }
}

/// Where response parameters land on the redirect URI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    /// Query component
    Query,
    /// Fragment component
    Fragment,
}

/// Append encoded parameters to a redirect URI in the given mode.
///
/// The base URI was validated against the client registration before this is
/// ever called; existing query strings are preserved.
#[must_use]
pub fn append_response_params(
    redirect_uri: &str,
    mode: ResponseMode,
    params: &[(&str, &str)],
) -> String {
    let encoded = params
        .iter()
        .map(|(key, value)| format!("{key}={}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join("&");
    let separator = match mode {
        ResponseMode::Query => {
            if redirect_uri.contains('?') {
                '&'
            } else {
                '?'
            }
        }
        ResponseMode::Fragment => '#',
    };
    format!("{redirect_uri}{separator}{encoded}")
}

/// Successful authorization response, pre-wire
#[derive(Debug, Clone)]
pub struct AuthorizationResponse {
    /// Validated redirect target
    pub redirect_uri: String,
    /// Parameter placement
    pub response_mode: ResponseMode,
    /// Authorization code, when the response type carries one
    pub code: Option<String>,
    /// Access-token value, when issued synchronously
    pub access_token: Option<String>,
    /// Access-token lifetime in seconds
    pub expires_in: Option<i64>,
    /// ID token, when the response type carries one
    pub id_token: Option<String>,
    /// Client state, echoed back
    pub state: Option<String>,
}

impl AuthorizationResponse {
    /// Whether a code is being delivered
    #[must_use]
    pub fn has_code(&self) -> bool {
        self.code.is_some()
    }

    /// Whether an access token is being delivered
    #[must_use]
    pub fn has_access_token(&self) -> bool {
        self.access_token.is_some()
    }

    /// Build the redirect location carrying the response parameters
    #[must_use]
    pub fn redirect_location(&self) -> String {
        let expires_in = self.expires_in.map(|v| v.to_string());
        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(code) = &self.code {
            params.push(("code", code));
        }
        if let Some(token) = &self.access_token {
            params.push(("access_token", token));
            params.push(("token_type", "Bearer"));
            if let Some(expires_in) = expires_in.as_deref() {
                params.push(("expires_in", expires_in));
            }
        }
        if let Some(id_token) = &self.id_token {
            params.push(("id_token", id_token));
        }
        if let Some(state) = &self.state {
            params.push(("state", state));
        }
        append_response_params(&self.redirect_uri, self.response_mode, &params)
    }
}

/// Everything an authorize decision produced: the wire response plus the
/// records the handler must persist.
#[derive(Debug)]
pub struct CreatedAuthorization {
    /// Wire response
    pub response: AuthorizationResponse,
    /// Code grant to persist, when the response carries a code
    pub code_grant: Option<AuthorizationCodeGrant>,
    /// Token record to persist, when an access token was minted synchronously
    pub token: Option<OAuthToken>,
}

/// Dispatch on the request's response type and compute exactly the artifacts
/// it requires.
///
/// # Errors
/// Redirectable `server_error` when minting fails (the redirect target was
/// validated at request time).
pub fn create_authorization_response(
    context: &AuthorizeContext,
) -> Result<CreatedAuthorization, OAuthRequestError> {
    let request = &context.request;
    let response_type = request.response_type;
    let grant = context.authorize();

    let server_error = |description: String| OAuthRequestError::Redirectable {
        redirect_uri: request.redirect_uri.clone(),
        response_mode: context.response_mode(),
        error: "server_error",
        description,
        state: request.state.clone(),
    };

    let mut code = None;
    let mut code_grant = None;
    if response_type.includes_code() {
        let value = random_url_safe(32)
            .map_err(|e| server_error(format!("authorization code generation failed: {e}")))?;
        code_grant = Some(AuthorizationCodeGrant {
            code: value.clone(),
            authorization_request_id: request.id,
            grant: grant.clone(),
            redirect_uri: request.redirect_uri.clone(),
            code_challenge: request.code_challenge.clone(),
            code_challenge_method: request.code_challenge_method,
            expires_at: Utc::now()
                + Duration::seconds(context.server_config.authorization_code_ttl_secs),
        });
        code = Some(value);
    }

    let mut access_token: Option<AccessToken> = None;
    if response_type.includes_token() {
        let ttl = context
            .client_config
            .access_token_ttl_secs
            .unwrap_or(context.server_config.access_token_ttl_secs);
        access_token = Some(
            mint_access_token(ttl)
                .map_err(|e| server_error(format!("access token generation failed: {e}")))?,
        );
    }

    let mut id_token = None;
    if response_type.includes_id_token() {
        let inputs = IdTokenInputs {
            nonce: request.nonce.clone(),
            access_token: access_token.as_ref().map(|t| t.value.clone()),
            authorization_code: code.clone(),
        };
        id_token = Some(
            mint_id_token(&context.server_config, &grant, &inputs)
                .map_err(|e| server_error(format!("id token generation failed: {e}")))?,
        );
    }

    let token = match &access_token {
        Some(access) => Some(OAuthToken {
            id: Uuid::new_v4(),
            tenant_id: request.tenant_id.clone(),
            grant: grant.clone(),
            access_token: access.clone(),
            // Implicit and hybrid responses never carry refresh tokens
            refresh_token: None,
            id_token: id_token.clone(),
            c_nonce: None,
            c_nonce_expires_in: None,
        }),
        None => None,
    };

    let response = AuthorizationResponse {
        redirect_uri: request.redirect_uri.clone(),
        response_mode: context.response_mode(),
        code,
        access_token: access_token.as_ref().map(|t| t.value.clone()),
        expires_in: access_token.as_ref().map(|t| t.expires_in(Utc::now())),
        id_token,
        state: request.state.clone(),
    };

    Ok(CreatedAuthorization {
        response,
        code_grant,
        token,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_type_parsing_is_order_insensitive() {
        assert_eq!(ResponseType::parse("code"), Some(ResponseType::Code));
        assert_eq!(
            ResponseType::parse("token id_token"),
            Some(ResponseType::TokenIdToken)
        );
        assert_eq!(
            ResponseType::parse("id_token token"),
            Some(ResponseType::TokenIdToken)
        );
        assert_eq!(
            ResponseType::parse("code id_token token"),
            Some(ResponseType::CodeTokenIdToken)
        );
        assert_eq!(ResponseType::parse(""), None);
        assert_eq!(ResponseType::parse("code code"), None);
        assert_eq!(ResponseType::parse("none"), None);
    }

    #[test]
    fn pure_code_uses_query_mode_everything_else_fragment() {
        assert_eq!(
            ResponseType::Code.default_response_mode(),
            ResponseMode::Query
        );
        assert_eq!(
            ResponseType::CodeToken.default_response_mode(),
            ResponseMode::Fragment
        );
        assert_eq!(
            ResponseType::IdToken.default_response_mode(),
            ResponseMode::Fragment
        );
    }

    #[test]
    fn redirect_location_places_params_per_mode() {
        let response = AuthorizationResponse {
            redirect_uri: "https://rp.example.com/cb".to_owned(),
            response_mode: ResponseMode::Query,
            code: Some("abc".to_owned()),
            access_token: None,
            expires_in: None,
            id_token: None,
            state: Some("s t".to_owned()),
        };
        assert_eq!(
            response.redirect_location(),
            "https://rp.example.com/cb?code=abc&state=s%20t"
        );

        let fragment = AuthorizationResponse {
            response_mode: ResponseMode::Fragment,
            ..response
        };
        assert!(fragment
            .redirect_location()
            .starts_with("https://rp.example.com/cb#code=abc"));
    }

    #[test]
    fn existing_query_strings_are_preserved() {
        let location = append_response_params(
            "https://rp.example.com/cb?tenant=a",
            ResponseMode::Query,
            &[("code", "xyz")],
        );
        assert_eq!(location, "https://rp.example.com/cb?tenant=a&code=xyz");
    }
}
