// ABOUTME: Per-grant-type token creation services behind the token endpoint dispatch
// ABOUTME: Each service verifies its grant, issues a credential set, and merges standing consent
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::collections::BTreeSet;
use uuid::Uuid;

use super::context::TokenRequestContext;
use super::error::TokenError;
use super::handler::TokenRequestHandler;
use super::id_token::{mint_id_token, IdTokenInputs};
use super::{mint_access_token, mint_refresh_token, GrantType, OAuthToken};
use crate::ciba::CibaDeliveryMode;
use crate::crypto::{random_url_safe, secrets_match};
use crate::grant::{AuthorizationGrant, CibaGrantStatus};
use crate::identity::{Authentication, User};
use crate::pkce;

/// Inputs an ID token minted at the token endpoint varies on
pub(super) struct IdTokenSeed {
    pub nonce: Option<String>,
    pub code: Option<String>,
}

/// What the credential set being issued should contain
pub(super) struct IssueOptions {
    pub include_refresh: bool,
    pub id_token: Option<IdTokenSeed>,
    pub include_c_nonce: bool,
}

impl TokenRequestHandler {
    /// RFC 6749 §4.1.3: exchange a single-use authorization code.
    pub(super) async fn authorization_code_grant(
        &self,
        ctx: &TokenRequestContext,
    ) -> Result<OAuthToken, TokenError> {
        let code = ctx
            .params
            .code
            .as_deref()
            .ok_or_else(|| TokenError::invalid_request("code is required"))?;
        let redirect_uri = ctx
            .params
            .redirect_uri
            .as_deref()
            .ok_or_else(|| TokenError::invalid_request("redirect_uri is required"))?;

        // Consume-then-verify: the atomic delete is what guarantees
        // exactly-once under concurrent replay; a failed verification leaves
        // the code burned, which is the safe direction.
        let code_grant = self
            .code_grant_repo
            .consume(&ctx.tenant_id, code)
            .await?
            .ok_or_else(|| {
                TokenError::invalid_grant("authorization code not found or already used")
            })?;

        if code_grant.is_expired(Utc::now()) {
            return Err(TokenError::invalid_grant("authorization code has expired"));
        }
        if code_grant.grant.client_id != ctx.client_id() {
            return Err(TokenError::invalid_grant(
                "authorization code was issued to another client",
            ));
        }
        if !secrets_match(redirect_uri, &code_grant.redirect_uri) {
            return Err(TokenError::invalid_grant(
                "redirect_uri does not match the authorization request",
            ));
        }
        match (&code_grant.code_challenge, ctx.params.code_verifier.as_deref()) {
            (Some(challenge), Some(verifier)) => {
                let method = code_grant
                    .code_challenge_method
                    .unwrap_or(pkce::CodeChallengeMethod::Plain);
                if !pkce::verify(verifier, challenge, method) {
                    return Err(TokenError::invalid_grant("PKCE verification failed"));
                }
            }
            (Some(_), None) => {
                return Err(TokenError::invalid_request("code_verifier is required"));
            }
            (None, Some(_)) => {
                return Err(TokenError::invalid_request(
                    "code_verifier was sent but the authorization request carried no code_challenge",
                ));
            }
            (None, None) => {}
        }

        let request = self
            .request_repo
            .find(&ctx.tenant_id, code_grant.authorization_request_id)
            .await?;
        let is_oidc = request
            .as_ref()
            .map_or_else(|| code_grant.grant.has_openid_scope(), |r| r.is_oidc());
        let is_vc = request
            .as_ref()
            .is_some_and(|r| r.is_verifiable_credential_request());
        let nonce = request.as_ref().and_then(|r| r.nonce.clone());

        let token = self
            .issue_and_register(
                ctx,
                code_grant.grant.clone(),
                IssueOptions {
                    include_refresh: true,
                    id_token: is_oidc.then(|| IdTokenSeed {
                        nonce,
                        code: Some(code_grant.code.clone()),
                    }),
                    include_c_nonce: is_vc,
                },
            )
            .await?;

        // The originating request is terminal once its code is exchanged
        self.request_repo
            .delete(&ctx.tenant_id, code_grant.authorization_request_id)
            .await?;
        Ok(token)
    }

    /// RFC 6749 §6: refresh an issued credential set.
    pub(super) async fn refresh_token_grant(
        &self,
        ctx: &TokenRequestContext,
    ) -> Result<OAuthToken, TokenError> {
        let value = ctx
            .params
            .refresh_token
            .as_deref()
            .ok_or_else(|| TokenError::invalid_request("refresh_token is required"))?;

        let stored = self
            .token_repo
            .find_by_refresh_token(&ctx.tenant_id, value)
            .await?
            .ok_or_else(|| TokenError::invalid_grant("refresh token not found"))?;
        let refresh = stored
            .refresh_token
            .as_ref()
            .ok_or_else(|| TokenError::invalid_grant("refresh token not found"))?;

        if stored.grant.client_id != ctx.client_id() {
            return Err(TokenError::invalid_grant(
                "refresh token was issued to another client",
            ));
        }
        if refresh.revoked {
            return Err(TokenError::invalid_grant("refresh token has been revoked"));
        }
        if refresh.is_expired(Utc::now()) {
            return Err(TokenError::invalid_grant("refresh token has expired"));
        }

        // Optional scope narrowing; widening is refused
        let scopes = match requested_scopes(ctx) {
            None => stored.grant.scopes.clone(),
            Some(requested) => {
                if !stored.grant.covers_scopes(requested.iter().map(String::as_str)) {
                    return Err(TokenError::invalid_scope(
                        "requested scope exceeds the originally granted scope",
                    ));
                }
                requested
            }
        };
        let mut grant = stored.grant.clone();
        grant.scopes = scopes;
        grant.grant_type = GrantType::RefreshToken;

        let token = if ctx.rotates_refresh_tokens() {
            // Old refresh value dies with rotation; its access token keeps
            // its natural expiry
            self.token_repo
                .update(&ctx.tenant_id, &stored.refresh_revoked())
                .await?;
            self.issue_and_register(
                ctx,
                grant,
                IssueOptions {
                    include_refresh: true,
                    id_token: None,
                    include_c_nonce: false,
                },
            )
            .await?
        } else {
            let access = mint_access_token(ctx.access_token_ttl_secs())?;
            let next = stored.with_access_token(access);
            if next.grant.user.is_some() {
                self.granted_repo
                    .merge_or_register(&ctx.tenant_id, &next.grant)
                    .await?;
            }
            self.token_repo.update(&ctx.tenant_id, &next).await?;
            next
        };
        Ok(token)
    }

    /// RFC 6749 §4.4: client acting on its own behalf.
    pub(super) async fn client_credentials_grant(
        &self,
        ctx: &TokenRequestContext,
    ) -> Result<OAuthToken, TokenError> {
        if ctx.client_config.is_public() {
            return Err(TokenError::unauthorized_client(
                "public clients may not use client_credentials",
            ));
        }
        let scopes = validated_scopes(ctx)?;
        let grant = AuthorizationGrant {
            tenant_id: ctx.tenant_id.clone(),
            user: None,
            authentication: None,
            client_id: ctx.client_id().to_owned(),
            grant_type: GrantType::ClientCredentials,
            scopes,
            id_token_claims: BTreeSet::new(),
            userinfo_claims: BTreeSet::new(),
            denied_scopes: BTreeSet::new(),
            custom_properties: serde_json::Map::new(),
        };
        self.issue_and_register(
            ctx,
            grant,
            IssueOptions {
                include_refresh: false,
                id_token: None,
                include_c_nonce: false,
            },
        )
        .await
    }

    /// RFC 6749 §4.3: resource-owner password credentials, delegated.
    pub(super) async fn password_grant(
        &self,
        ctx: &TokenRequestContext,
    ) -> Result<OAuthToken, TokenError> {
        let Some(verifier) = self.password_verifier.as_ref() else {
            return Err(TokenError::unsupported_grant_type(
                "the password grant is not enabled on this server",
            ));
        };
        let username = ctx
            .params
            .username
            .as_deref()
            .ok_or_else(|| TokenError::invalid_request("username is required"))?;
        let password = ctx
            .params
            .password
            .as_deref()
            .ok_or_else(|| TokenError::invalid_request("password is required"))?;

        let user = verifier
            .verify(&ctx.tenant_id, username, password)
            .await?
            .ok_or_else(|| TokenError::invalid_grant("resource owner credentials are invalid"))?;
        if !user.is_active() {
            return Err(TokenError::invalid_grant("user account is not active"));
        }

        let scopes = validated_scopes(ctx)?;
        let grant = AuthorizationGrant {
            tenant_id: ctx.tenant_id.clone(),
            user: Some(user),
            authentication: Some(Authentication::new(vec!["pwd".to_owned()])),
            client_id: ctx.client_id().to_owned(),
            grant_type: GrantType::Password,
            scopes: scopes.clone(),
            id_token_claims: BTreeSet::new(),
            userinfo_claims: BTreeSet::new(),
            denied_scopes: BTreeSet::new(),
            custom_properties: serde_json::Map::new(),
        };
        self.issue_and_register(
            ctx,
            grant,
            IssueOptions {
                include_refresh: true,
                id_token: scopes.contains("openid").then(|| IdTokenSeed {
                    nonce: None,
                    code: None,
                }),
                include_c_nonce: false,
            },
        )
        .await
    }

    /// CIBA: redeem a backchannel grant in poll or ping mode.
    pub(super) async fn ciba_grant(
        &self,
        ctx: &TokenRequestContext,
    ) -> Result<OAuthToken, TokenError> {
        let auth_req_id = ctx
            .params
            .auth_req_id
            .as_deref()
            .ok_or_else(|| TokenError::invalid_request("auth_req_id is required"))?;

        let grant = self
            .ciba_grant_repo
            .find(&ctx.tenant_id, auth_req_id)
            .await?
            .ok_or_else(|| TokenError::invalid_grant("unknown auth_req_id"))?;

        if grant.grant.client_id != ctx.client_id() {
            return Err(TokenError::invalid_grant(
                "auth_req_id was issued to another client",
            ));
        }
        if grant.delivery_mode == CibaDeliveryMode::Push {
            return Err(TokenError::invalid_request(
                "push delivery mode delivers tokens by notification, not polling",
            ));
        }
        if grant.is_expired(Utc::now()) {
            self.ciba_grant_repo.consume(&ctx.tenant_id, auth_req_id).await?;
            return Err(TokenError::expired_token(
                "the backchannel authentication request has expired",
            ));
        }
        match grant.status {
            CibaGrantStatus::Pending => Err(TokenError::authorization_pending()),
            CibaGrantStatus::Denied => {
                self.ciba_grant_repo.consume(&ctx.tenant_id, auth_req_id).await?;
                Err(TokenError::access_denied("the user denied the request"))
            }
            CibaGrantStatus::Authorized => {
                // Atomic consume: concurrent polls race for a single success
                let consumed = self
                    .ciba_grant_repo
                    .consume(&ctx.tenant_id, auth_req_id)
                    .await?
                    .ok_or_else(|| {
                        TokenError::invalid_grant("auth_req_id has already been redeemed")
                    })?;
                let is_oidc = consumed.grant.has_openid_scope();
                self.issue_and_register(
                    ctx,
                    consumed.grant,
                    IssueOptions {
                        include_refresh: true,
                        id_token: is_oidc.then(|| IdTokenSeed {
                            nonce: None,
                            code: None,
                        }),
                        include_c_nonce: false,
                    },
                )
                .await
            }
        }
    }

    /// RFC 7523 §2.1: JWT assertion as an authorization grant.
    pub(super) async fn jwt_bearer_grant(
        &self,
        ctx: &TokenRequestContext,
    ) -> Result<OAuthToken, TokenError> {
        let assertion = ctx
            .params
            .assertion
            .as_deref()
            .ok_or_else(|| TokenError::invalid_request("assertion is required"))?;

        #[derive(Debug, Deserialize)]
        struct AssertionClaims {
            iss: String,
            sub: String,
        }

        let (alg, key) = assertion_key(ctx)?;
        let mut validation = Validation::new(alg);
        validation.set_audience(&[ctx.server_config.issuer.as_str()]);
        let data = jsonwebtoken::decode::<AssertionClaims>(assertion, &key, &validation)
            .map_err(|e| TokenError::invalid_grant(format!("assertion rejected: {e}")))?;
        if data.claims.iss != ctx.client_id() {
            return Err(TokenError::invalid_grant(
                "assertion issuer must be the authenticated client",
            ));
        }

        let scopes = validated_scopes(ctx)?;
        let grant = AuthorizationGrant {
            tenant_id: ctx.tenant_id.clone(),
            user: Some(User::with_subject(data.claims.sub)),
            authentication: Some(Authentication::new(vec!["jwt-bearer".to_owned()])),
            client_id: ctx.client_id().to_owned(),
            grant_type: GrantType::JwtBearer,
            scopes,
            id_token_claims: BTreeSet::new(),
            userinfo_claims: BTreeSet::new(),
            denied_scopes: BTreeSet::new(),
            custom_properties: serde_json::Map::new(),
        };
        // RFC 7523 discourages refresh tokens for assertion grants
        self.issue_and_register(
            ctx,
            grant,
            IssueOptions {
                include_refresh: false,
                id_token: None,
                include_c_nonce: false,
            },
        )
        .await
    }

    /// Mint the credential set, merge standing consent for user grants, and
    /// persist the record.
    pub(super) async fn issue_and_register(
        &self,
        ctx: &TokenRequestContext,
        grant: AuthorizationGrant,
        opts: IssueOptions,
    ) -> Result<OAuthToken, TokenError> {
        let access_token = mint_access_token(ctx.access_token_ttl_secs())?;
        let refresh_token = if opts.include_refresh && ctx.refresh_tokens_allowed() {
            Some(mint_refresh_token(ctx.refresh_token_ttl_secs())?)
        } else {
            None
        };
        let id_token = match opts.id_token {
            Some(seed) => Some(
                mint_id_token(
                    &ctx.server_config,
                    &grant,
                    &IdTokenInputs {
                        nonce: seed.nonce,
                        access_token: Some(access_token.value.clone()),
                        authorization_code: seed.code,
                    },
                )
                .map_err(TokenError::from)?,
            ),
            None => None,
        };
        let (c_nonce, c_nonce_expires_in) = if opts.include_c_nonce {
            (Some(random_url_safe(24)?), Some(3600))
        } else {
            (None, None)
        };

        let token = OAuthToken {
            id: Uuid::new_v4(),
            tenant_id: ctx.tenant_id.clone(),
            grant,
            access_token,
            refresh_token,
            id_token,
            c_nonce,
            c_nonce_expires_in,
        };

        // Client-credentials grants have no user and no standing consent
        if token.grant.user.is_some() {
            self.granted_repo
                .merge_or_register(&ctx.tenant_id, &token.grant)
                .await?;
        }
        self.token_repo.register(&ctx.tenant_id, &token).await?;
        Ok(token)
    }
}

fn requested_scopes(ctx: &TokenRequestContext) -> Option<BTreeSet<String>> {
    ctx.params.scope.as_deref().map(|raw| {
        raw.split_ascii_whitespace()
            .map(ToOwned::to_owned)
            .collect()
    })
}

/// Requested scopes clamped to the client registration; defaults to the full
/// registered set when the request names none.
fn validated_scopes(ctx: &TokenRequestContext) -> Result<BTreeSet<String>, TokenError> {
    match requested_scopes(ctx) {
        None => Ok(ctx.client_config.scopes.iter().cloned().collect()),
        Some(requested) => {
            let unregistered = ctx
                .client_config
                .unregistered_scopes(requested.iter().map(String::as_str));
            if unregistered.is_empty() {
                Ok(requested)
            } else {
                Err(TokenError::invalid_scope(format!(
                    "client is not registered for scopes: {}",
                    unregistered.into_iter().collect::<Vec<_>>().join(" ")
                )))
            }
        }
    }
}

fn assertion_key(ctx: &TokenRequestContext) -> Result<(Algorithm, DecodingKey), TokenError> {
    if ctx.client_config.jwks.is_some() {
        let key = super::client_auth::assertion_decoding_key(&ctx.client_config)?;
        Ok((Algorithm::RS256, key))
    } else if let Some(secret) = ctx.client_config.client_secret.as_deref() {
        Ok((Algorithm::HS256, DecodingKey::from_secret(secret.as_bytes())))
    } else {
        Err(TokenError::invalid_client(
            "client has no key material to verify assertions against",
        ))
    }
}
