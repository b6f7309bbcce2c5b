// ABOUTME: Library entry point for the multi-tenant OAuth 2.0 / OIDC grant engine
// ABOUTME: Protocol state machines live here; transport and persistence are external adapters
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

#![deny(unsafe_code)]

//! # idp-engine
//!
//! Authorization and token grant engine for a multi-tenant OAuth 2.0 /
//! OpenID Connect identity provider. The crate owns the protocol state
//! machines: authorization requests, authorize/deny decisions, the token
//! endpoint's grant-type dispatch, introspection, revocation, backchannel
//! (CIBA) authentication, and RP-initiated logout. HTTP framing and
//! persistence stay behind adapter seams.
//!
//! ## Architecture
//!
//! - **`config`**: per-tenant server configuration and per-client
//!   configuration, resolved through repositories with a read-through cache
//! - **`oauth`**: authorization endpoint contexts, response creators, and the
//!   redirectable vs non-redirectable error split
//! - **`grant`**: the grant payload, single-use code grants, CIBA grants, and
//!   the standing-consent record that makes silent re-authorization work
//! - **`token`**: issued credential sets, the token endpoint dispatch over
//!   grant types, introspection, and revocation
//! - **`ciba`** / **`session`**: backchannel authentication and RP-initiated
//!   logout
//! - **`storage`**: repository traits plus a bundled in-memory store
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use idp_engine::config::ConfigResolver;
//! use idp_engine::oauth::{AuthorizationRequestParams, OAuthProtocol, OAuthRequestHandler};
//! use idp_engine::storage::InMemoryStore;
//! use idp_engine::tenant::TenantId;
//!
//! # async fn run() {
//! let store = Arc::new(InMemoryStore::new());
//! let resolver = Arc::new(ConfigResolver::new(store.clone(), store.clone()));
//! let protocol = OAuthProtocol::new(OAuthRequestHandler::new(
//!     resolver,
//!     store.clone(),
//!     store.clone(),
//!     store.clone(),
//!     store.clone(),
//! ));
//! let params = AuthorizationRequestParams {
//!     response_type: Some("code".to_owned()),
//!     client_id: Some("client-1".to_owned()),
//!     scope: Some("openid".to_owned()),
//!     ..AuthorizationRequestParams::default()
//! };
//! let outcome = protocol.request(&TenantId::new("t1"), &params, None).await;
//! println!("{outcome:?}");
//! # }
//! ```

/// Client-initiated backchannel authentication (CIBA)
pub mod ciba;
/// Tenant and client configuration resolution
pub mod config;
/// Secure randomness and constant-time comparison
pub mod crypto;
/// Grant payloads and persisted grant records
pub mod grant;
/// End-user identity and authentication events
pub mod identity;
/// Structured logging setup
pub mod logging;
/// Authorization endpoint protocol
pub mod oauth;
/// PKCE challenge handling
pub mod pkce;
/// OP sessions and RP-initiated logout
pub mod session;
/// Repository traits and the in-memory store
pub mod storage;
/// Tenant identity
pub mod tenant;
/// Token issuance, introspection, and revocation
pub mod token;

pub use ciba::CibaProtocol;
pub use oauth::OAuthProtocol;
pub use session::LogoutProtocol;
pub use token::TokenProtocol;
