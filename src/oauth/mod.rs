// ABOUTME: Authorization endpoint protocol: request validation, decision, response creation
// ABOUTME: The redirectable vs non-redirectable failure split is enforced at the context builder
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

/// Validated contexts for the request and decision steps
pub mod context;
/// Typed protocol failures
pub mod error;
/// Request/authorize/deny handlers and side effects
pub mod handler;
/// Entry points with error-to-wire mapping
pub mod protocol;
/// Stored authorization request and raw parameters
pub mod request;
/// Response types, creators, and redirect building
pub mod response;

pub use context::{AuthorizeContext, AuthorizationRequestContext};
pub use error::OAuthRequestError;
pub use handler::{DenyReason, OAuthAuthorizeRequest, OAuthRequestHandler, OAuthRequestResult};
pub use protocol::{AuthorizeOutcome, OAuthProtocol, OAuthRequestOutcome, PushedRequestOutcome};
pub use request::{AuthorizationRequest, AuthorizationRequestParams};
pub use response::{AuthorizationResponse, ResponseMode, ResponseType};
