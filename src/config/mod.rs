// ABOUTME: Per-tenant authorization server configuration and per-client configuration
// ABOUTME: Read-only lookups backed by an external configuration store behind repository traits
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

/// Per-client configuration record
pub mod client;
/// Environment-driven server defaults
pub mod environment;
/// Configuration query repositories and the caching resolver
pub mod resolver;
/// Per-tenant authorization server configuration record
pub mod server;

pub use client::{ApplicationType, ClientConfig};
pub use environment::ServerDefaults;
pub use resolver::{ClientConfigRepository, ConfigError, ConfigResolver, ServerConfigRepository};
pub use server::{AuthorizationServerConfig, SigningAlg, SigningKeys};
