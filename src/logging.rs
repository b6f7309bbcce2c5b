// ABOUTME: Structured logging setup shared by the hosting process and the test suite
// ABOUTME: Compact console output by default, JSON when the deployment asks for it
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 idp-engine contributors

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format for log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-oriented compact lines
    Compact,
    /// One JSON object per line, for log shippers
    Json,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub default_filter: String,
    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_filter: "idp_engine=info".to_owned(),
            format: LogFormat::Compact,
        }
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured default filter. Calling this twice
/// returns an error from the subscriber registry; the hosting process owns
/// initialization.
///
/// # Errors
/// Returns an error when a global subscriber is already installed.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_filter.clone()));
    let registry = tracing_subscriber::registry().with(filter);
    match config.format {
        LogFormat::Compact => {
            registry
                .with(tracing_subscriber::fmt::layer().compact())
                .try_init()?;
        }
        LogFormat::Json => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()?;
        }
    }
    Ok(())
}
