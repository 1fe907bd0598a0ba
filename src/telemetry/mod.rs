//! Tracing setup.
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! the application. [`init_tracing`] is a convenience for binaries and tests.

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Filter directives, checked before `RUST_LOG`.
pub const LOG_ENV: &str = "STOREGUARD_LOG";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Full,
    Compact,
    Pretty,
}

/// `STOREGUARD_LOG`, then `RUST_LOG`, then `default_directives`.
pub fn env_filter(default_directives: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_env(LOG_ENV) {
        return Ok(filter);
    }
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(default_directives).map_err(|e| {
        Error::configuration_with_context(
            format!("invalid log filter '{}'", default_directives),
            ErrorContext::new()
                .with_details(e.to_string())
                .with_source("telemetry"),
        )
    })
}

/// Installs a global fmt subscriber at `info` unless the environment says otherwise.
pub fn init_tracing() -> Result<()> {
    init_tracing_with(LogFormat::default(), "info")
}

pub fn init_tracing_with(format: LogFormat, default_directives: &str) -> Result<()> {
    let filter = env_filter(default_directives)?;
    let layer = match format {
        LogFormat::Full => fmt::layer().with_target(true).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(false).boxed(),
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
    };
    tracing_subscriber::registry()
        .with(layer.with_filter(filter))
        .try_init()
        .map_err(|e| {
            Error::configuration_with_context(
                "tracing subscriber already installed",
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("telemetry"),
            )
        })
}
