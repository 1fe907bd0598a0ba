//! Validates a storeguard configuration and prints the resolved settings.
//! Used by CI and before rollouts to catch bad breaker or tier tables.
//!
//! Usage: `storeguard-check [CONFIG]` (falls back to `STOREGUARD_CONFIG`).

use anyhow::Context;
use serde_json::json;
use storeguard::config::CONFIG_ENV;
use storeguard::GuardConfig;

fn main() -> anyhow::Result<()> {
    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV).ok());

    let mut config = match &path {
        Some(path) => GuardConfig::from_file(path).with_context(|| format!("loading {}", path))?,
        None => GuardConfig::default(),
    };

    // Logging may already be configured by the environment; ignore a second init.
    let _ = storeguard::telemetry::init_tracing_with(
        config.logging.format,
        &config.logging.default_directives,
    );
    tracing::info!(config = path.as_deref().unwrap_or("<defaults>"), "checking configuration");

    config
        .apply_env_overrides(|key| std::env::var(key).ok())
        .context("applying environment overrides")?;

    if let Err(e) = config.validate() {
        eprintln!("❌ invalid configuration: {}", e);
        std::process::exit(1);
    }

    let [read, write, auth] = config.breakers.resolved();
    let resolved = json!({
        "breakers": { "read": read, "write": write, "auth": auth },
        "cache": config.cache,
        "rateLimit": {
            "keyPrefix": config.rate_limit.key_prefix,
            "tiers": config.rate_limit.tiers,
        },
    });
    println!("{}", serde_json::to_string_pretty(&resolved)?);
    eprintln!("✅ configuration is valid");
    Ok(())
}
