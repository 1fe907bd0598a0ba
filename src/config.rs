//! Runtime configuration.
//!
//! Every section has defaults equal to the built-in presets, so an empty file
//! is a valid configuration.
//!
//! ```yaml
//! breakers:
//!   read: { failure_threshold: 3, timeout_ms: 3000, max_timeout_ms: 15000 }
//! cache:
//!   kv_ttl_secs: 1800
//! rate_limit:
//!   tiers:
//!     limits:
//!       auth: { max_requests: 5, window_secs: 60 }
//! ```

use crate::cache::{CacheConfig, CacheTtls, CascadingCache, KvStore};
use crate::rate_limit::{RateLimiter, TierTable};
use crate::resilience::CircuitConfig;
use crate::store::{Database, ProtectedDataStore};
use crate::telemetry::LogFormat;
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Path of the config file read by [`GuardConfig::from_env`].
pub const CONFIG_ENV: &str = "STOREGUARD_CONFIG";
pub const WINDOW_SECS_ENV: &str = "STOREGUARD_RATE_LIMIT_WINDOW_SECS";
pub const KEY_PREFIX_ENV: &str = "STOREGUARD_RATE_LIMIT_KEY_PREFIX";
pub const MEMORY_CAPACITY_ENV: &str = "STOREGUARD_CACHE_MEMORY_CAPACITY";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub breakers: BreakerSettings,
    pub cache: CacheSettings,
    pub rate_limit: RateLimitSettings,
    pub logging: LoggingSettings,
}

/// One breaker, with durations in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerConfig {
    pub name: String,
    pub failure_threshold: u32,
    pub timeout_ms: u64,
    pub max_timeout_ms: u64,
    pub success_threshold: u32,
    pub monitoring_window_ms: u64,
}

impl From<&CircuitConfig> for BreakerConfig {
    fn from(c: &CircuitConfig) -> Self {
        Self {
            name: c.name.clone(),
            failure_threshold: c.failure_threshold,
            timeout_ms: c.timeout.as_millis() as u64,
            max_timeout_ms: c.max_timeout.as_millis() as u64,
            success_threshold: c.success_threshold,
            monitoring_window_ms: c.monitoring_window.as_millis() as u64,
        }
    }
}

impl From<&BreakerConfig> for CircuitConfig {
    fn from(c: &BreakerConfig) -> Self {
        CircuitConfig {
            name: c.name.clone(),
            failure_threshold: c.failure_threshold,
            timeout: Duration::from_millis(c.timeout_ms),
            max_timeout: Duration::from_millis(c.max_timeout_ms),
            success_threshold: c.success_threshold,
            monitoring_window: Duration::from_millis(c.monitoring_window_ms),
        }
    }
}

/// Partial breaker section: unset fields fall back to the preset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerOverrides {
    pub name: Option<String>,
    pub failure_threshold: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub max_timeout_ms: Option<u64>,
    pub success_threshold: Option<u32>,
    pub monitoring_window_ms: Option<u64>,
}

impl BreakerOverrides {
    pub fn apply(&self, preset: CircuitConfig) -> CircuitConfig {
        let mut c = BreakerConfig::from(&preset);
        if let Some(v) = &self.name {
            c.name = v.clone();
        }
        if let Some(v) = self.failure_threshold {
            c.failure_threshold = v;
        }
        if let Some(v) = self.timeout_ms {
            c.timeout_ms = v;
        }
        if let Some(v) = self.max_timeout_ms {
            c.max_timeout_ms = v;
        }
        if let Some(v) = self.success_threshold {
            c.success_threshold = v;
        }
        if let Some(v) = self.monitoring_window_ms {
            c.monitoring_window_ms = v;
        }
        CircuitConfig::from(&c)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub read: BreakerOverrides,
    pub write: BreakerOverrides,
    pub auth: BreakerOverrides,
}

impl BreakerSettings {
    pub fn read(&self) -> CircuitConfig {
        self.read.apply(CircuitConfig::read_database())
    }

    pub fn write(&self) -> CircuitConfig {
        self.write.apply(CircuitConfig::database())
    }

    pub fn auth(&self) -> CircuitConfig {
        self.auth.apply(CircuitConfig::auth_database())
    }

    pub fn resolved(&self) -> [BreakerConfig; 3] {
        [
            BreakerConfig::from(&self.read()),
            BreakerConfig::from(&self.write()),
            BreakerConfig::from(&self.auth()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub memory_capacity: usize,
    pub memory_ttl_secs: u64,
    pub kv_ttl_secs: u64,
    pub edge_ttl_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        let defaults = CacheConfig::default();
        Self {
            memory_capacity: defaults.memory_capacity,
            memory_ttl_secs: defaults.ttls.memory.as_secs(),
            kv_ttl_secs: defaults.ttls.kv.as_secs(),
            edge_ttl_secs: defaults.ttls.edge.as_secs(),
        }
    }
}

impl CacheSettings {
    pub fn to_cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_memory_capacity(self.memory_capacity)
            .with_ttls(CacheTtls {
                memory: Duration::from_secs(self.memory_ttl_secs),
                kv: Duration::from_secs(self.kv_ttl_secs),
                edge: Duration::from_secs(self.edge_ttl_secs),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub key_prefix: String,
    pub tiers: TierTable,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            key_prefix: "rate_limit".to_string(),
            tiers: TierTable::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub format: LogFormat,
    /// Used when neither `STOREGUARD_LOG` nor `RUST_LOG` is set.
    pub default_directives: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            default_directives: "info".to_string(),
        }
    }
}

impl GuardConfig {
    pub fn from_yaml_str(s: &str) -> Result<Self> {
        // Empty documents deserialize to unit, not an empty map.
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    /// `.json` files are read as JSON, anything else as YAML.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration_with_context(
                format!("cannot read config file: {}", e),
                ErrorContext::new().with_source(path.display().to_string()),
            )
        })?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .map_or(false, |e| e.eq_ignore_ascii_case("json"));
        if is_json {
            Self::from_json_str(&content)
        } else {
            Self::from_yaml_str(&content)
        }
    }

    /// Loads `STOREGUARD_CONFIG` if set, applies env overrides and validates.
    pub fn from_env() -> Result<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path.trim())?,
            _ => Self::default(),
        };
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from `lookup`, normally the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(WINDOW_SECS_ENV) {
            let secs = parse_env::<u64>(WINDOW_SECS_ENV, &raw)?;
            self.rate_limit.tiers = std::mem::take(&mut self.rate_limit.tiers).with_window_secs(secs);
        }
        if let Some(raw) = lookup(KEY_PREFIX_ENV) {
            self.rate_limit.key_prefix = raw;
        }
        if let Some(raw) = lookup(MEMORY_CAPACITY_ENV) {
            self.cache.memory_capacity = parse_env::<usize>(MEMORY_CAPACITY_ENV, &raw)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for breaker in [self.breakers.read(), self.breakers.write(), self.breakers.auth()] {
            breaker.validate()?;
        }
        self.cache.to_cache_config().validate()?;
        if self.rate_limit.key_prefix.trim().is_empty() {
            return Err(Error::configuration_with_context(
                "rate limit key prefix must not be empty",
                ErrorContext::new().with_field_path("rate_limit.key_prefix"),
            ));
        }
        self.rate_limit.tiers.validate()
    }

    pub fn protected_store(&self, db: Arc<dyn Database>) -> Result<ProtectedDataStore> {
        ProtectedDataStore::with_configs(
            db,
            self.breakers.read(),
            self.breakers.write(),
            self.breakers.auth(),
        )
    }

    pub fn cascading_cache(&self) -> Result<CascadingCache> {
        CascadingCache::new(self.cache.to_cache_config())
    }

    pub fn rate_limiter(&self, store: Arc<dyn KvStore>) -> Result<RateLimiter> {
        RateLimiter::new(store)
            .with_key_prefix(self.rate_limit.key_prefix.clone())
            .with_tiers(self.rate_limit.tiers.clone())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim().parse::<T>().map_err(|e| {
        Error::configuration_with_context(
            format!("invalid value '{}': {}", raw, e),
            ErrorContext::new().with_field_path(key).with_source("environment"),
        )
    })
}
