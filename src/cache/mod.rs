//! Cascading read-through cache.
//!
//! Values are cached as JSON across three tiers with different latency and
//! durability tradeoffs. Caching is an optimisation only: any tier may fail and
//! the caller still gets a correct answer.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CascadingCache`] | `get_or_compute` / `invalidate` across all tiers |
//! | [`MemoryTier`] | Process-local LRU with per-entry expiry |
//! | [`KvStore`] | Trait for the shared key-value tier |
//! | [`EdgeCache`] | Trait for the request-keyed HTTP cache tier |
//! | [`CacheTtls`] | Per-tier time-to-live |
//!
//! ## Example
//!
//! ```rust
//! use storeguard::cache::{CacheConfig, CascadingCache, MemoryKvStore};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let cache = CascadingCache::new(CacheConfig::default())?
//!     .with_kv(Arc::new(MemoryKvStore::new()));
//!
//! let models: Vec<String> = cache
//!     .get_or_compute("models:all", || async { Ok::<_, storeguard::Error>(vec!["P1".into()]) })
//!     .await?;
//! assert_eq!(models, vec!["P1".to_string()]);
//! # Ok::<(), storeguard::Error>(())
//! # }).unwrap();
//! ```

pub mod cascade;
pub mod edge;
pub mod kv;
pub mod memory;

pub use cascade::{CacheStats, CascadingCache};
pub use edge::{CacheRequest, EdgeCache, EdgeResponse, MemoryEdgeCache, EDGE_CACHE_ORIGIN};
pub use kv::{KvStore, MemoryKvStore};
pub use memory::MemoryTier;

use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroUsize;
use std::time::Duration;
use thiserror::Error as ThisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    Memory,
    Kv,
    Edge,
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CacheTier::Memory => "memory",
            CacheTier::Kv => "kv",
            CacheTier::Edge => "edge",
        })
    }
}

/// Non-fatal failure of one tier. Logged and counted, never propagated by
/// [`CascadingCache`].
#[derive(Debug, ThisError)]
#[error("{tier} tier {operation} failed: {source}")]
pub struct CacheTierError {
    pub tier: CacheTier,
    pub operation: &'static str,
    #[source]
    pub source: Box<Error>,
}

impl CacheTierError {
    pub fn new(tier: CacheTier, operation: &'static str, source: Error) -> Self {
        Self {
            tier,
            operation,
            source: Box::new(source),
        }
    }
}

/// Time-to-live per tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtls {
    pub memory: Duration,
    pub kv: Duration,
    pub edge: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            memory: Duration::from_secs(60),
            kv: Duration::from_secs(3600),
            edge: Duration::from_secs(300),
        }
    }
}

impl CacheTtls {
    pub fn with_memory(mut self, ttl: Duration) -> Self {
        self.memory = ttl;
        self
    }

    pub fn with_kv(mut self, ttl: Duration) -> Self {
        self.kv = ttl;
        self
    }

    pub fn with_edge(mut self, ttl: Duration) -> Self {
        self.edge = ttl;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Maximum entries held by the memory tier.
    pub memory_capacity: usize,
    pub ttls: CacheTtls,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: 1024,
            ttls: CacheTtls::default(),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_memory_capacity(mut self, capacity: usize) -> Self {
        self.memory_capacity = capacity;
        self
    }

    pub fn with_ttls(mut self, ttls: CacheTtls) -> Self {
        self.ttls = ttls;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.memory_capacity()?;
        for (field, ttl) in [
            ("cache.ttls.memory", self.ttls.memory),
            ("cache.ttls.kv", self.ttls.kv),
            ("cache.ttls.edge", self.ttls.edge),
        ] {
            if ttl.is_zero() {
                return Err(Error::configuration_with_context(
                    "cache TTL must be greater than zero",
                    ErrorContext::new().with_field_path(field),
                ));
            }
        }
        Ok(())
    }

    pub(crate) fn memory_capacity(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.memory_capacity).ok_or_else(|| {
            Error::configuration_with_context(
                "memory tier capacity must be greater than zero",
                ErrorContext::new().with_field_path("cache.memory_capacity"),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ttls() {
        let ttls = CacheTtls::default();
        assert_eq!(ttls.memory, Duration::from_secs(60));
        assert_eq!(ttls.kv, Duration::from_secs(3600));
        assert_eq!(ttls.edge, Duration::from_secs(300));
    }

    #[test]
    fn test_config_validation() {
        assert!(CacheConfig::default().validate().is_ok());
        assert!(CacheConfig::new().with_memory_capacity(0).validate().is_err());
        let zero = CacheConfig::new().with_ttls(CacheTtls::default().with_kv(Duration::ZERO));
        let err = zero.validate().unwrap_err();
        assert!(err.to_string().contains("cache.ttls.kv"));
    }
}
