//! Read-through cache across memory, key-value and edge tiers.

use super::edge::{CacheRequest, EdgeCache, EdgeResponse};
use super::kv::KvStore;
use super::memory::MemoryTier;
use super::{CacheConfig, CacheTier, CacheTierError, CacheTtls};
use crate::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters since construction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub memory_hits: u64,
    pub kv_hits: u64,
    pub edge_hits: u64,
    pub misses: u64,
    pub computes: u64,
    pub compute_errors: u64,
    pub tier_errors: u64,
    pub corrupt_entries: u64,
    pub invalidations: u64,
}

impl CacheStats {
    pub fn hits(&self) -> u64 {
        self.memory_hits + self.kv_hits + self.edge_hits
    }

    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits() + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct AtomicStats {
    memory_hits: AtomicU64,
    kv_hits: AtomicU64,
    edge_hits: AtomicU64,
    misses: AtomicU64,
    computes: AtomicU64,
    compute_errors: AtomicU64,
    tier_errors: AtomicU64,
    corrupt_entries: AtomicU64,
    invalidations: AtomicU64,
}

impl AtomicStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn to_stats(&self) -> CacheStats {
        CacheStats {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            kv_hits: self.kv_hits.load(Ordering::Relaxed),
            edge_hits: self.edge_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            computes: self.computes.load(Ordering::Relaxed),
            compute_errors: self.compute_errors.load(Ordering::Relaxed),
            tier_errors: self.tier_errors.load(Ordering::Relaxed),
            corrupt_entries: self.corrupt_entries.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

/// Three-tier read-through cache.
///
/// Tiers are checked fastest first. A hit backfills every faster tier; a full
/// miss runs `compute` once and writes all tiers best-effort. Tier failures
/// degrade that tier to a miss and are never returned to the caller.
///
/// There is no cross-request locking: concurrent misses on one key may each
/// run `compute`, so it should be idempotent.
pub struct CascadingCache {
    memory: MemoryTier,
    kv: Option<Arc<dyn KvStore>>,
    edge: Option<Arc<dyn EdgeCache>>,
    ttls: CacheTtls,
    stats: AtomicStats,
}

impl CascadingCache {
    pub fn new(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            memory: MemoryTier::new(config.memory_capacity()?),
            kv: None,
            edge: None,
            ttls: config.ttls,
            stats: AtomicStats::default(),
        })
    }

    pub fn with_kv(mut self, kv: Arc<dyn KvStore>) -> Self {
        self.kv = Some(kv);
        self
    }

    pub fn with_edge(mut self, edge: Arc<dyn EdgeCache>) -> Self {
        self.edge = Some(edge);
        self
    }

    pub fn ttls(&self) -> CacheTtls {
        self.ttls
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.to_stats()
    }

    /// [`get_or_compute_with`](Self::get_or_compute_with) using the default TTLs.
    pub async fn get_or_compute<T, E, F, Fut>(&self, key: &str, compute: F) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        self.get_or_compute_with(key, self.ttls, compute).await
    }

    /// Returns the cached value for `key`, or runs `compute` and caches its
    /// success. A failed compute is returned untouched and not cached.
    pub async fn get_or_compute_with<T, E, F, Fut>(
        &self,
        key: &str,
        ttls: CacheTtls,
        compute: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if let Some(value) = self.lookup(key, ttls).await {
            return Ok(value);
        }

        AtomicStats::bump(&self.stats.misses);
        AtomicStats::bump(&self.stats.computes);
        let value = match compute().await {
            Ok(value) => value,
            Err(e) => {
                AtomicStats::bump(&self.stats.compute_errors);
                tracing::debug!(key, "compute failed, nothing cached");
                return Err(e);
            }
        };

        match serde_json::to_string(&value) {
            Ok(payload) => self.populate(key, payload, ttls).await,
            Err(e) => tracing::warn!(key, error = %e, "value not serializable, skipping cache write"),
        }
        Ok(value)
    }

    /// Removes `key` from every tier. Tier failures are logged and ignored.
    pub async fn invalidate(&self, key: &str) {
        AtomicStats::bump(&self.stats.invalidations);
        self.memory.remove(key);

        if let Some(kv) = &self.kv {
            if let Err(e) = kv.delete(key).await {
                self.tier_failed(CacheTier::Kv, "delete", key, e);
            }
        }
        if let Some(edge) = &self.edge {
            let deleted = match CacheRequest::for_key(key) {
                Ok(request) => edge.delete(&request).await,
                Err(e) => Err(e),
            };
            if let Err(e) = deleted {
                self.tier_failed(CacheTier::Edge, "delete", key, e);
            }
        }
        tracing::debug!(key, "cache key invalidated");
    }

    /// Drops the process-local tier only.
    pub fn clear_memory(&self) {
        self.memory.clear();
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str, ttls: CacheTtls) -> Option<T> {
        if let Some(payload) = self.memory.get(key) {
            match serde_json::from_str(&payload) {
                Ok(value) => {
                    AtomicStats::bump(&self.stats.memory_hits);
                    return Some(value);
                }
                Err(e) => {
                    self.corrupt(CacheTier::Memory, key, &e);
                    self.memory.remove(key);
                }
            }
        }

        if let Some(kv) = &self.kv {
            match kv.get(key).await {
                Ok(Some(payload)) => match serde_json::from_str(&payload) {
                    Ok(value) => {
                        AtomicStats::bump(&self.stats.kv_hits);
                        self.memory.insert(key, payload, ttls.memory);
                        return Some(value);
                    }
                    Err(e) => {
                        self.corrupt(CacheTier::Kv, key, &e);
                        if let Err(e) = kv.delete(key).await {
                            self.tier_failed(CacheTier::Kv, "delete", key, e);
                        }
                    }
                },
                Ok(None) => {}
                Err(e) => self.tier_failed(CacheTier::Kv, "get", key, e),
            }
        }

        if let Some(edge) = &self.edge {
            let request = match CacheRequest::for_key(key) {
                Ok(request) => request,
                Err(e) => {
                    self.tier_failed(CacheTier::Edge, "match", key, e);
                    return None;
                }
            };
            match edge.match_request(&request).await {
                Ok(Some(response)) => {
                    let decoded = response
                        .text()
                        .map_err(|e| e.to_string())
                        .and_then(|text| {
                            serde_json::from_str::<T>(text)
                                .map(|v| (v, text.to_string()))
                                .map_err(|e| e.to_string())
                        });
                    match decoded {
                        Ok((value, payload)) => {
                            AtomicStats::bump(&self.stats.edge_hits);
                            self.memory.insert(key, payload.clone(), ttls.memory);
                            if let Some(kv) = &self.kv {
                                if let Err(e) = kv.put(key, &payload, ttls.kv).await {
                                    self.tier_failed(CacheTier::Kv, "put", key, e);
                                }
                            }
                            return Some(value);
                        }
                        Err(e) => {
                            self.corrupt(CacheTier::Edge, key, &e);
                            if let Err(e) = edge.delete(&request).await {
                                self.tier_failed(CacheTier::Edge, "delete", key, e);
                            }
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => self.tier_failed(CacheTier::Edge, "match", key, e),
            }
        }

        None
    }

    async fn populate(&self, key: &str, payload: String, ttls: CacheTtls) {
        self.memory.insert(key, payload.clone(), ttls.memory);

        let kv_write = async {
            if let Some(kv) = &self.kv {
                if let Err(e) = kv.put(key, &payload, ttls.kv).await {
                    self.tier_failed(CacheTier::Kv, "put", key, e);
                }
            }
        };
        let edge_write = async {
            if let Some(edge) = &self.edge {
                let written = match (
                    CacheRequest::for_key(key),
                    EdgeResponse::json(payload.clone(), ttls.edge),
                ) {
                    (Ok(request), Ok(response)) => edge.put(&request, response).await,
                    (Err(e), _) | (_, Err(e)) => Err(e),
                };
                if let Err(e) = written {
                    self.tier_failed(CacheTier::Edge, "put", key, e);
                }
            }
        };
        futures::join!(kv_write, edge_write);
    }

    fn tier_failed(&self, tier: CacheTier, operation: &'static str, key: &str, source: crate::Error) {
        AtomicStats::bump(&self.stats.tier_errors);
        let error = CacheTierError::new(tier, operation, source);
        tracing::warn!(tier = %tier, operation, key, error = %error, "cache tier failure ignored");
    }

    fn corrupt(&self, tier: CacheTier, key: &str, error: &dyn std::fmt::Display) {
        AtomicStats::bump(&self.stats.corrupt_entries);
        tracing::warn!(tier = %tier, key, error = %error, "discarding undecodable cache entry");
    }
}
