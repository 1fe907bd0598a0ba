//! Process-local memory tier.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

struct MemoryEntry {
    payload: String,
    expires_at: Instant,
}

/// LRU-bounded map of serialized payloads with per-entry expiry.
pub struct MemoryTier {
    entries: Mutex<LruCache<String, MemoryEntry>>,
}

impl MemoryTier {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Expired entries are dropped on read.
    pub fn get(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let expired = match entries.get(key) {
            Some(entry) if Instant::now() < entry.expires_at => return Some(entry.payload.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        None
    }

    pub fn insert(&self, key: &str, payload: String, ttl: Duration) {
        let entry = MemoryEntry {
            payload,
            expires_at: Instant::now() + ttl,
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(key.to_string(), entry);
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop(key)
            .is_some()
    }

    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
