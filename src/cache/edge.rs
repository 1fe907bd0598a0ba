//! Edge (HTTP response) cache tier.

use crate::{Error, ErrorContext, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, CACHE_CONTROL, CONTENT_TYPE};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use url::Url;

/// Origin of the synthetic requests used to address edge cache entries.
pub const EDGE_CACHE_ORIGIN: &str = "https://cache.internal/";

/// Synthetic request standing in for a cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheRequest {
    url: Url,
}

impl CacheRequest {
    /// `https://cache.internal/{key}`, with the key as a single path segment.
    pub fn for_key(key: &str) -> Result<Self> {
        let mut url = Url::parse(EDGE_CACHE_ORIGIN).map_err(|e| invalid_key(key, e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid_key(key, "origin cannot carry a path".to_string()))?
            .pop_if_empty()
            .push(key);
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

fn invalid_key(key: &str, details: String) -> Error {
    Error::validation_with_context(
        format!("cannot build edge cache request for key '{}'", key),
        ErrorContext::new().with_details(details).with_source("edge_cache"),
    )
}

/// Cached response: JSON body plus the headers the edge honours.
#[derive(Debug, Clone)]
pub struct EdgeResponse {
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl EdgeResponse {
    /// JSON response cacheable publicly for `max_age`.
    pub fn json(body: impl Into<Bytes>, max_age: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let cache_control = HeaderValue::from_str(&format!("public, max-age={}", max_age.as_secs()))
            .map_err(|e| {
                Error::validation_with_context(
                    "invalid Cache-Control value",
                    ErrorContext::new().with_details(e.to_string()),
                )
            })?;
        headers.insert(CACHE_CONTROL, cache_control);
        Ok(Self {
            headers,
            body: body.into(),
        })
    }

    /// `max-age` directive of `Cache-Control`, if present.
    pub fn max_age(&self) -> Option<Duration> {
        let value = self.headers.get(CACHE_CONTROL)?.to_str().ok()?;
        value
            .split(',')
            .filter_map(|d| d.trim().strip_prefix("max-age="))
            .find_map(|secs| secs.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }

    pub fn text(&self) -> std::result::Result<&str, std::str::Utf8Error> {
        std::str::from_utf8(&self.body)
    }
}

/// Request-keyed HTTP response cache.
#[async_trait]
pub trait EdgeCache: Send + Sync {
    async fn match_request(&self, request: &CacheRequest) -> Result<Option<EdgeResponse>>;
    async fn put(&self, request: &CacheRequest, response: EdgeResponse) -> Result<()>;
    /// Returns whether an entry was removed.
    async fn delete(&self, request: &CacheRequest) -> Result<bool>;
    fn name(&self) -> &'static str {
        "edge"
    }
}

struct EdgeEntry {
    response: EdgeResponse,
    expires_at: Option<Instant>,
}

/// In-process [`EdgeCache`] that honours `max-age`.
#[derive(Default)]
pub struct MemoryEdgeCache {
    entries: RwLock<HashMap<Url, EdgeEntry>>,
}

impl MemoryEdgeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl EdgeCache for MemoryEdgeCache {
    async fn match_request(&self, request: &CacheRequest) -> Result<Option<EdgeResponse>> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.get(request.url()) {
            Some(entry) if entry.expires_at.map_or(false, |at| Instant::now() >= at) => {
                entries.remove(request.url());
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.response.clone())),
            None => Ok(None),
        }
    }

    async fn put(&self, request: &CacheRequest, response: EdgeResponse) -> Result<()> {
        // Responses without max-age are kept until deleted.
        let expires_at = response.max_age().map(|age| Instant::now() + age);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                request.url().clone(),
                EdgeEntry {
                    response,
                    expires_at,
                },
            );
        Ok(())
    }

    async fn delete(&self, request: &CacheRequest) -> Result<bool> {
        Ok(self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(request.url())
            .is_some())
    }

    fn name(&self) -> &'static str {
        "memory-edge"
    }
}
