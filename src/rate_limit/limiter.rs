//! Fixed-window rate limiter over a shared key-value store.

use super::client::{ClientIdentity, RequestInfo};
use super::tier::{RateLimitTier, RouteTarget, TierLimit, TierTable};
use crate::cache::KvStore;
use crate::{Error, Result};
use arc_swap::ArcSwap;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error as ThisError;

pub const LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RESET_HEADER: &str = "x-ratelimit-reset";

/// Stored counter for one (tier, client, window).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitRecord {
    pub count: u32,
    /// Unix seconds at which the window closes.
    pub reset_at: u64,
}

/// Quota exhausted for the current window.
#[derive(Debug, Clone, PartialEq, Eq, ThisError, Serialize)]
#[serde(rename_all = "camelCase")]
#[error("{tier} tier limit of {limit} requests reached for {client}, retry after {retry_after}s")]
pub struct RateLimitExceeded {
    pub tier: RateLimitTier,
    pub client: String,
    pub limit: u32,
    /// Seconds until the window resets; at least 1.
    pub retry_after: u64,
    /// Unix seconds at which the window resets.
    pub reset_at: u64,
}

impl RateLimitExceeded {
    /// JSON body for the 429 response.
    pub fn body(&self) -> Value {
        json!({
            "error": "Too many requests, please try again later",
            "retryAfter": self.retry_after,
            "limit": self.limit,
            "tier": self.tier,
            "resetAt": self.reset_at,
        })
    }
}

/// Outcome for a request that was allowed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub tier: RateLimitTier,
    pub client: String,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: u64,
    /// The counter store failed and the request was let through unchecked.
    pub degraded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// Path is exempt from limiting.
    Bypassed,
    Allowed(RateLimitStatus),
    Limited(RateLimitExceeded),
}

impl RateLimitDecision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, RateLimitDecision::Limited(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            RateLimitDecision::Limited(_) => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::OK,
        }
    }

    /// Headers to attach to the response. Empty for bypassed requests.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        match self {
            RateLimitDecision::Bypassed => {}
            RateLimitDecision::Allowed(s) => {
                insert_number(&mut headers, HeaderName::from_static(LIMIT_HEADER), s.limit as u64);
                insert_number(&mut headers, HeaderName::from_static(REMAINING_HEADER), s.remaining as u64);
                insert_number(&mut headers, HeaderName::from_static(RESET_HEADER), s.reset_at);
            }
            RateLimitDecision::Limited(e) => {
                insert_number(&mut headers, HeaderName::from_static(LIMIT_HEADER), e.limit as u64);
                insert_number(&mut headers, HeaderName::from_static(REMAINING_HEADER), 0);
                insert_number(&mut headers, HeaderName::from_static(RESET_HEADER), e.reset_at);
                insert_number(&mut headers, RETRY_AFTER, e.retry_after);
            }
        }
        headers
    }

    /// `Ok` unless limited, for callers that prefer `?`.
    pub fn into_result(self) -> Result<Option<RateLimitStatus>> {
        match self {
            RateLimitDecision::Bypassed => Ok(None),
            RateLimitDecision::Allowed(status) => Ok(Some(status)),
            RateLimitDecision::Limited(e) => Err(Error::RateLimited(e)),
        }
    }
}

fn insert_number(headers: &mut HeaderMap, name: HeaderName, value: u64) {
    headers.insert(name, HeaderValue::from(value));
}

/// Tiered fixed-window limiter.
///
/// Counters live in a [`KvStore`] shared by all instances. Read-increment-write
/// is not atomic, so concurrent requests may briefly overshoot a limit. Any
/// store failure lets the request through.
pub struct RateLimiter {
    store: Arc<dyn KvStore>,
    tiers: ArcSwap<TierTable>,
    key_prefix: String,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self {
            store,
            tiers: ArcSwap::from_pointee(TierTable::default()),
            key_prefix: "rate_limit".to_string(),
        }
    }

    pub fn with_tiers(self, tiers: TierTable) -> Result<Self> {
        tiers.validate()?;
        self.tiers.store(Arc::new(tiers));
        Ok(self)
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn tiers(&self) -> Arc<TierTable> {
        self.tiers.load_full()
    }

    /// Swaps the tier table in place; in-flight checks keep the old one.
    pub fn reload_tiers(&self, tiers: TierTable) -> Result<()> {
        tiers.validate()?;
        self.tiers.store(Arc::new(tiers));
        tracing::info!("rate limit tiers reloaded");
        Ok(())
    }

    /// Limit after the identity adjustment.
    pub fn effective_limit(base: u32, identity: &ClientIdentity, verified: bool) -> u32 {
        if identity.is_unknown() {
            (base / 3).max(1)
        } else if verified {
            base.saturating_mul(3) / 2
        } else {
            base
        }
    }

    pub async fn check(&self, request: &RequestInfo) -> RateLimitDecision {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.check_at(request, now).await
    }

    /// [`check`](Self::check) against an explicit clock, in Unix seconds.
    pub async fn check_at(&self, request: &RequestInfo, now: u64) -> RateLimitDecision {
        let tiers = self.tiers.load_full();
        let tier = match tiers.resolve(&request.method, &request.path) {
            RouteTarget::Bypass => return RateLimitDecision::Bypassed,
            RouteTarget::Tier(tier) => tier,
        };
        let identity = ClientIdentity::from_request(request);
        let client = identity.to_string();

        let Some(tier_limit) = tiers.limit(tier) else {
            tracing::warn!(tier = %tier, "no limit configured for tier, allowing request");
            return RateLimitDecision::Allowed(RateLimitStatus {
                tier,
                client,
                limit: 0,
                remaining: 0,
                reset_at: now,
                degraded: true,
            });
        };
        let limit = Self::effective_limit(tier_limit.max_requests, &identity, request.verified_identity);
        let window = Window::at(now, tier_limit);
        let key = format!("{}:{}:{}:{}", self.key_prefix, tier, client, window.start);

        let count = match self.current_count(&key, now).await {
            Ok(count) => count,
            Err(e) => return Self::fail_open(tier, client, limit, window, &request.path, e),
        };

        if count >= limit {
            let retry_after = window.reset_at.saturating_sub(now).max(1);
            tracing::warn!(
                tier = %tier,
                client = %client,
                limit,
                retry_after,
                path = %request.path,
                "rate limit exceeded"
            );
            return RateLimitDecision::Limited(RateLimitExceeded {
                tier,
                client,
                limit,
                retry_after,
                reset_at: window.reset_at,
            });
        }

        let record = RateLimitRecord {
            count: count + 1,
            reset_at: window.reset_at,
        };
        if let Err(e) = self.store_record(&key, record, tier_limit).await {
            return Self::fail_open(tier, client, limit, window, &request.path, e);
        }

        RateLimitDecision::Allowed(RateLimitStatus {
            tier,
            client,
            limit,
            remaining: limit - count - 1,
            reset_at: window.reset_at,
            degraded: false,
        })
    }

    async fn current_count(&self, key: &str, now: u64) -> Result<u32> {
        let Some(raw) = self.store.get(key).await? else {
            return Ok(0);
        };
        match serde_json::from_str::<RateLimitRecord>(&raw) {
            Ok(record) if record.reset_at > now => Ok(record.count),
            Ok(_) => Ok(0),
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding unreadable rate limit record");
                Ok(0)
            }
        }
    }

    async fn store_record(&self, key: &str, record: RateLimitRecord, limit: TierLimit) -> Result<()> {
        let payload = serde_json::to_string(&record)?;
        self.store.put(key, &payload, limit.window()).await
    }

    fn fail_open(
        tier: RateLimitTier,
        client: String,
        limit: u32,
        window: Window,
        path: &str,
        error: Error,
    ) -> RateLimitDecision {
        tracing::warn!(
            tier = %tier,
            client = %client,
            path,
            error = %error,
            "rate limit store unavailable, allowing request"
        );
        RateLimitDecision::Allowed(RateLimitStatus {
            tier,
            client,
            limit,
            remaining: limit,
            reset_at: window.reset_at,
            degraded: true,
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    start: u64,
    reset_at: u64,
}

impl Window {
    fn at(now: u64, limit: TierLimit) -> Self {
        let len = limit.window_secs.max(1);
        let start = now - now % len;
        Self {
            start,
            reset_at: start + len,
        }
    }
}
