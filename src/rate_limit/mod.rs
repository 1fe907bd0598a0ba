//! Tiered fixed-window rate limiting.
//!
//! Requests are classified into an endpoint tier by path and method, attributed
//! to a client, and counted per `(tier, client)` in fixed windows stored in a
//! shared [`KvStore`](crate::cache::KvStore).
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`RateLimiter`] | Checks a request and returns a [`RateLimitDecision`] |
//! | [`TierTable`] | Ordered path rules and per-tier limits |
//! | [`ClientIdentity`] | Bucket a request is counted against |
//! | [`RequestInfo`] | Method, path and headers supplied by the router |
//!
//! The limiter fails open: if the counter store errors, the request is allowed
//! and the decision is marked degraded.

pub mod client;
pub mod limiter;
pub mod tier;

pub use client::{ClientIdentity, RequestInfo, FORWARDED_FOR_HEADER, TRUSTED_CLIENT_IP_HEADER};
pub use limiter::{
    RateLimitDecision, RateLimitExceeded, RateLimitRecord, RateLimitStatus, RateLimiter,
    LIMIT_HEADER, REMAINING_HEADER, RESET_HEADER,
};
pub use tier::{RateLimitTier, RouteTarget, TierLimit, TierRule, TierTable};
