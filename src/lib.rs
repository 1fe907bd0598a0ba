//! # storeguard
//!
//! Resilience layer for services that sit in front of a flaky persistent store
//! and take unpredictable inbound traffic.
//!
//! ## Overview
//!
//! Partial outages and traffic spikes should degrade a service gracefully
//! instead of cascading into a total failure. This crate isolates failure
//! domains and bounds the blast radius of a misbehaving dependency with four
//! pieces:
//!
//! - **Circuit breaker**: a three-state machine with self-adjusting timeouts
//!   and lazy recovery probing, via [`resilience`]
//! - **Protected data store**: read, write and auth calls each behind their own
//!   breaker, with typed fallback payloads, via [`store`]
//! - **Cascading cache**: memory, key-value and edge tiers, each allowed to
//!   fail independently, via [`cache`]
//! - **Rate limiter**: tiered fixed windows per client that fail open, via
//!   [`rate_limit`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use storeguard::cache::MemoryKvStore;
//! use storeguard::rate_limit::RequestInfo;
//! use storeguard::GuardConfig;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> storeguard::Result<()> {
//!     storeguard::telemetry::init_tracing()?;
//!     let config = GuardConfig::from_env()?;
//!
//!     let limiter = config.rate_limiter(Arc::new(MemoryKvStore::new()))?;
//!     let request = RequestInfo::get("/v1/models").with_header("cf-connecting-ip", "203.0.113.7");
//!     let decision = limiter.check(&request).await;
//!     println!("{} {:?}", decision.status_code(), decision.headers());
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`resilience`] | Circuit breaker state machine and its errors |
//! | [`store`] | Breaker-protected database access and fallbacks |
//! | [`cache`] | Three-tier read-through cache |
//! | [`rate_limit`] | Tiered fixed-window rate limiting |
//! | [`health`] | Health and metrics reports for monitoring endpoints |
//! | [`config`] | YAML/JSON configuration with environment overrides |
//! | [`telemetry`] | Tracing subscriber setup |

pub mod cache;
pub mod config;
pub mod health;
pub mod rate_limit;
pub mod resilience;
pub mod store;
pub mod telemetry;

pub use config::GuardConfig;
pub use health::{HealthReport, HealthStatus, MetricsReport, StoreMetrics};
pub use rate_limit::{RateLimitDecision, RateLimitExceeded, RateLimiter};
pub use resilience::{CircuitBreaker, CircuitConfig, CircuitError, CircuitMetrics, CircuitState};
pub use store::{OperationHint, OperationKind, ProtectedDataStore};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
