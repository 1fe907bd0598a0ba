//! # Circuit Breaker Module
//!
//! Failure isolation for calls into a dependency that may hang or error.
//!
//! ## States
//!
//! - **Closed**: normal operation, calls pass through
//! - **Open**: `failure_threshold` consecutive failures seen, calls fail fast
//!   without reaching the dependency
//! - **Half-Open**: the cooldown elapsed, calls probe whether it recovered
//!
//! ```text
//! Closed   → Open:     consecutive_failures >= failure_threshold
//! Open     → HalfOpen: next call after the cooldown (lazy)
//! HalfOpen → Closed:   success_threshold consecutive successes
//! HalfOpen → Open:     any failure
//! ```
//!
//! Each call races the operation against `computed_timeout(consecutive_failures)`,
//! an exponential backoff of the base timeout capped at `max_timeout`.
//!
//! ```rust
//! use storeguard::resilience::{CircuitBreaker, CircuitConfig};
//! use std::time::Duration;
//!
//! # async fn demo() -> storeguard::Result<()> {
//! let breaker = CircuitBreaker::new(
//!     CircuitConfig::read_database()
//!         .with_failure_threshold(3)
//!         .with_timeout(Duration::from_millis(500))
//!         .with_max_timeout(Duration::from_secs(5)),
//! )?;
//!
//! let rows = breaker
//!     .execute(|| async { Ok::<_, std::io::Error>(vec![1, 2, 3]) })
//!     .await?;
//! assert_eq!(rows.len(), 3);
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod error;

pub use circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitMetrics, CircuitState};
pub use error::{BoxError, CircuitError};
