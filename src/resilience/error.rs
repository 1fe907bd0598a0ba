//! Circuit breaker error types

use super::circuit_breaker::{CircuitMetrics, CircuitState};
use std::time::Duration;

/// Boxed error produced by a wrapped operation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error surfaced by [`CircuitBreaker::execute`](super::CircuitBreaker::execute).
///
/// Every variant carries the breaker name, the state the breaker was in when the
/// error was produced, and a metrics snapshot taken at that moment.
#[derive(Debug, thiserror::Error)]
pub enum CircuitError {
    /// The breaker is open; the operation was not invoked.
    #[error("circuit breaker '{breaker}' is {state}, failing fast to prevent cascading failures")]
    Open {
        breaker: String,
        state: CircuitState,
        metrics: Box<CircuitMetrics>,
    },

    /// The operation did not settle within the breaker's current timeout.
    #[error("operation timed out after {}ms in '{breaker}'", .after.as_millis())]
    Timeout {
        breaker: String,
        state: CircuitState,
        metrics: Box<CircuitMetrics>,
        after: Duration,
    },

    /// The operation itself failed. The original cause is kept as the source.
    #[error("operation failed in '{breaker}': {source}")]
    Operation {
        breaker: String,
        state: CircuitState,
        metrics: Box<CircuitMetrics>,
        #[source]
        source: BoxError,
    },
}

impl CircuitError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            CircuitError::Open { .. } => "CIRCUIT_OPEN",
            CircuitError::Timeout { .. } => "TIMEOUT",
            CircuitError::Operation { .. } => "WRAPPED_ERROR",
        }
    }

    pub fn breaker(&self) -> &str {
        match self {
            CircuitError::Open { breaker, .. }
            | CircuitError::Timeout { breaker, .. }
            | CircuitError::Operation { breaker, .. } => breaker,
        }
    }

    pub fn state(&self) -> CircuitState {
        match self {
            CircuitError::Open { state, .. }
            | CircuitError::Timeout { state, .. }
            | CircuitError::Operation { state, .. } => *state,
        }
    }

    pub fn metrics(&self) -> &CircuitMetrics {
        match self {
            CircuitError::Open { metrics, .. }
            | CircuitError::Timeout { metrics, .. }
            | CircuitError::Operation { metrics, .. } => metrics,
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, CircuitError::Timeout { .. })
    }

    /// True when the dependency was not actually reached or did not answer,
    /// i.e. a degraded substitute is appropriate.
    pub fn is_unavailable(&self) -> bool {
        self.is_open() || self.is_timeout()
    }

    /// Borrow the wrapped cause, if the operation itself failed.
    pub fn cause(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            CircuitError::Operation { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
