use super::error::{BoxError, CircuitError};
use crate::{Error, ErrorContext, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Backoff never multiplies the base timeout by more than 2^10.
const MAX_BACKOFF_EXPONENT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation.
    Closed,
    /// Tripped; calls fail fast.
    Open,
    /// Probing whether the dependency recovered.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CircuitConfig {
    /// Name used in logs, errors and metrics.
    pub name: String,
    /// Consecutive failures that trip the breaker.
    pub failure_threshold: u32,
    /// Base call timeout, and the first open cooldown.
    pub timeout: Duration,
    /// Upper bound for the backed-off timeout.
    pub max_timeout: Duration,
    /// Consecutive half-open successes needed to close again.
    pub success_threshold: u32,
    /// Window over which failure rates are reported.
    pub monitoring_window: Duration,
}

impl CircuitConfig {
    /// General database profile, used for writes.
    pub fn database() -> Self {
        Self {
            name: "database".to_string(),
            failure_threshold: 5,
            timeout: Duration::from_secs(10),
            max_timeout: Duration::from_secs(60),
            success_threshold: 3,
            monitoring_window: Duration::from_secs(60),
        }
    }

    /// Auth profile: tolerates more failures since every user action depends on it.
    pub fn auth_database() -> Self {
        Self {
            name: "auth-database".to_string(),
            failure_threshold: 10,
            timeout: Duration::from_secs(5),
            max_timeout: Duration::from_secs(30),
            success_threshold: 2,
            monitoring_window: Duration::from_secs(30),
        }
    }

    /// Read profile: trips early, reads are cache- and retry-safe.
    pub fn read_database() -> Self {
        Self {
            name: "read-database".to_string(),
            failure_threshold: 3,
            timeout: Duration::from_secs(3),
            max_timeout: Duration::from_secs(15),
            success_threshold: 2,
            monitoring_window: Duration::from_secs(30),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_timeout(mut self, max_timeout: Duration) -> Self {
        self.max_timeout = max_timeout;
        self
    }

    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn with_monitoring_window(mut self, window: Duration) -> Self {
        self.monitoring_window = window;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let fail = |field: &str, msg: &str| {
            Err(Error::configuration_with_context(
                msg,
                ErrorContext::new()
                    .with_field_path(format!("circuit.{}", field))
                    .with_details(format!("breaker '{}'", self.name))
                    .with_source("circuit_config"),
            ))
        };
        if self.failure_threshold == 0 {
            return fail("failure_threshold", "failureThreshold must be greater than 0");
        }
        if self.timeout.is_zero() {
            return fail("timeout", "timeout must be greater than 0");
        }
        if self.max_timeout <= self.timeout {
            return fail("max_timeout", "maxTimeout must be greater than timeout");
        }
        if self.success_threshold == 0 {
            return fail("success_threshold", "successThreshold must be greater than 0");
        }
        if self.monitoring_window.is_zero() {
            return fail("monitoring_window", "monitoringWindow must be greater than 0");
        }
        Ok(())
    }

    /// `min(timeout * 2^(n-1), max_timeout)`, with `n == 0` giving the base timeout.
    ///
    /// Non-decreasing in `n` and never above `max_timeout`.
    pub fn computed_timeout(&self, consecutive_failures: u32) -> Duration {
        let exponent = consecutive_failures
            .saturating_sub(1)
            .min(MAX_BACKOFF_EXPONENT);
        self.timeout
            .saturating_mul(1u32 << exponent)
            .min(self.max_timeout)
    }
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self::database()
    }
}

/// Point-in-time view of a breaker. Timestamps are unix epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitMetrics {
    pub name: String,
    pub state: CircuitState,
    pub failures: u64,
    pub successes: u64,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_failure_time: Option<u64>,
    pub last_success_time: Option<u64>,
    pub opened_at: Option<u64>,
    pub total_requests: u64,
    pub circuit_opens: u64,
    pub failure_rate: f64,
    pub uptime_ms: u64,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    failures: u64,
    successes: u64,
    consecutive_failures: u32,
    consecutive_successes: u32,
    last_failure_time: Option<SystemTime>,
    last_success_time: Option<SystemTime>,
    opened_at: Option<Instant>,
    opened_at_wall: Option<SystemTime>,
    /// Trips since the breaker last closed; drives the cooldown backoff.
    trips_since_close: u32,
    total_requests: u64,
    circuit_opens: u64,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            successes: 0,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure_time: None,
            last_success_time: None,
            opened_at: None,
            opened_at_wall: None,
            trips_since_close: 0,
            total_requests: 0,
            circuit_opens: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    from: CircuitState,
    to: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
}

/// Three-state circuit breaker with a self-adjusting call timeout.
///
/// - Counts consecutive failures and trips at `failure_threshold`
/// - Fails fast while open, without touching the dependency
/// - Lazily moves to half-open once the cooldown elapsed
/// - Closes after `success_threshold` half-open successes, reopens on any half-open failure
///
/// Bookkeeping happens under a mutex that is never held across an await, so a
/// breaker can be shared freely between tasks.
pub struct CircuitBreaker {
    config: CircuitConfig,
    created_at: Instant,
    inner: Mutex<Inner>,
}

impl fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.config.name)
            .field("state", &self.state())
            .finish()
    }
}

impl CircuitBreaker {
    /// Builds a breaker, failing if the config violates its invariants.
    pub fn new(config: CircuitConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            created_at: Instant::now(),
            inner: Mutex::new(Inner::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CircuitConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    /// Run `operation` under breaker protection.
    ///
    /// Dropping the operation future on timeout cancels it.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> std::result::Result<T, CircuitError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<BoxError>,
    {
        self.execute_with_cancel(|_| operation()).await
    }

    /// Like [`execute`](Self::execute), but hands the operation a token that is
    /// cancelled when the breaker gives up on it. Operations that spawn detached
    /// work should watch the token.
    pub async fn execute_with_cancel<T, E, F, Fut>(
        &self,
        operation: F,
    ) -> std::result::Result<T, CircuitError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<BoxError>,
    {
        let budget = self.admit()?;
        let token = CancellationToken::new();

        match tokio::time::timeout(budget, operation(token.clone())).await {
            Ok(Ok(value)) => {
                self.on_success();
                Ok(value)
            }
            Ok(Err(err)) => {
                let err: BoxError = err.into();
                let (state, metrics) = self.on_failure();
                // A nested breaker already described the failure.
                let err = match err.downcast::<CircuitError>() {
                    Ok(nested) => return Err(*nested),
                    Err(err) => err,
                };
                tracing::error!(
                    breaker = %self.config.name,
                    state = %state,
                    consecutive_failures = metrics.consecutive_failures,
                    error = %err,
                    "operation failed"
                );
                Err(CircuitError::Operation {
                    breaker: self.config.name.clone(),
                    state,
                    metrics: Box::new(metrics),
                    source: err,
                })
            }
            Err(_elapsed) => {
                token.cancel();
                let (state, metrics) = self.on_failure();
                tracing::error!(
                    breaker = %self.config.name,
                    state = %state,
                    timeout_ms = budget.as_millis() as u64,
                    "operation timed out"
                );
                Err(CircuitError::Timeout {
                    breaker: self.config.name.clone(),
                    state,
                    metrics: Box::new(metrics),
                    after: budget,
                })
            }
        }
    }

    /// Side-effect-free snapshot.
    pub fn metrics(&self) -> CircuitMetrics {
        let inner = self.lock();
        self.snapshot(&inner)
    }

    /// Back to a zero-state closed breaker. Meant for admin tooling and tests.
    pub fn reset(&self) {
        let mut inner = self.lock();
        *inner = Inner::new();
        drop(inner);
        tracing::info!(breaker = %self.config.name, "circuit breaker reset");
    }

    /// Counts the request, applies lazy transitions and either rejects the call
    /// or returns the timeout budget for it.
    fn admit(&self) -> std::result::Result<Duration, CircuitError> {
        let mut inner = self.lock();
        inner.total_requests = inner.total_requests.saturating_add(1);
        let transition = self.evaluate(&mut inner);

        if inner.state == CircuitState::Open {
            let metrics = self.snapshot(&inner);
            drop(inner);
            self.log_transition(transition);
            tracing::debug!(
                breaker = %self.config.name,
                total_requests = metrics.total_requests,
                "rejecting call while circuit is open"
            );
            return Err(CircuitError::Open {
                breaker: self.config.name.clone(),
                state: CircuitState::Open,
                metrics: Box::new(metrics),
            });
        }

        let budget = self.config.computed_timeout(inner.consecutive_failures);
        drop(inner);
        self.log_transition(transition);
        Ok(budget)
    }

    fn evaluate(&self, inner: &mut Inner) -> Option<Transition> {
        match inner.state {
            CircuitState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    return Some(self.open(inner));
                }
            }
            CircuitState::Open => {
                let cooldown = self.config.computed_timeout(inner.trips_since_close);
                let elapsed = inner.opened_at.map(|at| at.elapsed()).unwrap_or_default();
                if elapsed >= cooldown {
                    let from = inner.state;
                    inner.state = CircuitState::HalfOpen;
                    inner.consecutive_successes = 0;
                    return Some(self.transition(from, inner));
                }
            }
            CircuitState::HalfOpen => {
                if inner.consecutive_successes >= self.config.success_threshold {
                    return Some(self.close(inner));
                }
            }
        }
        None
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        inner.successes = inner.successes.saturating_add(1);
        inner.consecutive_successes = inner.consecutive_successes.saturating_add(1);
        inner.consecutive_failures = 0;
        inner.last_success_time = Some(SystemTime::now());

        let transition = if inner.state == CircuitState::HalfOpen
            && inner.consecutive_successes >= self.config.success_threshold
        {
            Some(self.close(&mut inner))
        } else {
            None
        };
        drop(inner);
        self.log_transition(transition);
    }

    fn on_failure(&self) -> (CircuitState, CircuitMetrics) {
        let mut inner = self.lock();
        inner.failures = inner.failures.saturating_add(1);
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.consecutive_successes = 0;
        inner.last_failure_time = Some(SystemTime::now());

        let transition = match inner.state {
            CircuitState::HalfOpen => Some(self.open(&mut inner)),
            CircuitState::Closed
                if inner.consecutive_failures >= self.config.failure_threshold =>
            {
                Some(self.open(&mut inner))
            }
            _ => None,
        };
        let state = inner.state;
        let metrics = self.snapshot(&inner);
        drop(inner);
        self.log_transition(transition);
        (state, metrics)
    }

    fn open(&self, inner: &mut Inner) -> Transition {
        let from = inner.state;
        inner.state = CircuitState::Open;
        inner.opened_at = Some(Instant::now());
        inner.opened_at_wall = Some(SystemTime::now());
        inner.circuit_opens = inner.circuit_opens.saturating_add(1);
        inner.trips_since_close = inner.trips_since_close.saturating_add(1);
        inner.consecutive_successes = 0;
        self.transition(from, inner)
    }

    fn close(&self, inner: &mut Inner) -> Transition {
        let from = inner.state;
        inner.state = CircuitState::Closed;
        inner.opened_at = None;
        inner.opened_at_wall = None;
        inner.trips_since_close = 0;
        inner.consecutive_failures = 0;
        self.transition(from, inner)
    }

    fn transition(&self, from: CircuitState, inner: &Inner) -> Transition {
        Transition {
            from,
            to: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
        }
    }

    fn log_transition(&self, transition: Option<Transition>) {
        let Some(t) = transition else { return };
        let reason = match t.to {
            CircuitState::Open => format!("{} consecutive failures", t.consecutive_failures),
            CircuitState::HalfOpen => "cooldown elapsed, probing for recovery".to_string(),
            CircuitState::Closed => format!("{} consecutive successes", t.consecutive_successes),
        };
        tracing::warn!(
            breaker = %self.config.name,
            from = %t.from,
            to = %t.to,
            reason = %reason,
            "circuit state changed"
        );
    }

    fn snapshot(&self, inner: &Inner) -> CircuitMetrics {
        let failure_rate = if inner.total_requests > 0 {
            inner.failures as f64 / inner.total_requests as f64
        } else {
            0.0
        };
        CircuitMetrics {
            name: self.config.name.clone(),
            state: inner.state,
            failures: inner.failures,
            successes: inner.successes,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            last_failure_time: inner.last_failure_time.map(epoch_ms),
            last_success_time: inner.last_success_time.map(epoch_ms),
            opened_at: inner.opened_at_wall.map(epoch_ms),
            total_requests: inner.total_requests,
            circuit_opens: inner.circuit_opens,
            failure_rate,
            uptime_ms: self.created_at.elapsed().as_millis() as u64,
        }
    }

    // Bookkeeping never panics while holding the lock, so a poisoned guard is still consistent.
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn epoch_ms(t: SystemTime) -> u64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn scenario_config() -> CircuitConfig {
        CircuitConfig::database()
            .with_name("test")
            .with_failure_threshold(3)
            .with_timeout(Duration::from_millis(100))
            .with_max_timeout(Duration::from_millis(500))
            .with_success_threshold(2)
    }

    async fn fail(cb: &CircuitBreaker) -> std::result::Result<(), CircuitError> {
        cb.execute(|| async { Err::<(), _>("boom") }).await
    }

    async fn succeed(cb: &CircuitBreaker) -> std::result::Result<u32, CircuitError> {
        cb.execute(|| async { Ok::<_, BoxError>(7) }).await
    }

    #[test]
    fn test_presets_are_valid() {
        for cfg in [
            CircuitConfig::database(),
            CircuitConfig::auth_database(),
            CircuitConfig::read_database(),
        ] {
            assert!(cfg.validate().is_ok(), "{} should be valid", cfg.name);
        }
    }

    #[test]
    fn test_invalid_configs_fail_construction() {
        let base = scenario_config();
        let cases = vec![
            base.clone().with_failure_threshold(0),
            base.clone().with_timeout(Duration::ZERO),
            base.clone().with_max_timeout(Duration::from_millis(100)),
            base.clone().with_success_threshold(0),
            base.clone().with_monitoring_window(Duration::ZERO),
        ];
        for cfg in cases {
            let err = CircuitBreaker::new(cfg).unwrap_err();
            assert!(matches!(err, Error::Configuration { .. }));
        }
    }

    #[test]
    fn test_computed_timeout_backoff() {
        let cfg = scenario_config();
        assert_eq!(cfg.computed_timeout(0), Duration::from_millis(100));
        assert_eq!(cfg.computed_timeout(1), Duration::from_millis(100));
        assert_eq!(cfg.computed_timeout(2), Duration::from_millis(200));
        assert_eq!(cfg.computed_timeout(3), Duration::from_millis(400));
        assert_eq!(cfg.computed_timeout(4), Duration::from_millis(500));
        assert_eq!(cfg.computed_timeout(u32::MAX), Duration::from_millis(500));
    }

    #[test]
    fn test_computed_timeout_monotonic_and_capped() {
        let cfg = CircuitConfig::read_database();
        let mut previous = Duration::ZERO;
        for n in 0..64 {
            let t = cfg.computed_timeout(n);
            assert!(t >= previous, "timeout decreased at n={}", n);
            assert!(t <= cfg.max_timeout);
            previous = t;
        }
    }

    #[tokio::test]
    async fn test_initial_metrics() {
        let cb = CircuitBreaker::new(scenario_config()).unwrap();
        let m = cb.metrics();
        assert_eq!(m.state, CircuitState::Closed);
        assert_eq!(m.total_requests, 0);
        assert_eq!(m.failure_rate, 0.0);
        assert!(m.opened_at.is_none());
    }

    #[tokio::test]
    async fn test_opens_after_exactly_threshold_failures() {
        for threshold in 1..=6 {
            let cfg = scenario_config().with_failure_threshold(threshold);
            let cb = CircuitBreaker::new(cfg).unwrap();
            for _ in 0..threshold - 1 {
                let _ = fail(&cb).await;
                assert_eq!(cb.state(), CircuitState::Closed);
            }
            let _ = fail(&cb).await;
            assert_eq!(cb.state(), CircuitState::Open);
            assert_eq!(cb.metrics().circuit_opens, 1);
        }
    }

    #[tokio::test]
    async fn test_success_resets_consecutive_failures() {
        let cb = CircuitBreaker::new(scenario_config()).unwrap();
        let _ = fail(&cb).await;
        let _ = fail(&cb).await;
        assert_eq!(cb.metrics().consecutive_failures, 2);

        succeed(&cb).await.unwrap();
        let m = cb.metrics();
        assert_eq!(m.consecutive_failures, 0);
        assert_eq!(m.consecutive_successes, 1);
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_circuit_never_invokes_operation() {
        let cb = CircuitBreaker::new(scenario_config()).unwrap();
        for _ in 0..3 {
            let _ = fail(&cb).await;
        }

        let calls = AtomicU32::new(0);
        for _ in 0..10 {
            let err = cb
                .execute(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>(())
                })
                .await
                .unwrap_err();
            assert!(err.is_open());
            assert_eq!(err.code(), "CIRCUIT_OPEN");
            assert_eq!(err.breaker(), "test");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cb.metrics().total_requests, 13);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens_with_longer_cooldown() {
        let cb = CircuitBreaker::new(scenario_config()).unwrap();
        for _ in 0..3 {
            let _ = fail(&cb).await;
        }
        tokio::time::sleep(Duration::from_millis(150)).await;

        // Probe fails: straight back to open.
        let err = fail(&cb).await.unwrap_err();
        assert_eq!(err.code(), "WRAPPED_ERROR");
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.metrics().circuit_opens, 2);

        // Second trip doubles the cooldown to 200ms.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(succeed(&cb).await.unwrap_err().is_open());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(succeed(&cb).await.is_ok());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure_and_cancels() {
        let cb = CircuitBreaker::new(scenario_config()).unwrap();
        let observed = Arc::new(AtomicU32::new(0));
        let seen = observed.clone();

        let err = cb
            .execute_with_cancel(|token| async move {
                let watcher = token.clone();
                tokio::spawn(async move {
                    watcher.cancelled().await;
                    seen.fetch_add(1, Ordering::SeqCst);
                });
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok::<_, BoxError>(())
            })
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(err.code(), "TIMEOUT");
        assert_eq!(err.metrics().failures, 1);
        for _ in 0..10 {
            if observed.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_wrapped_error_preserves_cause() {
        let cb = CircuitBreaker::new(scenario_config()).unwrap();
        let err = cb
            .execute(|| async {
                Err::<(), _>(std::io::Error::new(std::io::ErrorKind::Other, "disk on fire"))
            })
            .await
            .unwrap_err();
        let cause = err.cause().expect("cause should be preserved");
        assert_eq!(cause.to_string(), "disk on fire");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[tokio::test]
    async fn test_nested_breaker_error_is_not_rewrapped() {
        let outer = CircuitBreaker::new(scenario_config().with_name("outer")).unwrap();
        let inner = CircuitBreaker::new(scenario_config().with_name("inner")).unwrap();
        for _ in 0..3 {
            let _ = fail(&inner).await;
        }

        let err = outer
            .execute(|| async { inner.execute(|| async { Ok::<_, BoxError>(()) }).await })
            .await
            .unwrap_err();
        assert_eq!(err.breaker(), "inner");
        assert!(err.is_open());
        assert_eq!(outer.metrics().failures, 1);
    }

    #[tokio::test]
    async fn test_reset_returns_to_zero_state() {
        let cb = CircuitBreaker::new(scenario_config()).unwrap();
        for _ in 0..3 {
            let _ = fail(&cb).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        cb.reset();
        let m = cb.metrics();
        assert_eq!(m.state, CircuitState::Closed);
        assert_eq!(m.failures, 0);
        assert_eq!(m.total_requests, 0);
        assert_eq!(m.circuit_opens, 0);
        assert!(succeed(&cb).await.is_ok());
    }

    #[tokio::test]
    async fn test_failure_rate() {
        let cb = CircuitBreaker::new(scenario_config().with_failure_threshold(10)).unwrap();
        let _ = fail(&cb).await;
        succeed(&cb).await.unwrap();
        succeed(&cb).await.unwrap();
        let _ = fail(&cb).await;
        let m = cb.metrics();
        assert_eq!(m.total_requests, 4);
        assert!((m.failure_rate - 0.5).abs() < f64::EPSILON);
        assert!(m.last_failure_time.is_some());
        assert!(m.last_success_time.is_some());
    }

    #[test]
    fn test_metrics_serialize_camel_case() {
        let cb = CircuitBreaker::new(scenario_config()).unwrap();
        let json = serde_json::to_value(cb.metrics()).unwrap();
        assert_eq!(json["state"], "CLOSED");
        assert!(json.get("consecutiveFailures").is_some());
        assert!(json.get("circuitOpens").is_some());
    }
}
