//! Health and metrics reports for an operational monitoring endpoint.
//!
//! Reports are assembled on demand from breaker snapshots; nothing here is cached.

use crate::resilience::{CircuitMetrics, CircuitState};
use crate::store::OperationKind;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Unhealthy if any circuit is open, degraded if any is half-open.
    pub fn from_states<I: IntoIterator<Item = CircuitState>>(states: I) -> Self {
        let mut status = HealthStatus::Healthy;
        for state in states {
            match state {
                CircuitState::Open => return HealthStatus::Unhealthy,
                CircuitState::HalfOpen => status = HealthStatus::Degraded,
                CircuitState::Closed => {}
            }
        }
        status
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitSummary {
    pub state: CircuitState,
    pub failures: u64,
    pub failure_rate: f64,
    pub uptime_ms: u64,
}

impl From<&CircuitMetrics> for CircuitSummary {
    fn from(m: &CircuitMetrics) -> Self {
        Self {
            state: m.state,
            failures: m.failures,
            failure_rate: m.failure_rate,
            uptime_ms: m.uptime_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitSummaries {
    pub read: CircuitSummary,
    pub write: CircuitSummary,
    pub auth: CircuitSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub circuits: CircuitSummaries,
}

/// Snapshots of the three data-store breakers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreMetrics {
    pub read: CircuitMetrics,
    pub write: CircuitMetrics,
    pub auth: CircuitMetrics,
}

impl StoreMetrics {
    pub fn get(&self, kind: OperationKind) -> &CircuitMetrics {
        match kind {
            OperationKind::Read => &self.read,
            OperationKind::Write => &self.write,
            OperationKind::Auth => &self.auth,
        }
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            status: HealthStatus::from_states([self.read.state, self.write.state, self.auth.state]),
            circuits: CircuitSummaries {
                read: (&self.read).into(),
                write: (&self.write).into(),
                auth: (&self.auth).into(),
            },
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        let all = [&self.read, &self.write, &self.auth];
        MetricsSummary {
            total_failures: all.iter().map(|m| m.failures).sum(),
            total_successes: all.iter().map(|m| m.successes).sum(),
            total_requests: all.iter().map(|m| m.total_requests).sum(),
            open_circuits: OperationKind::ALL
                .into_iter()
                .filter(|k| self.get(*k).state == CircuitState::Open)
                .collect(),
            average_failure_rate: all.iter().map(|m| m.failure_rate).sum::<f64>() / all.len() as f64,
        }
    }

    /// Full report with a wall-clock timestamp, ready to serialize.
    pub fn report(&self) -> MetricsReport {
        MetricsReport {
            timestamp_ms: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
            summary: self.summary(),
            circuits: self.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub total_failures: u64,
    pub total_successes: u64,
    pub total_requests: u64,
    pub open_circuits: Vec<OperationKind>,
    pub average_failure_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsReport {
    pub timestamp_ms: u64,
    pub circuits: StoreMetrics,
    pub summary: MetricsSummary,
}
