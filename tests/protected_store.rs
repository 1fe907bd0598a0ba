//! Failure-domain isolation in the protected data store.

mod common;

use common::MockDatabase;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use storeguard::health::HealthStatus;
use storeguard::resilience::{CircuitConfig, CircuitState};
use storeguard::store::{Degraded, OperationHint, OperationKind, ProtectedDataStore};

const READ_SQL: &str = "SELECT * FROM mental_models WHERE category = ?";
const WRITE_SQL: &str = "INSERT INTO user_favorites (user_id, model_id) VALUES (?, ?)";

fn store(db: &MockDatabase) -> ProtectedDataStore {
    ProtectedDataStore::new(Arc::new(db.clone())).unwrap()
}

async fn trip_reads(store: &ProtectedDataStore) {
    for _ in 0..3 {
        let err = store.prepare(READ_SQL, None).bind(["thinking"]).all().await.unwrap_err();
        assert_eq!(err.code(), "WRAPPED_ERROR");
    }
}

#[tokio::test]
async fn test_scenario_c_read_outage_does_not_block_writes() {
    let db = MockDatabase::new();
    let store = store(&db);
    db.fail_reads(true);
    trip_reads(&store).await;
    assert_eq!(store.breaker(OperationKind::Read).state(), CircuitState::Open);

    let reads_before = db.reads();
    let read = store.prepare(READ_SQL, None).bind(["thinking"]);
    let write = store.prepare(WRITE_SQL, None).bind(vec![1, 2]);
    let (read_result, write_result) = tokio::join!(read.all_or_fallback(), write.run());

    let degraded = read_result.unwrap();
    assert!(degraded.is_fallback());
    let fallback = degraded.fallback().unwrap();
    assert_eq!(fallback.items, Some(vec![]));
    assert!(fallback.unavailable);
    assert_eq!(fallback.kind, OperationKind::Read);
    assert_eq!(db.reads(), reads_before);

    assert_eq!(write_result.unwrap().changes, 1);
    assert_eq!(store.breaker(OperationKind::Write).state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_breakers_are_independent() {
    let db = MockDatabase::new();
    let store = store(&db);
    db.fail_reads(true);
    trip_reads(&store).await;

    let m = store.metrics();
    assert_eq!(m.read.state, CircuitState::Open);
    assert_eq!(m.read.failures, 3);
    for other in [&m.write, &m.auth] {
        assert_eq!(other.state, CircuitState::Closed);
        assert_eq!(other.total_requests, 0);
        assert_eq!(other.failures, 0);
    }
}

#[tokio::test]
async fn test_auth_statements_use_auth_breaker() {
    let db = MockDatabase::new();
    let store = store(&db);
    db.fail_reads(true);
    trip_reads(&store).await;

    db.fail_reads(false);
    let row = store
        .prepare("SELECT password_hash FROM users WHERE email = ?", None)
        .bind(["a@example.com"])
        .first()
        .await
        .unwrap();
    assert!(row.is_some());
    assert_eq!(store.metrics().auth.successes, 1);
}

#[tokio::test]
async fn test_health_status_follows_breakers() {
    let db = MockDatabase::new();
    let store = store(&db);
    assert_eq!(store.health_status().status, HealthStatus::Healthy);

    db.fail_reads(true);
    trip_reads(&store).await;
    let report = store.health_status();
    assert_eq!(report.status, HealthStatus::Unhealthy);
    assert_eq!(report.circuits.read.state, CircuitState::Open);
    assert_eq!(report.circuits.write.state, CircuitState::Closed);

    store.reset_breakers();
    assert_eq!(store.health_status().status, HealthStatus::Healthy);
}

#[tokio::test(start_paused = true)]
async fn test_half_open_store_reports_degraded() {
    let db = MockDatabase::new();
    let store = ProtectedDataStore::with_configs(
        Arc::new(db.clone()),
        CircuitConfig::read_database()
            .with_timeout(Duration::from_millis(100))
            .with_max_timeout(Duration::from_millis(500)),
        CircuitConfig::database(),
        CircuitConfig::auth_database(),
    )
    .unwrap();
    db.fail_reads(true);
    trip_reads(&store).await;

    tokio::time::advance(Duration::from_millis(100)).await;
    db.fail_reads(false);
    store.prepare(READ_SQL, None).all().await.unwrap();
    assert_eq!(store.health_status().status, HealthStatus::Degraded);
}

#[tokio::test]
async fn test_wrapped_errors_are_not_replaced_by_fallback() {
    let db = MockDatabase::new();
    let store = store(&db);
    db.fail_writes(true);
    let err = store
        .prepare(WRITE_SQL, None)
        .bind(vec![1, 2])
        .run_or_fallback()
        .await
        .unwrap_err();
    assert_eq!(err.code(), "WRAPPED_ERROR");
    assert!(err.cause().unwrap().to_string().contains("primary unavailable"));
}

#[tokio::test]
async fn test_fallback_payload_from_hint() {
    let db = MockDatabase::new();
    let store = store(&db);
    db.fail_reads(true);
    trip_reads(&store).await;

    let hint = OperationHint::new()
        .with_table("mental_models")
        .with_fallback(json!([{"code": "P1", "name": "First Principles"}]));
    match store.prepare(READ_SQL, Some(hint)).all_or_fallback().await.unwrap() {
        Degraded::Fallback(fb) => {
            assert_eq!(fb.items.unwrap().len(), 1);
            assert!(fb.message.contains("mental_models"));
        }
        Degraded::Fresh(_) => panic!("expected fallback"),
    }
}

#[tokio::test]
async fn test_batch_runs_through_write_breaker() {
    let db = MockDatabase::new();
    let store = store(&db);
    let statements = vec![
        store.prepare(WRITE_SQL, None).bind(vec![1, 2]),
        store.prepare("DELETE FROM user_favorites WHERE id = ?", None).bind([3]),
    ];
    let results = store.batch_execute(&statements).await.unwrap();
    assert_eq!(results.len(), 2);
    let m = store.metrics();
    assert_eq!(m.write.total_requests, 1);
    assert_eq!(m.read.total_requests, 0);
}

#[tokio::test]
async fn test_metrics_report_summary() {
    let db = MockDatabase::new();
    let store = store(&db);
    db.fail_reads(true);
    trip_reads(&store).await;
    store.prepare(WRITE_SQL, None).run().await.unwrap();

    let summary = store.metrics().summary();
    assert_eq!(summary.total_requests, 4);
    assert_eq!(summary.total_failures, 3);
    assert_eq!(summary.total_successes, 1);
    assert_eq!(summary.open_circuits, vec![OperationKind::Read]);

    let report = serde_json::to_value(store.metrics().report()).unwrap();
    assert_eq!(report["summary"]["openCircuits"], json!(["read"]));
    assert_eq!(report["circuits"]["read"]["state"], "OPEN");
}
