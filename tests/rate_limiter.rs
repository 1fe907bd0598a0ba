//! Tiered fixed-window rate limiting against a shared KV store.

mod common;

use common::BrokenKvStore;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use std::sync::Arc;
use storeguard::cache::{KvStore, MemoryKvStore};
use storeguard::rate_limit::{
    RateLimitDecision, RateLimitTier, RateLimiter, RequestInfo, RouteTarget, TierLimit, TierRule,
    TierTable, TRUSTED_CLIENT_IP_HEADER,
};

const NOW: u64 = 1_000;

fn limiter_with(tier: RateLimitTier, max: u32) -> (RateLimiter, Arc<MemoryKvStore>) {
    let store = Arc::new(MemoryKvStore::new());
    let limiter = RateLimiter::new(store.clone())
        .with_tiers(TierTable::default().with_limit(tier, TierLimit::new(max, 60)))
        .unwrap();
    (limiter, store)
}

fn from_ip(path: &str, ip: &str) -> RequestInfo {
    RequestInfo::get(path).with_header(TRUSTED_CLIENT_IP_HEADER, ip)
}

fn remaining(decision: &RateLimitDecision) -> u32 {
    match decision {
        RateLimitDecision::Allowed(status) => status.remaining,
        other => panic!("expected allowed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_scenario_b_third_request_limited() {
    let (limiter, _) = limiter_with(RateLimitTier::Public, 2);
    let req = from_ip("/landing", "1.2.3.4");

    assert_eq!(remaining(&limiter.check_at(&req, NOW).await), 1);
    assert_eq!(remaining(&limiter.check_at(&req, NOW + 1).await), 0);

    let decision = limiter.check_at(&req, NOW + 2).await;
    assert!(!decision.is_allowed());
    assert_eq!(decision.status_code(), StatusCode::TOO_MANY_REQUESTS);
    let headers = decision.headers();
    match decision {
        RateLimitDecision::Limited(e) => {
            assert_eq!(e.tier, RateLimitTier::Public);
            assert_eq!(e.client, "ip:1.2.3.4");
            assert_eq!(e.limit, 2);
            assert!(e.retry_after > 0 && e.retry_after <= 60);
            assert_eq!(e.retry_after, 18);
            assert_eq!(headers[RETRY_AFTER], "18");
        }
        other => panic!("expected limited, got {:?}", other),
    }
}

#[tokio::test]
async fn test_next_window_starts_fresh() {
    let (limiter, _) = limiter_with(RateLimitTier::Public, 3);
    let req = from_ip("/", "1.2.3.4");
    for _ in 0..3 {
        assert!(limiter.check_at(&req, NOW).await.is_allowed());
    }
    assert!(!limiter.check_at(&req, NOW + 19).await.is_allowed());
    // Window [960, 1020) ends here.
    assert_eq!(remaining(&limiter.check_at(&req, 1_020).await), 2);
}

#[tokio::test]
async fn test_clients_are_counted_separately() {
    let (limiter, _) = limiter_with(RateLimitTier::Public, 1);
    let a = from_ip("/", "1.2.3.4");
    let b = from_ip("/", "5.6.7.8");

    assert!(limiter.check_at(&a, NOW).await.is_allowed());
    assert!(!limiter.check_at(&a, NOW).await.is_allowed());
    assert!(limiter.check_at(&b, NOW).await.is_allowed());
}

#[tokio::test]
async fn test_tiers_are_counted_separately() {
    let store = Arc::new(MemoryKvStore::new());
    let limiter = RateLimiter::new(store)
        .with_tiers(
            TierTable::default()
                .with_limit(RateLimitTier::Auth, TierLimit::new(1, 60))
                .with_limit(RateLimitTier::Read, TierLimit::new(1, 60)),
        )
        .unwrap();

    assert!(limiter.check_at(&from_ip("/v1/auth/login", "1.2.3.4"), NOW).await.is_allowed());
    assert!(!limiter.check_at(&from_ip("/v1/auth/login", "1.2.3.4"), NOW).await.is_allowed());
    assert!(limiter.check_at(&from_ip("/v1/models", "1.2.3.4"), NOW).await.is_allowed());
}

#[tokio::test]
async fn test_store_failure_fails_open() {
    let limiter = RateLimiter::new(Arc::new(BrokenKvStore));
    let req = from_ip("/v1/auth/login", "1.2.3.4");
    for _ in 0..50 {
        match limiter.check_at(&req, NOW).await {
            RateLimitDecision::Allowed(status) => {
                assert!(status.degraded);
                assert_eq!(status.tier, RateLimitTier::Auth);
            }
            other => panic!("expected degraded allow, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_unknown_clients_get_a_third() {
    let (limiter, _) = limiter_with(RateLimitTier::Public, 6);
    let anonymous = RequestInfo::get("/");
    assert_eq!(remaining(&limiter.check_at(&anonymous, NOW).await), 1);
    assert!(limiter.check_at(&anonymous, NOW).await.is_allowed());
    assert!(!limiter.check_at(&anonymous, NOW).await.is_allowed());
}

#[tokio::test]
async fn test_verified_identity_gets_more() {
    let (limiter, _) = limiter_with(RateLimitTier::Public, 10);
    let req = from_ip("/", "1.2.3.4").with_verified_identity(true);
    match limiter.check_at(&req, NOW).await {
        RateLimitDecision::Allowed(status) => assert_eq!(status.limit, 15),
        other => panic!("expected allowed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_health_paths_bypass() {
    let (limiter, store) = limiter_with(RateLimitTier::Public, 1);
    for path in ["/health", "/v1/health", "/v1/analytics/health"] {
        for _ in 0..5 {
            let decision = limiter.check_at(&RequestInfo::get(path), NOW).await;
            assert_eq!(decision, RateLimitDecision::Bypassed);
            assert!(decision.headers().is_empty());
        }
    }
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_counter_key_and_record() {
    let (limiter, store) = limiter_with(RateLimitTier::Public, 5);
    let limiter = limiter.with_key_prefix("rl");
    limiter.check_at(&from_ip("/", "1.2.3.4"), NOW).await;

    let raw = store.get("rl:public:ip:1.2.3.4:960").await.unwrap().unwrap();
    let record: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(record, serde_json::json!({"count": 1, "resetAt": 1020}));
}

#[tokio::test]
async fn test_reload_tiers_applies_to_next_check() {
    let (limiter, _) = limiter_with(RateLimitTier::Public, 100);
    let req = RequestInfo::post("/v1/internal/sync").with_header(TRUSTED_CLIENT_IP_HEADER, "1.2.3.4");
    assert!(limiter.check_at(&req, NOW).await.is_allowed());

    let table = TierTable::default()
        .with_rules(vec![TierRule::new("/v1/internal", RouteTarget::Bypass)]);
    limiter.reload_tiers(table).unwrap();
    assert_eq!(limiter.check_at(&req, NOW).await, RateLimitDecision::Bypassed);

    let invalid = TierTable {
        limits: Default::default(),
        ..TierTable::default()
    };
    assert!(limiter.reload_tiers(invalid).is_err());
    assert_eq!(limiter.check_at(&req, NOW).await, RateLimitDecision::Bypassed);
}

#[tokio::test]
async fn test_limited_converts_to_error() {
    let (limiter, _) = limiter_with(RateLimitTier::Public, 1);
    let req = from_ip("/", "1.2.3.4");
    assert!(limiter.check_at(&req, NOW).await.into_result().unwrap().is_some());

    let err = limiter.check_at(&req, NOW).await.into_result().unwrap_err();
    match err {
        storeguard::Error::RateLimited(e) => {
            assert_eq!(e.body()["retryAfter"], 20);
        }
        other => panic!("expected rate limited, got {:?}", other),
    }
}
