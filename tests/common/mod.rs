//! Shared test doubles for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storeguard::cache::{CacheRequest, EdgeCache, EdgeResponse, KvStore};
use storeguard::store::{Database, ExecMeta, PreparedStatement, QueryResult, SqlValue};
use storeguard::{Error, Result};

/// Switchable failures and latency, shared by a mock database and its statements.
#[derive(Default)]
pub struct MockState {
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
    pub delay: Mutex<Option<Duration>>,
}

#[derive(Clone, Default)]
pub struct MockDatabase {
    pub state: Arc<MockState>,
}

impl MockDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.state.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.state.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.state.delay.lock().unwrap() = delay;
    }

    pub fn reads(&self) -> usize {
        self.state.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.state.writes.load(Ordering::SeqCst)
    }
}

pub struct MockStatement {
    sql: String,
    params: Vec<SqlValue>,
    state: Arc<MockState>,
}

impl MockStatement {
    fn is_read(&self) -> bool {
        self.sql.trim_start().to_lowercase().starts_with("select")
    }

    async fn pause(&self) {
        let delay = *self.state.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    async fn read(&self) -> Result<Vec<Value>> {
        self.state.reads.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.state.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::backend("mock-db", "read replica unavailable"));
        }
        Ok(vec![json!({"code": "P1", "params": self.params.len()})])
    }

    async fn write(&self) -> Result<ExecMeta> {
        self.state.writes.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::backend("mock-db", "primary unavailable"));
        }
        Ok(ExecMeta {
            changes: 1,
            last_row_id: Some(1),
            duration_ms: 0.1,
        })
    }
}

#[async_trait]
impl PreparedStatement for MockStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn bind(&self, params: &[SqlValue]) -> Arc<dyn PreparedStatement> {
        Arc::new(MockStatement {
            sql: self.sql.clone(),
            params: params.to_vec(),
            state: self.state.clone(),
        })
    }

    async fn all(&self) -> Result<QueryResult> {
        let rows = if self.is_read() { self.read().await? } else { Vec::new() };
        Ok(QueryResult {
            rows,
            meta: ExecMeta::default(),
        })
    }

    async fn first(&self) -> Result<Option<Value>> {
        Ok(self.read().await?.into_iter().next())
    }

    async fn run(&self) -> Result<ExecMeta> {
        if self.is_read() {
            self.read().await?;
            return Ok(ExecMeta::default());
        }
        self.write().await
    }
}

#[async_trait]
impl Database for MockDatabase {
    fn prepare(&self, sql: &str) -> Arc<dyn PreparedStatement> {
        Arc::new(MockStatement {
            sql: sql.to_string(),
            params: Vec::new(),
            state: self.state.clone(),
        })
    }

    async fn batch(&self, statements: Vec<Arc<dyn PreparedStatement>>) -> Result<Vec<QueryResult>> {
        self.state.writes.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::backend("mock-db", "batch rolled back"));
        }
        Ok(vec![QueryResult::default(); statements.len()])
    }

    async fn exec(&self, _sql: &str) -> Result<ExecMeta> {
        self.state.writes.fetch_add(1, Ordering::SeqCst);
        Ok(ExecMeta::default())
    }
}

/// Key-value store whose every call fails.
pub struct BrokenKvStore;

#[async_trait]
impl KvStore for BrokenKvStore {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(Error::backend("kv", "connection reset"))
    }

    async fn put(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
        Err(Error::backend("kv", "connection reset"))
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Err(Error::backend("kv", "connection reset"))
    }
}

/// Edge cache whose every call fails.
pub struct BrokenEdgeCache;

#[async_trait]
impl EdgeCache for BrokenEdgeCache {
    async fn match_request(&self, _request: &CacheRequest) -> Result<Option<EdgeResponse>> {
        Err(Error::backend("edge", "cache unavailable"))
    }

    async fn put(&self, _request: &CacheRequest, _response: EdgeResponse) -> Result<()> {
        Err(Error::backend("edge", "cache unavailable"))
    }

    async fn delete(&self, _request: &CacheRequest) -> Result<bool> {
        Err(Error::backend("edge", "cache unavailable"))
    }
}
