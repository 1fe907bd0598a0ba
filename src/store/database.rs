//! Persistence collaborator interface.
//!
//! `ProtectedDataStore` wraps any implementation of these traits; binding
//! parameters is free, and each terminal call (`all`/`first`/`run`, `batch`,
//! `exec`) is one attempt against the backing database.

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Bool(bool),
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Integer(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Integer(v as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Real(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// Execution metadata returned for mutations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecMeta {
    pub changes: u64,
    pub last_row_id: Option<i64>,
    pub duration_ms: f64,
}

/// Rows returned by a query, as JSON objects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub rows: Vec<Value>,
    pub meta: ExecMeta,
}

#[async_trait]
pub trait PreparedStatement: Send + Sync {
    /// Statement text, used for classification and logging.
    fn sql(&self) -> &str;
    /// Returns a new statement with `params` bound. Never touches the database.
    fn bind(&self, params: &[SqlValue]) -> Arc<dyn PreparedStatement>;
    async fn all(&self) -> Result<QueryResult>;
    async fn first(&self) -> Result<Option<Value>>;
    async fn run(&self) -> Result<ExecMeta>;
}

#[async_trait]
pub trait Database: Send + Sync {
    fn prepare(&self, sql: &str) -> Arc<dyn PreparedStatement>;
    /// Executes all statements atomically.
    async fn batch(&self, statements: Vec<Arc<dyn PreparedStatement>>) -> Result<Vec<QueryResult>>;
    /// Executes raw SQL without parameters.
    async fn exec(&self, sql: &str) -> Result<ExecMeta>;
}
