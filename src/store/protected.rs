//! Breaker-protected database wrapper.

use super::classifier::{extract_table, HeuristicClassifier, OperationClassifier};
use super::context::{OperationContext, OperationHint, OperationKind};
use super::database::{Database, ExecMeta, PreparedStatement, QueryResult, SqlValue};
use super::fallback::{degrade, Degraded, FallbackResponse};
use crate::health::{HealthReport, StoreMetrics};
use crate::resilience::{CircuitBreaker, CircuitConfig, CircuitError};
use crate::Result;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

type CallResult<T> = std::result::Result<T, CircuitError>;

/// Database wrapper that routes every call through one of three independent
/// breakers, so an outage in one failure domain never blocks the others.
///
/// | Breaker | Profile |
/// |---------|---------|
/// | read | trips early, short timeout |
/// | write | higher threshold, abandoning writes is costly |
/// | auth | most lenient, every user action depends on it |
pub struct ProtectedDataStore {
    db: Arc<dyn Database>,
    read: Arc<CircuitBreaker>,
    write: Arc<CircuitBreaker>,
    auth: Arc<CircuitBreaker>,
    classifier: Arc<dyn OperationClassifier>,
}

impl ProtectedDataStore {
    /// Wraps `db` with the default read/write/auth breaker profiles.
    pub fn new(db: Arc<dyn Database>) -> Result<Self> {
        Self::with_configs(
            db,
            CircuitConfig::read_database(),
            CircuitConfig::database(),
            CircuitConfig::auth_database(),
        )
    }

    pub fn with_configs(
        db: Arc<dyn Database>,
        read: CircuitConfig,
        write: CircuitConfig,
        auth: CircuitConfig,
    ) -> Result<Self> {
        Ok(Self {
            db,
            read: Arc::new(CircuitBreaker::new(read)?),
            write: Arc::new(CircuitBreaker::new(write)?),
            auth: Arc::new(CircuitBreaker::new(auth)?),
            classifier: Arc::new(HeuristicClassifier::new()),
        })
    }

    /// Replaces the default text heuristic.
    pub fn with_classifier(mut self, classifier: Arc<dyn OperationClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn breaker(&self, kind: OperationKind) -> &CircuitBreaker {
        self.breaker_arc(kind)
    }

    fn breaker_arc(&self, kind: OperationKind) -> &Arc<CircuitBreaker> {
        match kind {
            OperationKind::Read => &self.read,
            OperationKind::Write => &self.write,
            OperationKind::Auth => &self.auth,
        }
    }

    /// Explicit hint wins, otherwise the classifier decides.
    pub fn classify(&self, sql: &str, hint: Option<OperationKind>) -> OperationKind {
        hint.unwrap_or_else(|| self.classifier.classify(sql))
    }

    pub fn context_for(&self, sql: &str, hint: Option<OperationHint>) -> OperationContext {
        let hint = hint.unwrap_or_default();
        let kind = self.classify(sql, hint.kind);
        OperationContext::new(kind, sql)
            .with_table(hint.table.or_else(|| extract_table(sql)))
            .with_fallback(hint.fallback)
    }

    /// Prepares `sql`. Nothing touches the database until a terminal call.
    pub fn prepare(&self, sql: &str, hint: Option<OperationHint>) -> ProtectedStatement {
        let context = self.context_for(sql, hint);
        ProtectedStatement {
            statement: self.db.prepare(sql),
            breaker: Arc::clone(self.breaker_arc(context.kind)),
            context,
        }
    }

    /// Runs all statements as one atomic attempt through the write breaker.
    pub async fn batch_execute(&self, statements: &[ProtectedStatement]) -> CallResult<Vec<QueryResult>> {
        let raw: Vec<Arc<dyn PreparedStatement>> =
            statements.iter().map(|s| Arc::clone(&s.statement)).collect();
        let count = raw.len();
        let db = &self.db;
        self.write
            .execute(|| async move {
                db.batch(raw).await.map_err(|e| {
                    tracing::error!(
                        operation = "write",
                        statement_count = count,
                        error = %e,
                        "batch operation failed"
                    );
                    e
                })
            })
            .await
    }

    /// Raw SQL through the classified breaker.
    pub async fn exec(&self, sql: &str, hint: Option<OperationHint>) -> CallResult<ExecMeta> {
        let context = self.context_for(sql, hint);
        let db = &self.db;
        self.breaker(context.kind)
            .execute(|| async {
                db.exec(sql).await.map_err(|e| {
                    log_db_error(&context, "exec", &e);
                    e
                })
            })
            .await
    }

    pub fn metrics(&self) -> StoreMetrics {
        StoreMetrics {
            read: self.read.metrics(),
            write: self.write.metrics(),
            auth: self.auth.metrics(),
        }
    }

    /// Recomputed from live breaker state on every call.
    pub fn health_status(&self) -> HealthReport {
        self.metrics().health()
    }

    pub fn reset_breaker(&self, kind: OperationKind) {
        self.breaker(kind).reset();
    }

    pub fn reset_breakers(&self) {
        for kind in OperationKind::ALL {
            self.reset_breaker(kind);
        }
    }

    /// Maps a breaker error to the substitute payload for `context`.
    pub fn fallback_response(error: &CircuitError, context: &OperationContext) -> FallbackResponse {
        FallbackResponse::for_error(error, context)
    }
}

/// A prepared statement bound to the breaker of its failure domain.
#[derive(Clone)]
pub struct ProtectedStatement {
    statement: Arc<dyn PreparedStatement>,
    breaker: Arc<CircuitBreaker>,
    context: OperationContext,
}

impl std::fmt::Debug for ProtectedStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtectedStatement")
            .field("breaker", &self.breaker.name())
            .field("context", &self.context)
            .finish()
    }
}

impl ProtectedStatement {
    /// Binds parameters. Not an attempt; the breaker is not consulted.
    pub fn bind<I, V>(&self, params: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        let params: Vec<SqlValue> = params.into_iter().map(Into::into).collect();
        Self {
            statement: self.statement.bind(&params),
            breaker: Arc::clone(&self.breaker),
            context: self.context.clone(),
        }
    }

    pub fn context(&self) -> &OperationContext {
        &self.context
    }

    pub fn kind(&self) -> OperationKind {
        self.context.kind
    }

    /// The unprotected statement, for collaborators that need it directly.
    pub fn raw(&self) -> &Arc<dyn PreparedStatement> {
        &self.statement
    }

    pub async fn all(&self) -> CallResult<QueryResult> {
        self.breaker
            .execute(|| async {
                self.statement.all().await.map_err(|e| {
                    log_db_error(&self.context, "all", &e);
                    e
                })
            })
            .await
    }

    pub async fn first(&self) -> CallResult<Option<Value>> {
        self.breaker
            .execute(|| async {
                self.statement.first().await.map_err(|e| {
                    log_db_error(&self.context, "first", &e);
                    e
                })
            })
            .await
    }

    pub async fn run(&self) -> CallResult<ExecMeta> {
        self.breaker
            .execute(|| async {
                self.statement.run().await.map_err(|e| {
                    log_db_error(&self.context, "run", &e);
                    e
                })
            })
            .await
    }

    pub async fn all_as<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let result = self.all().await?;
        result
            .rows
            .into_iter()
            .map(|row| serde_json::from_value(row).map_err(Into::into))
            .collect()
    }

    pub async fn first_as<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        match self.first().await? {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => Ok(None),
        }
    }

    /// `all()`, serving the fallback payload if the breaker refused or timed out.
    pub async fn all_or_fallback(&self) -> CallResult<Degraded<QueryResult>> {
        degrade(self.all().await, &self.context)
    }

    pub async fn first_or_fallback(&self) -> CallResult<Degraded<Option<Value>>> {
        degrade(self.first().await, &self.context)
    }

    pub async fn run_or_fallback(&self) -> CallResult<Degraded<ExecMeta>> {
        degrade(self.run().await, &self.context)
    }
}

fn log_db_error(context: &OperationContext, method: &str, error: &crate::Error) {
    tracing::error!(
        operation = %context.kind,
        method,
        table = context.table.as_deref().unwrap_or("-"),
        query = %context.query,
        fingerprint = %context.fingerprint,
        error = %error,
        "database operation failed"
    );
}
