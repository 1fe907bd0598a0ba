//! Breaker-protected access to a SQL data store.
//!
//! Calls are classified into three failure domains (read, write, auth) and
//! each domain runs behind its own [`CircuitBreaker`](crate::resilience::CircuitBreaker).
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`Database`] | Async trait over the underlying SQL driver |
//! | [`ProtectedDataStore`] | Routes statements to the read/write/auth breakers |
//! | [`ProtectedStatement`] | Prepared statement bound to one breaker |
//! | [`OperationClassifier`] | Decides the failure domain of a statement |
//! | [`FallbackResponse`] | Payload served while a breaker refuses work |
//!
//! ## Example
//!
//! ```rust,ignore
//! use storeguard::store::{OperationHint, OperationKind, ProtectedDataStore};
//!
//! let store = ProtectedDataStore::new(db)?;
//! let rows = store
//!     .prepare("SELECT * FROM models WHERE category = ?", None)
//!     .bind(["thinking"])
//!     .all_or_fallback()
//!     .await?;
//! ```

pub mod classifier;
pub mod context;
pub mod database;
pub mod fallback;
pub mod protected;

pub use classifier::{extract_table, HeuristicClassifier, OperationClassifier};
pub use context::{fingerprint, OperationContext, OperationHint, OperationKind};
pub use database::{Database, ExecMeta, PreparedStatement, QueryResult, SqlValue};
pub use fallback::{degrade, with_fallback, Degraded, FallbackResponse};
pub use protected::{ProtectedDataStore, ProtectedStatement};
