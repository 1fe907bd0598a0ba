//! Per-call operation context.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Longest statement prefix kept in a context (and therefore in logs).
const MAX_QUERY_CHARS: usize = 200;

/// Failure domain a call belongs to; each has its own breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Read,
    Write,
    Auth,
}

impl OperationKind {
    pub const ALL: [OperationKind; 3] = [OperationKind::Read, OperationKind::Write, OperationKind::Auth];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Read => "read",
            OperationKind::Write => "write",
            OperationKind::Auth => "auth",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OperationKind {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "read" => Ok(OperationKind::Read),
            "write" => Ok(OperationKind::Write),
            "auth" => Ok(OperationKind::Auth),
            other => Err(crate::Error::validation_with_context(
                format!("unknown operation kind '{}'", other),
                crate::ErrorContext::new()
                    .with_details("expected one of: read, write, auth")
                    .with_source("operation_kind"),
            )),
        }
    }
}

/// Caller-supplied overrides for [`prepare`](super::ProtectedDataStore::prepare).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationHint {
    pub kind: Option<OperationKind>,
    pub table: Option<String>,
    pub fallback: Option<Value>,
}

impl OperationHint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(kind: OperationKind) -> Self {
        Self::new().with_kind(kind)
    }

    pub fn with_kind(mut self, kind: OperationKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_fallback(mut self, fallback: Value) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

/// Context attached to one protected call. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationContext {
    pub kind: OperationKind,
    pub table: Option<String>,
    /// Statement text, truncated for logging.
    pub query: String,
    /// Short digest of the normalised statement.
    pub fingerprint: String,
    pub fallback: Option<Value>,
}

impl OperationContext {
    pub fn new(kind: OperationKind, sql: &str) -> Self {
        Self {
            kind,
            table: None,
            query: truncate_query(sql),
            fingerprint: fingerprint(sql),
            fallback: None,
        }
    }

    pub fn with_table(mut self, table: Option<String>) -> Self {
        self.table = table;
        self
    }

    pub fn with_fallback(mut self, fallback: Option<Value>) -> Self {
        self.fallback = fallback;
        self
    }
}

fn truncate_query(sql: &str) -> String {
    let sql = sql.trim();
    match sql.char_indices().nth(MAX_QUERY_CHARS) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Lowercased, whitespace-collapsed SHA-256, first 16 hex chars.
pub fn fingerprint(sql: &str) -> String {
    let normalized = sql
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    digest.iter().take(8).map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_ignores_case_and_spacing() {
        let a = fingerprint("SELECT *   FROM models\nWHERE id = ?");
        let b = fingerprint("select * from models where id = ?");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
        assert_ne!(a, fingerprint("select * from users"));
    }

    #[test]
    fn test_query_is_truncated() {
        let long = format!("SELECT {} FROM t", "x, ".repeat(200));
        let ctx = OperationContext::new(OperationKind::Read, &long);
        assert!(ctx.query.ends_with("..."));
        assert_eq!(ctx.query.chars().count(), MAX_QUERY_CHARS + 3);

        let short = OperationContext::new(OperationKind::Read, "  SELECT 1  ");
        assert_eq!(short.query, "SELECT 1");
    }

    #[test]
    fn test_operation_kind_parse() {
        assert_eq!("READ".parse::<OperationKind>().unwrap(), OperationKind::Read);
        assert_eq!("auth".parse::<OperationKind>().unwrap(), OperationKind::Auth);
        assert!("delete".parse::<OperationKind>().is_err());
    }
}
