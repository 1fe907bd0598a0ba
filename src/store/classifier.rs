//! Statement classification into read / write / auth.

use super::context::OperationKind;
use once_cell::sync::Lazy;
use regex::Regex;

/// Decides which failure domain a statement belongs to.
///
/// Used only when the caller gave no explicit hint. Implement this to replace
/// the text heuristic, e.g. with a classification derived from a query builder.
pub trait OperationClassifier: Send + Sync {
    fn classify(&self, sql: &str) -> OperationKind;
}

/// Default text heuristic.
///
/// 1. Auth-only tables, or the users table together with an auth keyword ⇒ auth
/// 2. `SELECT` / `WITH` prefix ⇒ read
/// 3. Anything else ⇒ write
///
/// Rule 1 runs first, so a plain write that merely touches a password column of
/// the users table is classified as auth. Pass an explicit hint for those.
#[derive(Debug, Clone)]
pub struct HeuristicClassifier {
    auth_only_tables: Vec<String>,
    users_table: String,
    auth_keywords: Vec<String>,
}

impl HeuristicClassifier {
    pub fn new() -> Self {
        Self {
            auth_only_tables: vec!["user_sessions".into(), "refresh_tokens".into()],
            users_table: "users".into(),
            auth_keywords: vec![
                "password".into(),
                "token".into(),
                "login".into(),
                "register".into(),
            ],
        }
    }

    pub fn with_auth_only_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.auth_only_tables = tables.into_iter().map(|t| t.into().to_lowercase()).collect();
        self
    }

    pub fn with_users_table(mut self, table: impl Into<String>) -> Self {
        self.users_table = table.into().to_lowercase();
        self
    }

    pub fn with_auth_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.auth_keywords = keywords.into_iter().map(|k| k.into().to_lowercase()).collect();
        self
    }

    fn is_auth(&self, normalized: &str) -> bool {
        let auth_table = self
            .auth_only_tables
            .iter()
            .any(|t| normalized.contains(t.as_str()));
        let users_with_keyword = normalized.contains(self.users_table.as_str())
            && self
                .auth_keywords
                .iter()
                .any(|k| normalized.contains(k.as_str()));
        auth_table || users_with_keyword
    }
}

impl Default for HeuristicClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl OperationClassifier for HeuristicClassifier {
    fn classify(&self, sql: &str) -> OperationKind {
        let normalized = sql.trim().to_lowercase();
        if self.is_auth(&normalized) {
            return OperationKind::Auth;
        }
        if normalized.starts_with("select") || normalized.starts_with("with") {
            return OperationKind::Read;
        }
        OperationKind::Write
    }
}

static TABLE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\bdelete\s+from\s+([a-z_][a-z0-9_]*)",
        r"(?i)\binsert\s+into\s+([a-z_][a-z0-9_]*)",
        r"(?i)\bupdate\s+([a-z_][a-z0-9_]*)",
        r"(?i)\bfrom\s+([a-z_][a-z0-9_]*)",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

/// Best-effort table name, for logging and fallback selection.
pub fn extract_table(sql: &str) -> Option<String> {
    TABLE_PATTERNS.iter().find_map(|re| {
        re.captures(sql)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_lowercase())
    })
}
