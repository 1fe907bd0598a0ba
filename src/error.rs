use crate::cache::CacheTierError;
use crate::rate_limit::RateLimitExceeded;
use crate::resilience::CircuitError;
use thiserror::Error;

/// Structured error context for better error handling and debugging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// Field path or configuration key that caused the error (e.g., "breakers.read.timeout_ms")
    pub field_path: Option<String>,
    /// Additional context about the error (e.g., expected range, actual value)
    pub details: Option<String>,
    /// Source of the error (e.g., "circuit_config", "kv_store")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            field_path: None,
            details: None,
            source: None,
        }
    }

    pub fn with_field_path(mut self, path: impl Into<String>) -> Self {
        self.field_path = Some(path.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Unified error type for storeguard.
///
/// The typed variants (`Circuit`, `RateLimited`) are meant for callers to pick a
/// degraded response. The cascading cache logs and counts `CacheTier` errors
/// but never returns them.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Circuit breaker error: {0}")]
    Circuit(#[from] CircuitError),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(#[from] RateLimitExceeded),

    #[error("Cache tier error: {0}")]
    CacheTier(#[from] CacheTierError),

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },

    #[error("Validation error: {message}{}", format_context(.context))]
    Validation {
        message: String,
        context: ErrorContext,
    },

    /// A collaborator (database, key-value store, edge cache) reported a failure.
    #[error("Backend error: {message}{}", format_context(.context))]
    Backend {
        message: String,
        context: ErrorContext,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML syntax error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

// Helper function to format error context for display
fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref field) = ctx.field_path {
        parts.push(format!("field: {}", field));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    /// Create a new configuration error with structured context
    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// Create a new validation error with structured context
    pub fn validation_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Validation {
            message: msg.into(),
            context,
        }
    }

    /// Create a new backend error with structured context
    pub fn backend_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Backend {
            message: msg.into(),
            context,
        }
    }

    /// Shorthand for a backend error tagged with its source collaborator.
    pub fn backend(source: &str, msg: impl Into<String>) -> Self {
        Self::backend_with_context(msg, ErrorContext::new().with_source(source))
    }

    /// Extract error context if available
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Configuration { context, .. }
            | Error::Validation { context, .. }
            | Error::Backend { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Returns the circuit breaker error if this is one.
    pub fn as_circuit(&self) -> Option<&CircuitError> {
        match self {
            Error::Circuit(e) => Some(e),
            _ => None,
        }
    }
}
