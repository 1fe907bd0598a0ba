//! Degraded payloads served while a breaker refuses work.

use super::context::{OperationContext, OperationKind};
use crate::resilience::CircuitError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Safe substitute for a result the database could not produce.
///
/// `unavailable` is always `true`, which is what distinguishes a fallback from
/// ordinary (possibly empty) data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FallbackResponse {
    pub kind: OperationKind,
    /// Empty-but-valid collection for reads; absent for writes and auth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Vec<Value>>,
    pub message: String,
    /// Code of the breaker error that triggered the fallback.
    pub code: String,
    pub retryable: bool,
    pub cached: bool,
    pub unavailable: bool,
}

impl FallbackResponse {
    /// Maps a breaker error and call context to a substitute payload.
    pub fn for_error(error: &CircuitError, context: &OperationContext) -> Self {
        tracing::warn!(
            code = error.code(),
            breaker = error.breaker(),
            state = %error.state(),
            operation = %context.kind,
            table = context.table.as_deref().unwrap_or("-"),
            "serving fallback response"
        );

        let (items, message) = match context.kind {
            OperationKind::Read => (Some(read_items(context)), read_message(context)),
            OperationKind::Auth => (
                None,
                "Authentication service temporarily unavailable. Please try again shortly."
                    .to_string(),
            ),
            OperationKind::Write => (
                None,
                "Write operations temporarily unavailable. Please retry once service is restored."
                    .to_string(),
            ),
        };

        Self {
            kind: context.kind,
            items,
            message,
            code: error.code().to_string(),
            retryable: true,
            cached: false,
            unavailable: true,
        }
    }
}

fn read_items(context: &OperationContext) -> Vec<Value> {
    match &context.fallback {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::Null) | None => Vec::new(),
        Some(other) => vec![other.clone()],
    }
}

fn read_message(context: &OperationContext) -> String {
    match &context.table {
        Some(table) => format!(
            "Data from '{}' temporarily unavailable. Cached data may be available.",
            table
        ),
        None => "Data temporarily unavailable. Please try again in a few moments.".to_string(),
    }
}

/// Either a real result or the fallback served in its place.
#[derive(Debug, Clone, PartialEq)]
pub enum Degraded<T> {
    Fresh(T),
    Fallback(FallbackResponse),
}

impl<T> Degraded<T> {
    pub fn is_fallback(&self) -> bool {
        matches!(self, Degraded::Fallback(_))
    }

    pub fn fresh(self) -> Option<T> {
        match self {
            Degraded::Fresh(v) => Some(v),
            Degraded::Fallback(_) => None,
        }
    }

    pub fn fallback(&self) -> Option<&FallbackResponse> {
        match self {
            Degraded::Fresh(_) => None,
            Degraded::Fallback(f) => Some(f),
        }
    }
}

/// Substitutes `fallback` when the breaker refused or timed out the call.
/// Wrapped database errors are real failures and propagate.
pub fn with_fallback<T>(
    result: std::result::Result<T, CircuitError>,
    context: &OperationContext,
    fallback: T,
) -> std::result::Result<T, CircuitError> {
    match result {
        Err(e) if e.is_unavailable() => {
            tracing::warn!(
                code = e.code(),
                operation = %context.kind,
                table = context.table.as_deref().unwrap_or("-"),
                "circuit breaker activated, using fallback value"
            );
            Ok(fallback)
        }
        other => other,
    }
}

/// Like [`with_fallback`] but produces a [`Degraded`] with the standard payload.
pub fn degrade<T>(
    result: std::result::Result<T, CircuitError>,
    context: &OperationContext,
) -> std::result::Result<Degraded<T>, CircuitError> {
    match result {
        Ok(v) => Ok(Degraded::Fresh(v)),
        Err(e) if e.is_unavailable() => Ok(Degraded::Fallback(FallbackResponse::for_error(&e, context))),
        Err(e) => Err(e),
    }
}
