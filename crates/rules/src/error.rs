//! Error types for binding, stream processing and state persistence.

use chrono::{DateTime, Utc};
use thiserror::Error;
use twinwatch_core::TwinId;
use twinwatch_expr::ParseError;

/// Failure to resolve an expression against the twin graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindError {
    #[error("no twin of model {model} reachable from {origin}")]
    NotFound { model: String, origin: TwinId },

    #[error("{reference} matched {} twins: {}", .candidates.len(), .candidates.join(", "))]
    Ambiguous { reference: String, candidates: Vec<TwinId> },

    #[error("unknown variable '{name}'{}", .suggestion.as_ref().map(|s| format!(", did you mean '{}'?", s)).unwrap_or_default())]
    UnknownVariable { name: String, suggestion: Option<String> },

    #[error("circular reference: {}", .chain.join(" -> "))]
    Circular { chain: Vec<String> },

    #[error("unsupported expression: {0}")]
    Unsupported(String),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Caller broke the streaming contract. Aborts the single `process` call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractViolation {
    #[error("sample {index} at {current} is earlier than the previous sample at {previous}")]
    OutOfOrder {
        index: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error("state belongs to instance {found}, not {expected}")]
    StateMismatch { expected: String, found: String },

    #[error("state watermark {watermark} is later than range start {range_start}")]
    StaleState {
        watermark: DateTime<Utc>,
        range_start: DateTime<Utc>,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors surfaced by [`crate::engine::RuleEngine`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unknown rule instance '{0}'")]
    UnknownInstance(String),

    #[error(transparent)]
    Contract(#[from] ContractViolation),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}
