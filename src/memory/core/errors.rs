//! Error types for the hybrid memory subsystem.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::engine::record::RecordReport;

/// Memory subsystem error type.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Caller supplied an invalid argument.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Embedding service unreachable or returned a malformed response.
    #[error("embedding error: {0}")]
    Embedding(String),
    /// Backend CRUD or search failure.
    #[error("{backend} store error: {message}")]
    Store {
        /// Backend that failed (`qdrant`, `neo4j`, `in_memory_graph`, ...).
        backend: &'static str,
        /// Failure detail.
        message: String,
    },
    /// Referenced entity or record does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Reranker failure. Downgraded to a no-op by the coordinator.
    #[error("rerank error: {0}")]
    Rerank(String),
    /// An external call exceeded its time budget.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// Operation that timed out.
        operation: &'static str,
        /// Error category of the call that timed out.
        category: ErrorKind,
        /// Budget that was exceeded.
        after: Duration,
    },
    /// A compound record had at least one failed sub-step.
    #[error("record partially failed: {}", .0.summary())]
    PartialRecord(Box<RecordReport>),
    /// Every sub-step of a compound record failed.
    #[error("record failed: {}", .0.summary())]
    RecordFailed(Box<RecordReport>),
    /// Both recall branches failed.
    #[error("recall failed: semantic branch: {semantic}; graph branch: {graph}")]
    RecallFailed {
        /// Semantic branch failure.
        semantic: ErrorReport,
        /// Graph branch failure.
        graph: ErrorReport,
    },
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// URL parse error.
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

impl MemoryError {
    /// Build a store error for the given backend.
    pub fn store(backend: &'static str, message: impl fmt::Display) -> Self {
        Self::Store {
            backend,
            message: message.to_string(),
        }
    }

    /// Coarse category of the error, stable for callers deciding whether to
    /// retry, skip, or escalate.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::InvalidInput(_) | Self::Url(_) => ErrorKind::InvalidInput,
            Self::Embedding(_) => ErrorKind::Embedding,
            Self::Store { .. } | Self::Serialization(_) => ErrorKind::Store,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Rerank(_) => ErrorKind::Rerank,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::PartialRecord(_) => ErrorKind::PartialRecord,
            Self::RecordFailed(_) | Self::RecallFailed { .. } => ErrorKind::Unavailable,
        }
    }

    /// Serializable snapshot of this error for compound results.
    #[must_use]
    pub fn report(&self) -> ErrorReport {
        let kind = match self {
            Self::Timeout { category, .. } => *category,
            other => other.kind(),
        };
        ErrorReport {
            kind,
            timed_out: matches!(self, Self::Timeout { .. }),
            message: self.to_string(),
        }
    }
}

/// Coarse error category exposed to callers.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Configuration rejected.
    InvalidConfig,
    /// Argument rejected.
    InvalidInput,
    /// Embedding service failure.
    Embedding,
    /// Vector or graph backend failure.
    Store,
    /// Referenced data does not exist.
    NotFound,
    /// Reranker failure.
    Rerank,
    /// Call exceeded its time budget.
    Timeout,
    /// Compound write partially applied.
    PartialRecord,
    /// Every backend involved in a compound call failed.
    Unavailable,
}

impl ErrorKind {
    /// Stable string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidConfig => "invalid_config",
            Self::InvalidInput => "invalid_input",
            Self::Embedding => "embedding",
            Self::Store => "store",
            Self::NotFound => "not_found",
            Self::Rerank => "rerank",
            Self::Timeout => "timeout",
            Self::PartialRecord => "partial_record",
            Self::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Captured error inside a compound result (recall branch, record step).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReport {
    /// Category of the underlying failure.
    pub kind: ErrorKind,
    /// Whether the failure was a timeout of the call.
    #[serde(default)]
    pub timed_out: bool,
    /// Human readable detail.
    pub message: String,
}

impl fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Convenience result alias for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_report_keeps_call_category() {
        let err = MemoryError::Timeout {
            operation: "vector_search",
            category: ErrorKind::Store,
            after: Duration::from_millis(50),
        };
        let report = err.report();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert_eq!(report.kind, ErrorKind::Store);
        assert!(report.timed_out);
        assert!(report.message.contains("vector_search"));
    }

    #[test]
    fn test_not_found_kind() {
        let err = MemoryError::NotFound("entity Alice/Person".to_string());
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.report().kind, ErrorKind::NotFound);
        assert!(!err.report().timed_out);
    }

    #[test]
    fn test_store_error_names_backend() {
        let err = MemoryError::store("neo4j", "401 Unauthorized");
        assert_eq!(err.to_string(), "neo4j store error: 401 Unauthorized");
    }
}
