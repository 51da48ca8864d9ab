//! Primary-store error model.
//!
//! [`StoreError`] carries a gRPC-style status kind and the store's message.
//! Callers classify failures (index requirement, transient availability) by
//! inspecting the rendered error, the same way they would a remote store's.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Broad status of a failed primary-store call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[serde(rename_all = "snake_case")]
pub enum StoreErrorKind {
    /// The store cannot serve the request in its current configuration
    /// (for example a missing composite index).
    FailedPrecondition,
    /// Network or availability failure (retryable by the caller).
    Unavailable,
    /// Referenced collection or document does not exist.
    NotFound,
    /// Malformed request.
    InvalidArgument,
    /// A write batch exceeded the per-call operation limit.
    BatchTooLarge,
    /// Anything else.
    Internal,
}

impl fmt::Display for StoreErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::FailedPrecondition => "FAILED_PRECONDITION",
            Self::Unavailable => "UNAVAILABLE",
            Self::NotFound => "NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::BatchTooLarge => "BATCH_TOO_LARGE",
            Self::Internal => "INTERNAL",
        };
        f.write_str(s)
    }
}

/// Failure reported by the primary store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    #[must_use]
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn failed_precondition(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::FailedPrecondition, message)
    }

    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Unavailable, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Internal, message)
    }

    /// Whether a caller-side retry may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind == StoreErrorKind::Unavailable
    }
}
