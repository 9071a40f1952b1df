//! Error types for the reconciliation layer

use thiserror::Error;

/// Main error type for reconciliation operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Malformed input caught before any backend call (bad mangled quota
    /// name, unrecognized role, wrong multiplier type)
    #[error("validation error: {0}")]
    Validation(String),

    /// A resource that must exist for the operation is absent
    #[error("not found: {0}")]
    NotFound(String),

    /// The resource or membership already exists
    #[error("conflict: {0}")]
    Conflict(String),

    /// The remote platform call failed for infrastructure reasons,
    /// including settle-barrier timeouts
    #[error("backend error: {0}")]
    Backend(String),

    /// Kubernetes API error from the production gateway
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Aggregate failure of a multi-step operation; `code` is the worst
    /// status observed across the steps
    #[error("partial failure (status {code}): {message}")]
    PartialFailure {
        /// Worst status code observed across the sub-operations
        code: u16,
        /// Concatenated per-step messages
        message: String,
    },
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a not-found error with the given message
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a conflict error with the given message
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a backend error with the given message
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    /// Numeric status code for this error in the backend's 2xx/4xx/5xx
    /// space, for callers mapping errors onto a transport response.
    pub fn code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Backend(_) => 502,
            Self::Kube(kube::Error::Api(e)) => e.code,
            Self::Kube(_) => 502,
            Self::PartialFailure { code, .. } => *code,
        }
    }
}
