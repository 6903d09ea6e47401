//! Document-store error types.
//!
//! These are the failures a backend may report. The layers above do not retry
//! them; retry and throttling policy belongs to the backend client.

use std::fmt;

/// Errors that can occur while talking to a document store.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A conditional write was rejected because its condition did not hold.
    #[error("Condition failed: {message}")]
    ConditionFailed {
        /// Description of the condition that failed.
        message: String,
    },

    /// The request cannot be served by this table (unknown index, oversize batch, ...).
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// The backend rejected the call because of provisioned throughput limits.
    #[error("Throttled: {message}")]
    Throttled {
        /// Description reported by the backend.
        message: String,
    },

    /// The backend could not be reached.
    #[error("Connection error: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// An internal backend error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl StorageError {
    /// Creates a new `ConditionFailed` error.
    #[must_use]
    pub fn condition_failed(message: impl Into<String>) -> Self {
        Self::ConditionFailed {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `Throttled` error.
    #[must_use]
    pub fn throttled(message: impl Into<String>) -> Self {
        Self::Throttled {
            message: message.into(),
        }
    }

    /// Creates a new `Connection` error.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a failed write condition.
    #[must_use]
    pub fn is_condition_failed(&self) -> bool {
        matches!(self, Self::ConditionFailed { .. })
    }

    /// Returns `true` if this is an invalid request error.
    #[must_use]
    pub fn is_invalid_request(&self) -> bool {
        matches!(self, Self::InvalidRequest { .. })
    }

    /// Returns `true` if the caller may reasonably retry the call later.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Throttled { .. } | Self::Connection { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::ConditionFailed { .. } => ErrorCategory::Conflict,
            Self::InvalidRequest { .. } => ErrorCategory::Validation,
            Self::Throttled { .. } | Self::Connection { .. } => ErrorCategory::Infrastructure,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }
}

/// Categories of storage errors for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Conditional write conflict.
    Conflict,
    /// Malformed or unsupported request.
    Validation,
    /// Throttling or connectivity.
    Infrastructure,
    /// Internal error.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict => write!(f, "conflict"),
            Self::Validation => write!(f, "validation"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
