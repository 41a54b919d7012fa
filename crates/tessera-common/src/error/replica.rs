//! Replica error types.
//!
//! Provides the error types shared by the tablet replica components.

use std::fmt;
use thiserror::Error;

use crate::types::{NodeId, TabletId};

/// Error codes for categorizing errors.
///
/// These codes can be used for programmatic error handling and
/// are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Unknown or unspecified error.
    Unknown = 0x0000,
    /// Internal error (bug).
    Internal = 0x0001,
    /// Operation not supported.
    NotSupported = 0x0002,
    /// Invalid argument provided.
    InvalidArgument = 0x0003,
    /// Operation timed out.
    Timeout = 0x0004,
    /// Operation was cancelled.
    Cancelled = 0x0005,
    /// Component is in an unexpected state.
    IllegalState = 0x0006,

    // Tablet errors (0x0100 - 0x01FF)
    /// Tablet not found on this server.
    TabletNotFound = 0x0100,
    /// Tablet is not in the RUNNING state.
    TabletNotRunning = 0x0101,
    /// Tablet has failed and records a permanent error.
    TabletFailed = 0x0102,

    // Cluster errors (0x0200 - 0x02FF)
    /// Not the leader.
    NotLeader = 0x0200,
    /// Leader unknown.
    LeaderUnknown = 0x0201,
    /// Replication failed.
    ReplicationFailed = 0x0202,
    /// Leader lease has expired.
    LeaseExpired = 0x0203,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x01 => "Tablet",
            0x02 => "Cluster",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The main error type for TesseraDB.
///
/// This enum covers the errors that can occur while operating a tablet
/// replica. Each variant includes relevant context for debugging.
///
/// # Example
///
/// ```rust
/// use tessera_common::error::{TesseraError, TesseraResult};
/// use tessera_common::types::TabletId;
///
/// fn check(tablet_id: TabletId) -> TesseraResult<()> {
///     Err(TesseraError::TabletNotFound { tablet_id })
/// }
/// ```
#[derive(Debug, Clone, Error)]
pub enum TesseraError {
    // ==========================================================================
    // General Errors
    // ==========================================================================
    /// Internal error - this indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    /// Operation not supported.
    #[error("operation not supported: {operation}")]
    NotSupported {
        /// The unsupported operation.
        operation: String,
    },

    /// Invalid argument provided.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Error message.
        message: String,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration_ms}ms")]
    Timeout {
        /// Timeout duration in milliseconds.
        duration_ms: u64,
    },

    /// Operation was cancelled.
    #[error("operation was cancelled")]
    Cancelled,

    /// A component was driven through an unexpected state transition.
    #[error("illegal state: expected {expected}, got {actual}")]
    IllegalState {
        /// The expected state.
        expected: String,
        /// The actual state.
        actual: String,
    },

    // ==========================================================================
    // Tablet Errors
    // ==========================================================================
    /// Tablet not found.
    #[error("tablet {tablet_id} not found")]
    TabletNotFound {
        /// The missing tablet ID.
        tablet_id: TabletId,
    },

    /// Tablet is not running.
    #[error("tablet {tablet_id} is not running (state: {state})")]
    TabletNotRunning {
        /// The tablet ID.
        tablet_id: TabletId,
        /// The state the tablet is actually in.
        state: String,
    },

    /// Tablet has failed permanently.
    #[error("tablet {tablet_id} failed: {reason}")]
    TabletFailed {
        /// The failed tablet.
        tablet_id: TabletId,
        /// Reason for the failure.
        reason: String,
    },

    // ==========================================================================
    // Cluster Errors
    // ==========================================================================
    /// This node is not the leader.
    #[error("not the leader, leader is {leader_id:?}")]
    NotLeader {
        /// The current leader, if known.
        leader_id: Option<NodeId>,
    },

    /// Leader is unknown.
    #[error("leader is unknown")]
    LeaderUnknown,

    /// Replication failed.
    #[error("replication failed: {reason}")]
    ReplicationFailed {
        /// Reason for failure.
        reason: String,
    },

    /// The leader lease has expired.
    #[error("leader lease expired")]
    LeaseExpired,
}

impl TesseraError {
    /// Returns the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Internal { .. } => ErrorCode::Internal,
            Self::NotSupported { .. } => ErrorCode::NotSupported,
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::Timeout { .. } => ErrorCode::Timeout,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::IllegalState { .. } => ErrorCode::IllegalState,
            Self::TabletNotFound { .. } => ErrorCode::TabletNotFound,
            Self::TabletNotRunning { .. } => ErrorCode::TabletNotRunning,
            Self::TabletFailed { .. } => ErrorCode::TabletFailed,
            Self::NotLeader { .. } => ErrorCode::NotLeader,
            Self::LeaderUnknown => ErrorCode::LeaderUnknown,
            Self::ReplicationFailed { .. } => ErrorCode::ReplicationFailed,
            Self::LeaseExpired => ErrorCode::LeaseExpired,
        }
    }

    /// Returns true if this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. }
                | Self::TabletNotRunning { .. }
                | Self::NotLeader { .. }
                | Self::LeaderUnknown
                | Self::LeaseExpired
        )
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates an illegal state error.
    #[must_use]
    pub fn illegal_state(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::IllegalState {
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
