//! Error types for Starmark.

use crate::host::HostError;
use starmark_types::InvalidMessageRef;
use thiserror::Error;

/// Why the host refused a preview or edit operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusyReason {
    Generating,
    Saving,
}

impl std::fmt::Display for BusyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusyReason::Generating => f.write_str("a reply is being generated"),
            BusyReason::Saving => f.write_str("the chat is being saved"),
        }
    }
}

#[derive(Error, Debug)]
pub enum StarmarkError {
    #[error("Active chat mismatch: expected {expected}, got {}", actual.as_deref().unwrap_or("none"))]
    ContextMismatch {
        expected: String,
        actual: Option<String>,
    },

    #[error("Host operation '{operation}' failed: {reason}")]
    HostOperationFailed {
        operation: &'static str,
        reason: String,
    },

    #[error("Host is busy ({0}), try again later")]
    HostBusy(BusyReason),

    #[error("A preview is already being built for chat {0}")]
    PreviewInProgress(String),

    #[error("Chat {0} has no favorites to preview")]
    NothingToPreview(String),

    #[error("No chat is open")]
    NoActiveChat,

    #[error(transparent)]
    InvalidMessageRef(#[from] InvalidMessageRef),

    #[error("Message {index} does not exist (chat has {len} messages)")]
    MessageOutOfRange { index: usize, len: usize },

    #[error("Database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl StarmarkError {
    /// Wrap a host failure with the name of the operation that produced it.
    pub fn host(operation: &'static str, err: HostError) -> Self {
        StarmarkError::HostOperationFailed {
            operation,
            reason: err.to_string(),
        }
    }
}
