//! Error types for the Swizil engine.

use crate::ItemId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The remote call a [`RemoteOperationError`] was raised for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum RemoteOperation {
    Fetch,
    Create { temp_id: ItemId },
    Update { id: ItemId },
    Delete { id: ItemId },
}

impl fmt::Display for RemoteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteOperation::Fetch => write!(f, "fetch"),
            RemoteOperation::Create { temp_id } => write!(f, "create of {temp_id}"),
            RemoteOperation::Update { id } => write!(f, "update of {id}"),
            RemoteOperation::Delete { id } => write!(f, "delete of {id}"),
        }
    }
}

/// A call against the remote item store failed.
///
/// Carries the attempted operation and the underlying cause as reported by
/// the transport. Never fatal: the entries involved stay queued for retry.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("remote {operation} failed: {cause}")]
pub struct RemoteOperationError {
    pub operation: RemoteOperation,
    pub cause: String,
}

impl RemoteOperationError {
    pub fn new(operation: RemoteOperation, cause: impl Into<String>) -> Self {
        Self {
            operation,
            cause: cause.into(),
        }
    }
}

/// All possible errors from the Swizil engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// A local operation targeted an item that is no longer present.
    #[error("stale reference: {0}")]
    StaleReference(ItemId),

    /// A drain was requested while another one is running.
    #[error("drain already in progress")]
    ReentrantDrain,

    #[error(transparent)]
    Remote(#[from] RemoteOperationError),

    #[error("unexpected completion: {0}")]
    UnexpectedCompletion(String),

    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::StaleReference(ItemId::Temporary(3));
        assert_eq!(err.to_string(), "stale reference: temp-3");

        let err = Error::InvalidIdentifier("temp-x".into());
        assert_eq!(err.to_string(), "invalid identifier: \"temp-x\"");

        let err: Error = RemoteOperationError::new(
            RemoteOperation::Delete {
                id: ItemId::canonical("7"),
            },
            "connection reset",
        )
        .into();
        assert_eq!(err.to_string(), "remote delete of 7 failed: connection reset");
    }

    #[test]
    fn remote_operation_serialization() {
        let op = RemoteOperation::Update {
            id: ItemId::canonical("12"),
        };
        let json = serde_json::to_string(&op).unwrap();
        assert_eq!(json, r#"{"kind":"update","id":"12"}"#);

        let op = RemoteOperation::Create {
            temp_id: ItemId::Temporary(1),
        };
        let json = serde_json::to_string(&op).unwrap();
        assert_eq!(json, r#"{"kind":"create","tempId":"temp-1"}"#);
    }
}
