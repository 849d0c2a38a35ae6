use thiserror::Error;

use crate::{Channel, SessionId, Status};

/// Generic message shown when a failure carries no server detail.
pub const GENERIC_FAILURE: &str = "The operation failed. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackerError {
    /// Network or connection failure on either channel.
    #[error("transport error: {0}")]
    Transport(String),
    /// The server reported the operation as failed.
    #[error("{0}")]
    OperationFailed(String),
    /// The session id is unknown or not accessible to this caller.
    #[error("session {0} not found")]
    NotFound(SessionId),
    /// An out-of-order update was discarded.
    #[error("stale update discarded: {0}")]
    StaleUpdate(#[from] StaleUpdate),
}

impl TrackerError {
    /// Text suitable for showing to the user.
    pub fn user_message(&self) -> String {
        match self {
            TrackerError::OperationFailed(detail) if !detail.trim().is_empty() => detail.clone(),
            TrackerError::OperationFailed(_) => GENERIC_FAILURE.to_string(),
            other => other.to_string(),
        }
    }
}

/// Why the reconciler rejected an update.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StaleUpdate {
    #[error("session is already {0}")]
    Frozen(Status),
    #[error("{channel} is not the active writer")]
    InactiveWriter { channel: Channel },
    #[error("status would regress from {current} to {incoming}")]
    Regression { current: Status, incoming: Status },
    #[error("update for session {incoming} does not match session {current}")]
    ForeignSession {
        current: SessionId,
        incoming: SessionId,
    },
    #[error("payload kind does not match the session kind")]
    KindMismatch,
}
