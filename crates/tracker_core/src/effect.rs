use std::time::Duration;

use crate::{OperationRequest, Route, SessionId};

/// Identifies one stream attachment; events from older attachments are
/// ignored.
pub type AttachId = u64;

/// Identifies one polling task; results from older tasks are ignored.
pub type PollGeneration = u64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    OpenStream {
        attach: AttachId,
        request: OperationRequest,
    },
    AbandonStream {
        attach: AttachId,
    },
    StartPolling {
        generation: PollGeneration,
        id: SessionId,
        origin: PollOrigin,
    },
    StopPolling {
        generation: PollGeneration,
    },
    FetchSnapshot {
        id: SessionId,
    },
    /// Make the navigable address point at this session.
    ReplaceRoute(Route),
    ListOperations {
        owner: String,
    },
}

/// How a polling task should derive the operation's age for its schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOrigin {
    /// The operation was submitted by this client; its age runs from the
    /// submission.
    Submitted,
    /// The operation was resumed; `age` comes from the server when known.
    Resumed { age: Option<Duration> },
}
