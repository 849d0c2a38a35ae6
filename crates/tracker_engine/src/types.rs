use std::fmt;

use tracker_core::{
    AttachId, OperationSummary, PollGeneration, SessionId, Snapshot, StreamEvent, TrackerError,
};

/// Events the engine reports back to the owner of the view state.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Stream {
        attach: AttachId,
        event: StreamEvent,
    },
    StreamFailed {
        attach: AttachId,
        error: ChannelError,
    },
    /// The stream stayed silent past the idle limit and was dropped. The
    /// operation itself is not known to have failed.
    StreamIdle {
        attach: AttachId,
    },
    Resolved {
        id: SessionId,
        result: Result<Snapshot, ChannelError>,
    },
    Polled {
        generation: PollGeneration,
        result: Result<Snapshot, ChannelError>,
    },
    History {
        owner: String,
        result: Result<Vec<OperationSummary>, ChannelError>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelError {
    pub kind: FailureKind,
    pub message: String,
}

impl ChannelError {
    pub(crate) fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Maps the channel failure into the tracker taxonomy for session `id`.
    pub fn into_tracker_error(self, id: &SessionId) -> TrackerError {
        match self.kind {
            FailureKind::NotFound => TrackerError::NotFound(id.clone()),
            _ => TrackerError::Transport(self.to_string()),
        }
    }
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.kind)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for ChannelError {}

impl From<ChannelError> for TrackerError {
    fn from(err: ChannelError) -> Self {
        TrackerError::Transport(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    InvalidUrl,
    HttpStatus(u16),
    /// The session is unknown or not accessible to this caller.
    NotFound,
    Timeout,
    Network,
    /// The server sent something that does not decode.
    Decode,
    /// No stream bytes arrived within the configured idle limit.
    Idle,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::InvalidUrl => write!(f, "invalid url"),
            FailureKind::HttpStatus(code) => write!(f, "http status {code}"),
            FailureKind::NotFound => write!(f, "not found"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Network => write!(f, "network error"),
            FailureKind::Decode => write!(f, "malformed response"),
            FailureKind::Idle => write!(f, "stream went idle"),
        }
    }
}
