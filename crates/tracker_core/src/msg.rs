use std::time::Duration;

use crate::{
    AttachId, OperationKind, Payload, PollGeneration, ReportedStatus, Route, SessionId, Status,
    TrackerError,
};

/// What the user asked the server to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationRequest {
    Search {
        query: String,
        owner: Option<String>,
    },
    /// Bulk CSV import.
    UploadJob { filename: String, csv: String },
}

impl OperationRequest {
    pub fn kind(&self) -> OperationKind {
        match self {
            OperationRequest::Search { .. } => OperationKind::Search,
            OperationRequest::UploadJob { .. } => OperationKind::UploadJob,
        }
    }
}

/// Final event of a stream, carrying the full result payload.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalReport {
    pub status: Status,
    pub payload: Payload,
    pub error: Option<String>,
}

/// Incremental events delivered by the streaming channel.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Progress {
        step: ReportedStatus,
        message: String,
    },
    IdAssigned(SessionId),
    Terminal(TerminalReport),
}

/// Full state of a session as held by the server.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub id: SessionId,
    pub kind: OperationKind,
    pub status: ReportedStatus,
    pub payload: Payload,
    pub error: Option<String>,
    /// Time since the server started the operation, when known.
    pub age: Option<Duration>,
}

/// Row of the read-only history listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSummary {
    pub id: SessionId,
    pub kind: Option<OperationKind>,
    pub status: ReportedStatus,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// User started a new operation.
    Submit(OperationRequest),
    /// User navigated to a route naming an existing session.
    Resume(Route),
    /// Result of the one-shot snapshot fetch for a resume.
    Resolved {
        id: SessionId,
        result: Result<Snapshot, TrackerError>,
    },
    /// Event from the stream opened for attachment `attach`.
    Stream { attach: AttachId, event: StreamEvent },
    /// The stream failed at the transport level before a terminal event.
    StreamFailed { attach: AttachId, message: String },
    /// The hosting view let go of the stream while keeping the session on
    /// screen; polling takes over.
    DetachStream,
    /// The stream for attachment `attach` stayed silent past the idle limit
    /// and was let go. The server job keeps running, so this is handled like
    /// a detach.
    StreamIdle { attach: AttachId },
    /// One poll tick's result.
    Polled {
        generation: PollGeneration,
        result: Result<Snapshot, TrackerError>,
    },
    /// User opened the history view.
    HistoryRequested { owner: String },
    HistoryLoaded {
        owner: String,
        result: Result<Vec<OperationSummary>, TrackerError>,
    },
    /// The hosting view is gone; stop everything.
    Teardown,
    /// Loop tick while waiting for engine events.
    Tick,
}
