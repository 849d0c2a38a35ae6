use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{OperationKind, Status};

/// Opaque server-assigned operation identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Accepts any non-empty id that can be carried as a single path segment.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.contains(['/', '?', '#']) {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where an update came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Push transport attached to the originating request.
    Stream,
    /// Periodic snapshot fetch.
    Poll,
    /// One-shot snapshot fetch made while resuming a session.
    Resolve,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Channel::Stream => "stream",
            Channel::Poll => "poll",
            Channel::Resolve => "resolve",
        })
    }
}

/// The channel currently allowed to write session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveWriter {
    #[default]
    None,
    Stream,
    Poll,
}

impl ActiveWriter {
    pub fn accepts(self, source: Channel) -> bool {
        matches!(
            (self, source),
            (ActiveWriter::Stream, Channel::Stream)
                | (ActiveWriter::Poll, Channel::Poll)
                | (ActiveWriter::None, Channel::Resolve)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub headline: Option<String>,
    #[serde(default)]
    pub score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchPayload {
    pub results: Vec<Candidate>,
    #[serde(alias = "sql")]
    pub query_text: Option<String>,
    pub cost: Option<f64>,
    pub elapsed_secs: Option<f64>,
    #[serde(alias = "logs")]
    pub log: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadPayload {
    pub total: u64,
    #[serde(alias = "new_count")]
    pub new: u64,
    pub transformed: u64,
    pub failed: u64,
    pub current_step: Option<String>,
    #[serde(alias = "logs")]
    pub log: String,
    pub error: Option<String>,
}

/// Kind-specific progress accumulator.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Search(SearchPayload),
    Upload(UploadPayload),
}

impl Payload {
    pub fn empty(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Search => Payload::Search(SearchPayload::default()),
            OperationKind::UploadJob => Payload::Upload(UploadPayload::default()),
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            Payload::Search(_) => OperationKind::Search,
            Payload::Upload(_) => OperationKind::UploadJob,
        }
    }

    pub fn log(&self) -> &str {
        match self {
            Payload::Search(search) => &search.log,
            Payload::Upload(upload) => &upload.log,
        }
    }

    pub(crate) fn append_log(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }
        let log = match self {
            Payload::Search(search) => &mut search.log,
            Payload::Upload(upload) => &mut upload.log,
        };
        if !log.is_empty() && !log.ends_with('\n') {
            log.push('\n');
        }
        log.push_str(line);
    }

    pub(crate) fn set_step(&mut self, step: &str) {
        if let Payload::Upload(upload) = self {
            upload.current_step = Some(step.to_string());
        }
    }

    /// Error detail carried inside the payload itself, if any.
    pub fn error_detail(&self) -> Option<&str> {
        match self {
            Payload::Search(_) => None,
            Payload::Upload(upload) => upload.error.as_deref(),
        }
    }
}

/// Client-side record of one long-running operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationSession {
    pub(crate) id: Option<SessionId>,
    pub(crate) kind: OperationKind,
    pub(crate) status: Status,
    pub(crate) unrecognized_status: Option<String>,
    pub(crate) payload: Payload,
    pub(crate) progress_message: Option<String>,
    pub(crate) failure: Option<String>,
    pub(crate) last_update_seq: u64,
    pub(crate) writer: ActiveWriter,
}

impl OperationSession {
    /// A fresh session for an operation this client is about to submit.
    pub fn pending(kind: OperationKind) -> Self {
        Self {
            id: None,
            kind,
            status: Status::Pending,
            unrecognized_status: None,
            payload: Payload::empty(kind),
            progress_message: None,
            failure: None,
            last_update_seq: 0,
            writer: ActiveWriter::None,
        }
    }

    /// A placeholder for a session being resumed by id; the first snapshot
    /// fills it in.
    pub fn resuming(id: SessionId, kind: OperationKind) -> Self {
        Self {
            id: Some(id),
            ..Self::pending(kind)
        }
    }

    pub fn with_writer(mut self, writer: ActiveWriter) -> Self {
        self.writer = writer;
        self
    }

    pub fn id(&self) -> Option<&SessionId> {
        self.id.as_ref()
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn unrecognized_status(&self) -> Option<&str> {
        self.unrecognized_status.as_deref()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn progress_message(&self) -> Option<&str> {
        self.progress_message.as_deref()
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn last_update_seq(&self) -> u64 {
        self.last_update_seq
    }

    pub fn writer(&self) -> ActiveWriter {
        self.writer
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub(crate) fn set_writer(&mut self, writer: ActiveWriter) {
        self.writer = writer;
    }

    /// Display label for the current status, falling back to the generic
    /// processing label while the last report was outside the vocabulary.
    pub fn status_label(&self) -> &'static str {
        match (&self.unrecognized_status, self.status.is_terminal()) {
            (Some(_), false) => crate::PROCESSING_LABEL,
            _ => self.status.label(),
        }
    }
}
