//! JSON shapes exchanged with the operation service and their decoding into
//! tracker types.

use bytes::BytesMut;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracker_core::{
    OperationKind, OperationRequest, OperationSummary, Payload, ReportedStatus, SessionId,
    Snapshot, Status, StreamEvent, TerminalReport,
};

use crate::{ChannelError, FailureKind};

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub(crate) enum WireRequest<'a> {
    Search {
        query: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        owner_id: Option<&'a str>,
    },
    Upload {
        filename: &'a str,
        content: &'a str,
    },
}

impl<'a> From<&'a OperationRequest> for WireRequest<'a> {
    fn from(request: &'a OperationRequest) -> Self {
        match request {
            OperationRequest::Search { query, owner } => WireRequest::Search {
                query,
                owner_id: owner.as_deref(),
            },
            OperationRequest::UploadJob { filename, csv } => WireRequest::Upload {
                filename,
                content: csv,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    Progress {
        step: String,
        #[serde(default)]
        message: String,
    },
    #[serde(alias = "id_assigned", alias = "session")]
    Id {
        #[serde(alias = "session_id")]
        id: String,
    },
    #[serde(alias = "terminal", alias = "result")]
    Complete {
        #[serde(default)]
        status: Option<String>,
        #[serde(default)]
        payload: Value,
        #[serde(default)]
        error: Option<String>,
    },
    Error {
        #[serde(default, alias = "detail")]
        message: String,
    },
}

/// What one stream line turned into.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Decoded {
    Event(StreamEvent),
    Terminal(TerminalReport),
}

#[derive(Debug, Deserialize)]
struct WireSnapshot {
    #[serde(alias = "session_id")]
    id: String,
    kind: OperationKind,
    status: String,
    #[serde(default)]
    payload: Value,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct WireSummary {
    #[serde(alias = "session_id")]
    id: String,
    #[serde(default)]
    kind: Option<OperationKind>,
    status: String,
    #[serde(default)]
    summary: String,
}

/// Splits a byte stream into lines, tolerating chunks that end mid-line.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: BytesMut,
}

impl LineBuffer {
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line = self.pending.split_to(pos + 1);
            lines.push(String::from_utf8_lossy(&line).trim_end().to_string());
        }
        lines
    }

    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = self.pending.split();
        let line = String::from_utf8_lossy(&rest).trim().to_string();
        (!line.is_empty()).then_some(line)
    }
}

/// Decodes one line of the event stream. Accepts bare JSON lines and SSE
/// `data:` framing; blank lines, comments and other SSE fields yield `None`.
pub(crate) fn decode_event_line(
    kind: OperationKind,
    line: &str,
) -> Result<Option<Decoded>, ChannelError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return Ok(None);
    }
    let body = match line.strip_prefix("data:") {
        Some(data) => data.trim(),
        None if is_sse_field(line) => return Ok(None),
        None => line,
    };
    if body.is_empty() || body == "[DONE]" {
        return Ok(None);
    }

    let event: WireEvent = serde_json::from_str(body)
        .map_err(|err| ChannelError::new(FailureKind::Decode, format!("{err}: {body}")))?;
    let decoded = match event {
        WireEvent::Progress { step, message } => Decoded::Event(StreamEvent::Progress {
            step: ReportedStatus::from_wire(&step),
            message,
        }),
        WireEvent::Id { id } => Decoded::Event(StreamEvent::IdAssigned(session_id(&id)?)),
        WireEvent::Complete {
            status,
            payload,
            error,
        } => {
            let status = match status.as_deref() {
                None => Status::Completed,
                Some(raw) => Status::parse(raw).ok_or_else(|| {
                    ChannelError::new(FailureKind::Decode, format!("unknown terminal status {raw}"))
                })?,
            };
            Decoded::Terminal(TerminalReport {
                status,
                payload: decode_payload(kind, payload)?,
                error,
            })
        }
        WireEvent::Error { message } => Decoded::Terminal(TerminalReport {
            status: Status::Failed,
            payload: Payload::empty(kind),
            error: Some(message),
        }),
    };
    Ok(Some(decoded))
}

fn is_sse_field(line: &str) -> bool {
    ["event:", "id:", "retry:"]
        .iter()
        .any(|field| line.starts_with(field))
}

pub(crate) fn decode_snapshot(body: &[u8]) -> Result<Snapshot, ChannelError> {
    let wire: WireSnapshot = serde_json::from_slice(body)
        .map_err(|err| ChannelError::new(FailureKind::Decode, err.to_string()))?;
    let age = wire
        .started_at
        .and_then(|started| (Utc::now() - started).to_std().ok());
    Ok(Snapshot {
        id: session_id(&wire.id)?,
        kind: wire.kind,
        status: ReportedStatus::from_wire(&wire.status),
        payload: decode_payload(wire.kind, wire.payload)?,
        error: wire.error,
        age,
    })
}

pub(crate) fn decode_summaries(body: &[u8]) -> Result<Vec<OperationSummary>, ChannelError> {
    let wire: Vec<WireSummary> = serde_json::from_slice(body)
        .map_err(|err| ChannelError::new(FailureKind::Decode, err.to_string()))?;
    wire.into_iter()
        .map(|row| -> Result<OperationSummary, ChannelError> {
            Ok(OperationSummary {
                id: session_id(&row.id)?,
                kind: row.kind,
                status: ReportedStatus::from_wire(&row.status),
                summary: row.summary,
            })
        })
        .collect()
}

/// Pulls a human-readable detail out of an error response body.
pub(crate) fn error_detail(body: &[u8]) -> Option<String> {
    let value: Value = serde_json::from_slice(body).ok()?;
    ["detail", "error", "message"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .map(ToOwned::to_owned)
}

fn decode_payload(kind: OperationKind, value: Value) -> Result<Payload, ChannelError> {
    if value.is_null() {
        return Ok(Payload::empty(kind));
    }
    let payload = match kind {
        OperationKind::Search => serde_json::from_value(value).map(Payload::Search),
        OperationKind::UploadJob => serde_json::from_value(value).map(Payload::Upload),
    };
    payload.map_err(|err| ChannelError::new(FailureKind::Decode, err.to_string()))
}

fn session_id(raw: &str) -> Result<SessionId, ChannelError> {
    SessionId::new(raw)
        .ok_or_else(|| ChannelError::new(FailureKind::Decode, format!("invalid session id {raw:?}")))
}
