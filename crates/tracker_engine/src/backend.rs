use std::sync::mpsc;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response, StatusCode};
use tracker_core::{
    AttachId, OperationKind, OperationRequest, OperationSummary, SessionId, Snapshot, StreamEvent,
    TerminalReport,
};
use tracker_logging::{tracker_debug, tracker_warn};
use url::Url;

use crate::wire::{self, Decoded, LineBuffer, WireRequest};
use crate::{ChannelError, EngineEvent, FailureKind};

#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// Root of the operation service, e.g. `https://app.example.com/api`.
    pub base_url: String,
    pub connect_timeout: Duration,
    /// Timeout for snapshot and listing requests.
    pub request_timeout: Duration,
    /// Longest gap tolerated between two chunks of an event stream.
    pub stream_idle_timeout: Duration,
    pub bearer_token: Option<String>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            stream_idle_timeout: Duration::from_secs(120),
            bearer_token: None,
        }
    }
}

/// Receives stream events before the terminal one.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: StreamEvent);
}

/// Forwards stream events for one attachment into the engine's event queue.
pub struct ChannelEventSink {
    attach: AttachId,
    tx: mpsc::Sender<EngineEvent>,
}

impl ChannelEventSink {
    pub fn new(attach: AttachId, tx: mpsc::Sender<EngineEvent>) -> Self {
        Self { attach, tx }
    }
}

impl EventSink for ChannelEventSink {
    fn emit(&self, event: StreamEvent) {
        let _ = self.tx.send(EngineEvent::Stream {
            attach: self.attach,
            event,
        });
    }
}

/// The operation service as seen by the client.
#[async_trait::async_trait]
pub trait OperationBackend: Send + Sync {
    /// Submits an operation and follows its event stream. Progress and early-id
    /// events go to `sink`; the terminal report is returned. Fails if the
    /// connection ends before a terminal event.
    async fn submit(
        &self,
        request: &OperationRequest,
        sink: &dyn EventSink,
    ) -> Result<TerminalReport, ChannelError>;

    async fn fetch_snapshot(&self, id: &SessionId) -> Result<Snapshot, ChannelError>;

    async fn list_operations(&self, owner: &str) -> Result<Vec<OperationSummary>, ChannelError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestBackend {
    settings: BackendSettings,
    base: Url,
    client: reqwest::Client,
}

impl ReqwestBackend {
    pub fn new(settings: BackendSettings) -> Result<Self, ChannelError> {
        let base = Url::parse(&settings.base_url)
            .map_err(|err| ChannelError::new(FailureKind::InvalidUrl, err.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(ChannelError::new(
                FailureKind::InvalidUrl,
                format!("{} cannot be used as a base url", settings.base_url),
            ));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| ChannelError::new(FailureKind::Network, err.to_string()))?;
        Ok(Self {
            settings,
            base,
            client,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ChannelError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ChannelError::new(FailureKind::InvalidUrl, "base url has no path"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.settings.bearer_token {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }

    async fn get_json(&self, url: Url) -> Result<bytes::Bytes, ChannelError> {
        let response = self
            .authorize(self.client.get(url))
            .header(ACCEPT, "application/json")
            .timeout(self.settings.request_timeout)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = ensure_success(response).await?;
        response.bytes().await.map_err(map_reqwest_error)
    }

    fn handle_line(
        &self,
        kind: OperationKind,
        line: &str,
        sink: &dyn EventSink,
    ) -> Result<Option<TerminalReport>, ChannelError> {
        match wire::decode_event_line(kind, line)? {
            None => Ok(None),
            Some(Decoded::Event(event)) => {
                tracker_debug!("stream event {event:?}");
                sink.emit(event);
                Ok(None)
            }
            Some(Decoded::Terminal(report)) => Ok(Some(report)),
        }
    }
}

#[async_trait::async_trait]
impl OperationBackend for ReqwestBackend {
    async fn submit(
        &self,
        request: &OperationRequest,
        sink: &dyn EventSink,
    ) -> Result<TerminalReport, ChannelError> {
        let kind = request.kind();
        let collection = match kind {
            OperationKind::Search => "search",
            OperationKind::UploadJob => "upload-jobs",
        };
        let url = self.endpoint(&[collection, "stream"])?;
        let body = serde_json::to_vec(&WireRequest::from(request))
            .map_err(|err| ChannelError::new(FailureKind::Decode, err.to_string()))?;

        let response = self
            .authorize(self.client.post(url))
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/x-ndjson, text/event-stream")
            .body(body)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        let response = ensure_success(response).await?;

        let mut lines = LineBuffer::default();
        let mut stream = response.bytes_stream();
        loop {
            let next = tokio::time::timeout(self.settings.stream_idle_timeout, stream.next())
                .await
                .map_err(|_| ChannelError::new(FailureKind::Idle, "no events received"))?;
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(map_reqwest_error)?;
            for line in lines.push(&chunk) {
                if let Some(report) = self.handle_line(kind, &line, sink)? {
                    return Ok(report);
                }
            }
        }
        if let Some(line) = lines.finish() {
            if let Some(report) = self.handle_line(kind, &line, sink)? {
                return Ok(report);
            }
        }

        tracker_warn!("{kind} stream closed without a terminal event");
        Err(ChannelError::new(
            FailureKind::Network,
            "stream closed before the operation finished",
        ))
    }

    async fn fetch_snapshot(&self, id: &SessionId) -> Result<Snapshot, ChannelError> {
        let url = self.endpoint(&["operations", id.as_str()])?;
        let body = self.get_json(url).await?;
        let snapshot = wire::decode_snapshot(&body)?;
        if &snapshot.id != id {
            return Err(ChannelError::new(
                FailureKind::Decode,
                format!("asked for {id}, server answered with {}", snapshot.id),
            ));
        }
        Ok(snapshot)
    }

    async fn list_operations(&self, owner: &str) -> Result<Vec<OperationSummary>, ChannelError> {
        let mut url = self.endpoint(&["operations"])?;
        url.query_pairs_mut().append_pair("owner", owner);
        let body = self.get_json(url).await?;
        wire::decode_summaries(&body)
    }
}

async fn ensure_success(response: Response) -> Result<Response, ChannelError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.bytes().await.unwrap_or_default();
    let detail = wire::error_detail(&body).unwrap_or_else(|| status.to_string());
    let kind = match status {
        StatusCode::NOT_FOUND | StatusCode::FORBIDDEN | StatusCode::GONE => FailureKind::NotFound,
        other => FailureKind::HttpStatus(other.as_u16()),
    };
    Err(ChannelError::new(kind, detail))
}

fn map_reqwest_error(err: reqwest::Error) -> ChannelError {
    if err.is_timeout() {
        return ChannelError::new(FailureKind::Timeout, err.to_string());
    }
    if err.is_builder() {
        return ChannelError::new(FailureKind::InvalidUrl, err.to_string());
    }
    ChannelError::new(FailureKind::Network, err.to_string())
}
