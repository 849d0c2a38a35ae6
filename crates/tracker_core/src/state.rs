use crate::view_model::{HistoryRowView, ProgressView, TrackerViewModel};
use crate::{
    reconcile, ActiveWriter, AttachId, Channel, Effect, OperationKind, OperationSession,
    OperationSummary, Payload, PollGeneration, PollOrigin, PollPolicy, Route, SessionId,
    SessionUpdate, Status, TrackerError, GENERIC_FAILURE,
};
use tracker_logging::{tracker_debug, tracker_info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    /// Fetching the first snapshot of a resumed session.
    Resolving,
    /// A channel is attached to a non-terminal session.
    Tracking,
    /// Terminal status reached, or the resume failed.
    Finished,
    /// The hosting view is gone; all messages are ignored.
    TornDown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryState {
    pub owner: String,
    pub entries: Vec<OperationSummary>,
}

/// State owned by the one mounted view.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrackerState {
    phase: Phase,
    session: Option<OperationSession>,
    resolving: Option<SessionId>,
    route: Option<Route>,
    attach: AttachId,
    poll_generation: PollGeneration,
    poll_active: bool,
    poll_failures: u32,
    policy: PollPolicy,
    error: Option<TrackerError>,
    history: Option<HistoryState>,
    history_pending: Option<String>,
    dirty: bool,
}

impl TrackerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: PollPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session(&self) -> Option<&OperationSession> {
        self.session.as_ref()
    }

    pub fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }

    pub fn error(&self) -> Option<&TrackerError> {
        self.error.as_ref()
    }

    pub fn history(&self) -> Option<&HistoryState> {
        self.history.as_ref()
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    pub fn is_polling(&self) -> bool {
        self.poll_active
    }

    /// Nothing is in flight and nothing more will arrive for this view.
    pub fn is_settled(&self) -> bool {
        self.history_pending.is_none()
            && matches!(self.phase, Phase::Idle | Phase::Finished | Phase::TornDown)
    }

    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub fn view(&self) -> TrackerViewModel {
        let session = self.session.as_ref();
        let status = session.map(OperationSession::status);
        let failure = session
            .filter(|session| session.status() == Status::Failed)
            .map(|session| session.failure().unwrap_or(GENERIC_FAILURE).to_string());
        let status_label = match (session, self.phase) {
            (Some(session), _) => session.status_label(),
            (None, Phase::Resolving) => "Loading...",
            (None, _) => "",
        };
        TrackerViewModel {
            phase: self.phase,
            route: self.route.clone(),
            session_id: session.and_then(|s| s.id().cloned()),
            kind: session.map(OperationSession::kind),
            status,
            status_label,
            progress_message: session.and_then(|s| s.progress_message().map(str::to_string)),
            progress: session
                .map(|s| ProgressView::from_payload(s.payload()))
                .unwrap_or_default(),
            log: session.map(|s| s.payload().log().to_string()).unwrap_or_default(),
            failure,
            error: self.error.as_ref().map(TrackerError::user_message),
            active_channel: session.map(OperationSession::writer).unwrap_or_default(),
            loading: match self.phase {
                Phase::Resolving => true,
                Phase::Tracking => !status.is_some_and(Status::is_terminal),
                _ => false,
            },
            history: self
                .history
                .as_ref()
                .map(|history| history.entries.iter().map(HistoryRowView::from).collect())
                .unwrap_or_default(),
            dirty: self.dirty,
        }
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn is_current_attach(&self, attach: AttachId) -> bool {
        attach == self.attach
            && self
                .session
                .as_ref()
                .is_some_and(|session| session.writer() == ActiveWriter::Stream)
    }

    pub(crate) fn is_current_poll(&self, generation: PollGeneration) -> bool {
        self.poll_active && generation == self.poll_generation
    }

    pub(crate) fn is_resolving(&self, id: &SessionId) -> bool {
        self.phase == Phase::Resolving && self.resolving.as_ref() == Some(id)
    }

    /// Stops whichever channel is attached and returns the effects doing so.
    pub(crate) fn release_channels(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(session) = self.session.as_mut() {
            if session.writer() == ActiveWriter::Stream {
                effects.push(Effect::AbandonStream {
                    attach: self.attach,
                });
            }
            session.set_writer(ActiveWriter::None);
        }
        if self.poll_active {
            effects.push(Effect::StopPolling {
                generation: self.poll_generation,
            });
            self.poll_active = false;
        }
        self.resolving = None;
        effects
    }

    /// Creates a pending session with the stream as its writer.
    pub(crate) fn attach_stream(&mut self, kind: OperationKind) -> AttachId {
        self.attach += 1;
        let mut session = OperationSession::pending(kind);
        session.set_writer(ActiveWriter::Stream);
        self.session = Some(session);
        self.route = None;
        self.error = None;
        self.phase = Phase::Tracking;
        self.mark_dirty();
        self.attach
    }

    pub(crate) fn begin_resolve(&mut self, route: Route) -> SessionId {
        let id = route.id().clone();
        self.session = None;
        self.route = Some(route);
        self.error = None;
        self.resolving = Some(id.clone());
        self.phase = Phase::Resolving;
        self.mark_dirty();
        id
    }

    pub(crate) fn finish_resolve(&mut self) {
        self.resolving = None;
    }

    /// Installs the first snapshot of a resumed session.
    pub(crate) fn install_resolved(&mut self, session: OperationSession) {
        if let Some(id) = session.id().cloned() {
            // The server's kind wins over whatever collection the route named.
            self.route = Some(Route::new(Some(session.kind()), id));
        }
        self.phase = if session.is_terminal() {
            Phase::Finished
        } else {
            Phase::Tracking
        };
        self.session = Some(session);
        self.mark_dirty();
    }

    pub(crate) fn fail(&mut self, error: TrackerError) {
        self.error = Some(error);
        self.phase = Phase::Finished;
        self.mark_dirty();
    }

    /// Runs the reconciler against the current session. Rejections are logged
    /// and leave the state untouched.
    pub(crate) fn apply(&mut self, update: &SessionUpdate, source: Channel) -> bool {
        let Some(current) = self.session.as_ref() else {
            tracker_debug!("dropping {source} update: no session");
            return false;
        };
        match reconcile(current, update, source) {
            Ok(next) => {
                if next.is_terminal() {
                    let label = next.id().map(SessionId::to_string).unwrap_or_default();
                    tracker_info!(session = label; "reached {} via {source}", next.status());
                }
                self.session = Some(next);
                self.mark_dirty();
                true
            }
            Err(stale) => {
                let label = current.id().map(SessionId::to_string).unwrap_or_default();
                tracker_debug!(session = label; "discarded {source} update: {stale}");
                false
            }
        }
    }

    /// Switches the writer to the poller and returns the start effect.
    pub(crate) fn start_polling(&mut self, origin: PollOrigin) -> Option<Effect> {
        let session = self.session.as_mut()?;
        let id = session.id()?.clone();
        if session.is_terminal() {
            return None;
        }
        session.set_writer(ActiveWriter::Poll);
        self.poll_generation += 1;
        self.poll_active = true;
        self.poll_failures = 0;
        self.phase = Phase::Tracking;
        self.mark_dirty();
        tracker_info!(session = id; "polling started (generation {})", self.poll_generation);
        Some(Effect::StartPolling {
            generation: self.poll_generation,
            id,
            origin,
        })
    }

    pub(crate) fn stop_polling(&mut self) -> Effect {
        self.poll_active = false;
        if let Some(session) = self.session.as_mut() {
            session.set_writer(ActiveWriter::None);
        }
        self.settle_if_terminal();
        Effect::StopPolling {
            generation: self.poll_generation,
        }
    }

    /// Detaches the stream writer, leaving the session with no writer.
    pub(crate) fn detach_stream_writer(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.set_writer(ActiveWriter::None);
        }
        self.settle_if_terminal();
    }

    pub(crate) fn current_attach(&self) -> AttachId {
        self.attach
    }

    pub(crate) fn record_poll_failure(&mut self) -> u32 {
        self.poll_failures += 1;
        self.poll_failures
    }

    pub(crate) fn reset_poll_failures(&mut self) {
        self.poll_failures = 0;
    }

    pub(crate) fn session_kind(&self) -> Option<OperationKind> {
        self.session.as_ref().map(OperationSession::kind)
    }

    pub(crate) fn set_route(&mut self, route: Route) {
        self.route = Some(route);
        self.mark_dirty();
    }

    pub(crate) fn request_history(&mut self, owner: String) {
        self.history_pending = Some(owner);
        self.mark_dirty();
    }

    pub(crate) fn take_history_request(&mut self, owner: &str) -> bool {
        if self.history_pending.as_deref() == Some(owner) {
            self.history_pending = None;
            true
        } else {
            false
        }
    }

    pub(crate) fn set_history(&mut self, history: HistoryState) {
        self.history = Some(history);
        self.mark_dirty();
    }

    pub(crate) fn set_error(&mut self, error: TrackerError) {
        self.error = Some(error);
        self.mark_dirty();
    }

    pub(crate) fn tear_down(&mut self) {
        self.phase = Phase::TornDown;
        self.history_pending = None;
        self.mark_dirty();
    }

    fn settle_if_terminal(&mut self) {
        if self.session.as_ref().is_some_and(OperationSession::is_terminal) {
            self.phase = Phase::Finished;
        }
        self.mark_dirty();
    }
}

impl ProgressView {
    fn from_payload(payload: &Payload) -> Self {
        match payload {
            Payload::Search(search) => ProgressView::Search {
                result_count: search.results.len(),
                top_results: search
                    .results
                    .iter()
                    .take(5)
                    .map(|candidate| candidate.name.clone())
                    .collect(),
                query_text: search.query_text.clone(),
                cost: search.cost,
                elapsed_secs: search.elapsed_secs,
            },
            Payload::Upload(upload) => ProgressView::Upload {
                total: upload.total,
                new: upload.new,
                transformed: upload.transformed,
                failed: upload.failed,
                current_step: upload.current_step.clone(),
            },
        }
    }
}
