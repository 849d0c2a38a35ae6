use std::collections::HashMap;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracker_core::{
    AttachId, OperationRequest, PollGeneration, PollOrigin, PollPolicy, SessionId, StreamEvent,
};
use tracker_logging::{tracker_error, tracker_info, tracker_warn};

use crate::backend::{BackendSettings, ChannelEventSink, OperationBackend, ReqwestBackend};
use crate::poll::{spawn_poller, PollSchedule, PollTask};
use crate::{ChannelError, EngineEvent, FailureKind};

#[derive(Debug)]
enum EngineCommand {
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
    ListOperations {
        owner: String,
    },
    Shutdown,
}

/// Runs the stream and poll channels on a dedicated thread with a
/// single-threaded runtime. Commands go in, [`EngineEvent`]s come out.
pub struct EngineHandle {
    cmd_tx: UnboundedSender<EngineCommand>,
    event_rx: mpsc::Receiver<EngineEvent>,
}

impl EngineHandle {
    pub fn new(settings: BackendSettings, policy: PollPolicy) -> Result<Self, ChannelError> {
        let backend = ReqwestBackend::new(settings)?;
        Ok(Self::with_backend(Arc::new(backend), policy))
    }

    pub fn with_backend(backend: Arc<dyn OperationBackend>, policy: PollPolicy) -> Self {
        let (cmd_tx, cmd_rx) = unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel();

        thread::spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => runtime,
                Err(err) => {
                    tracker_error!("failed to start engine runtime: {err}");
                    return;
                }
            };
            runtime.block_on(run_engine(backend, policy, cmd_rx, event_tx));
        });

        Self { cmd_tx, event_rx }
    }

    pub fn open_stream(&self, attach: AttachId, request: OperationRequest) {
        self.send(EngineCommand::OpenStream { attach, request });
    }

    pub fn abandon_stream(&self, attach: AttachId) {
        self.send(EngineCommand::AbandonStream { attach });
    }

    pub fn start_polling(&self, generation: PollGeneration, id: SessionId, origin: PollOrigin) {
        self.send(EngineCommand::StartPolling {
            generation,
            id,
            origin,
        });
    }

    pub fn stop_polling(&self, generation: PollGeneration) {
        self.send(EngineCommand::StopPolling { generation });
    }

    pub fn fetch_snapshot(&self, id: SessionId) {
        self.send(EngineCommand::FetchSnapshot { id });
    }

    pub fn list_operations(&self, owner: impl Into<String>) {
        self.send(EngineCommand::ListOperations {
            owner: owner.into(),
        });
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    fn send(&self, command: EngineCommand) {
        if self.cmd_tx.send(command).is_err() {
            tracker_warn!("engine is no longer running; command dropped");
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(EngineCommand::Shutdown);
    }
}

struct EngineLoop {
    backend: Arc<dyn OperationBackend>,
    policy: PollPolicy,
    event_tx: mpsc::Sender<EngineEvent>,
    streams: HashMap<AttachId, CancellationToken>,
    pollers: HashMap<PollGeneration, PollTask>,
    submitted_at: Option<Instant>,
}

async fn run_engine(
    backend: Arc<dyn OperationBackend>,
    policy: PollPolicy,
    mut cmd_rx: UnboundedReceiver<EngineCommand>,
    event_tx: mpsc::Sender<EngineEvent>,
) {
    let mut engine = EngineLoop {
        backend,
        policy,
        event_tx,
        streams: HashMap::new(),
        pollers: HashMap::new(),
        submitted_at: None,
    };
    while let Some(command) = cmd_rx.recv().await {
        if matches!(command, EngineCommand::Shutdown) {
            break;
        }
        engine.handle(command);
    }
    engine.shutdown();
}

impl EngineLoop {
    fn handle(&mut self, command: EngineCommand) {
        self.streams.retain(|_, token| !token.is_cancelled());
        match command {
            EngineCommand::OpenStream { attach, request } => {
                tracker_info!("opening {} stream (attach {attach})", request.kind());
                self.submitted_at = Some(Instant::now());
                let token = CancellationToken::new();
                self.streams.insert(attach, token.clone());
                tokio::spawn(follow_stream(
                    self.backend.clone(),
                    attach,
                    request,
                    token,
                    self.event_tx.clone(),
                ));
            }
            EngineCommand::AbandonStream { attach } => {
                if let Some(token) = self.streams.remove(&attach) {
                    tracker_info!("abandoning stream (attach {attach})");
                    token.cancel();
                }
            }
            EngineCommand::StartPolling {
                generation,
                id,
                origin,
            } => {
                let schedule = PollSchedule::new(self.policy, self.age_for(origin));
                let task = spawn_poller(
                    self.backend.clone(),
                    generation,
                    id,
                    schedule,
                    self.event_tx.clone(),
                );
                self.pollers.insert(generation, task);
            }
            EngineCommand::StopPolling { generation } => {
                self.pollers.remove(&generation);
            }
            EngineCommand::FetchSnapshot { id } => {
                let backend = self.backend.clone();
                let event_tx = self.event_tx.clone();
                tokio::spawn(async move {
                    let result = backend.fetch_snapshot(&id).await;
                    let _ = event_tx.send(EngineEvent::Resolved { id, result });
                });
            }
            EngineCommand::ListOperations { owner } => {
                let backend = self.backend.clone();
                let event_tx = self.event_tx.clone();
                tokio::spawn(async move {
                    let result = backend.list_operations(&owner).await;
                    let _ = event_tx.send(EngineEvent::History { owner, result });
                });
            }
            EngineCommand::Shutdown => {}
        }
    }

    fn age_for(&self, origin: PollOrigin) -> Duration {
        match origin {
            PollOrigin::Submitted => self
                .submitted_at
                .map(|at| at.elapsed())
                .unwrap_or(Duration::ZERO),
            PollOrigin::Resumed { age: Some(age) } => age,
            PollOrigin::Resumed { age: None } => self.policy.long_lived_age(),
        }
    }

    fn shutdown(&mut self) {
        for token in self.streams.values() {
            token.cancel();
        }
        self.streams.clear();
        self.pollers.clear();
        tracker_info!("engine stopped");
    }
}

async fn follow_stream(
    backend: Arc<dyn OperationBackend>,
    attach: AttachId,
    request: OperationRequest,
    token: CancellationToken,
    event_tx: mpsc::Sender<EngineEvent>,
) {
    let sink = ChannelEventSink::new(attach, event_tx.clone());
    let outcome = tokio::select! {
        _ = token.cancelled() => return,
        outcome = backend.submit(&request, &sink) => outcome,
    };
    token.cancel();

    let event = match outcome {
        Ok(report) => EngineEvent::Stream {
            attach,
            event: StreamEvent::Terminal(report),
        },
        Err(error) if error.kind == FailureKind::Idle => {
            tracker_info!("stream idle (attach {attach}), leaving it to polling");
            EngineEvent::StreamIdle { attach }
        }
        Err(error) => {
            tracker_warn!("stream failed (attach {attach}): {error}");
            EngineEvent::StreamFailed { attach, error }
        }
    };
    let _ = event_tx.send(event);
}
