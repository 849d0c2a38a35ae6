use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracker_core::{PollGeneration, PollPolicy, SessionId};
use tracker_logging::{tracker_debug, tracker_info};

use crate::backend::OperationBackend;
use crate::{EngineEvent, FailureKind};

/// Picks the delay before each snapshot fetch from the operation's age.
#[derive(Debug, Clone)]
pub struct PollSchedule {
    policy: PollPolicy,
    age_at_start: Duration,
    started: Instant,
}

impl PollSchedule {
    pub fn new(policy: PollPolicy, age_at_start: Duration) -> Self {
        Self {
            policy,
            age_at_start,
            started: Instant::now(),
        }
    }

    pub fn operation_age(&self) -> Duration {
        self.age_at_start + self.started.elapsed()
    }

    pub fn next_period(&self) -> Duration {
        self.policy.period_for(self.operation_age())
    }
}

/// Owns a running poll loop; dropping it stops the loop.
#[derive(Debug)]
pub(crate) struct PollTask {
    token: CancellationToken,
}

impl Drop for PollTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

pub(crate) fn spawn_poller(
    backend: Arc<dyn OperationBackend>,
    generation: PollGeneration,
    id: SessionId,
    schedule: PollSchedule,
    event_tx: mpsc::Sender<EngineEvent>,
) -> PollTask {
    let token = CancellationToken::new();
    tokio::spawn(run_poll_loop(
        backend,
        generation,
        id,
        schedule,
        token.clone(),
        event_tx,
    ));
    PollTask { token }
}

/// Fetches a snapshot every scheduled period until cancelled. The loop ends
/// by itself after delivering a terminal snapshot or a not-found answer.
async fn run_poll_loop(
    backend: Arc<dyn OperationBackend>,
    generation: PollGeneration,
    id: SessionId,
    schedule: PollSchedule,
    token: CancellationToken,
    event_tx: mpsc::Sender<EngineEvent>,
) {
    tracker_info!(session = &id; "polling started (generation {generation})");
    loop {
        let period = schedule.next_period();
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tokio::time::sleep(period) => {}
        }

        let result = tokio::select! {
            _ = token.cancelled() => break,
            result = backend.fetch_snapshot(&id) => result,
        };
        let finished = match &result {
            Ok(snapshot) => snapshot.status.is_terminal(),
            Err(err) => err.kind == FailureKind::NotFound,
        };
        tracker_debug!(session = &id; "poll tick (generation {generation}) finished={finished}");
        if event_tx
            .send(EngineEvent::Polled { generation, result })
            .is_err()
            || finished
        {
            break;
        }
    }
    tracker_info!(session = &id; "polling stopped (generation {generation})");
}
