use std::collections::HashMap;
use std::time::Duration;

use tracker_core::{Effect, Msg, PollGeneration, SessionId, TrackerError};
use tracker_engine::{EngineEvent, EngineHandle, SessionStore};
use tracker_logging::{tracker_info, tracker_warn};

/// Executes core effects against the engine and turns engine events back into
/// messages.
pub struct EffectRunner {
    engine: EngineHandle,
    store: SessionStore,
    poll_ids: HashMap<PollGeneration, SessionId>,
}

impl EffectRunner {
    pub fn new(engine: EngineHandle, store: SessionStore) -> Self {
        Self {
            engine,
            store,
            poll_ids: HashMap::new(),
        }
    }

    pub fn run(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::OpenStream { attach, request } => {
                    self.engine.open_stream(attach, request);
                }
                Effect::AbandonStream { attach } => {
                    self.engine.abandon_stream(attach);
                }
                Effect::StartPolling {
                    generation,
                    id,
                    origin,
                } => {
                    self.poll_ids.insert(generation, id.clone());
                    self.engine.start_polling(generation, id, origin);
                }
                Effect::StopPolling { generation } => {
                    self.engine.stop_polling(generation);
                }
                Effect::FetchSnapshot { id } => {
                    self.engine.fetch_snapshot(id);
                }
                Effect::ReplaceRoute(route) => match self.store.save(&route) {
                    Ok(path) => {
                        tracker_info!(session = route.id(); "route {route} saved to {}", path.display())
                    }
                    Err(err) => tracker_warn!(session = route.id(); "could not save route: {err}"),
                },
                Effect::ListOperations { owner } => {
                    self.engine.list_operations(owner);
                }
            }
        }
    }

    /// Waits up to `timeout` for the next engine event.
    pub fn next_msg(&self, timeout: Duration) -> Option<Msg> {
        let event = self.engine.recv_timeout(timeout)?;
        Some(self.translate(event))
    }

    fn translate(&self, event: EngineEvent) -> Msg {
        match event {
            EngineEvent::Stream { attach, event } => Msg::Stream { attach, event },
            EngineEvent::StreamFailed { attach, error } => Msg::StreamFailed {
                attach,
                message: error.to_string(),
            },
            EngineEvent::StreamIdle { attach } => Msg::StreamIdle { attach },
            EngineEvent::Resolved { id, result } => {
                let result = result.map_err(|err| err.into_tracker_error(&id));
                Msg::Resolved { id, result }
            }
            EngineEvent::Polled { generation, result } => {
                let result = result.map_err(|err| match self.poll_ids.get(&generation) {
                    Some(id) => err.into_tracker_error(id),
                    None => TrackerError::from(err),
                });
                Msg::Polled { generation, result }
            }
            EngineEvent::History { owner, result } => Msg::HistoryLoaded {
                owner,
                result: result.map_err(TrackerError::from),
            },
        }
    }
}
