use tracker_logging::{tracker_debug, tracker_info, tracker_warn};

use crate::state::HistoryState;
use crate::{
    AttachId, Channel, Effect, Msg, OperationRequest, OperationSession, Phase, PollOrigin, Route,
    SessionId, SessionUpdate, Snapshot, StreamEvent, TrackerError, TrackerState,
};

/// Failure detail used when polling gives up after repeated transport errors.
pub const LOST_CONTACT: &str = "Lost contact with the operation. Reload to check on it again.";

/// Failure detail used when the stream is let go before the server assigned an
/// id, so there is nothing to poll.
pub const DETACHED_WITHOUT_ID: &str =
    "The operation was detached before the server assigned it an id.";

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: TrackerState, msg: Msg) -> (TrackerState, Vec<Effect>) {
    if state.phase() == Phase::TornDown {
        if !matches!(msg, Msg::Tick) {
            tracker_debug!("ignoring message after teardown: {msg:?}");
        }
        return (state, Vec::new());
    }

    let effects = match msg {
        Msg::Submit(request) => submit(&mut state, request),
        Msg::Resume(route) => {
            let mut effects = state.release_channels();
            let id = state.begin_resolve(route);
            tracker_info!(session = id; "resolving");
            effects.push(Effect::FetchSnapshot { id });
            effects
        }
        Msg::Resolved { id, result } => resolved(&mut state, id, result),
        Msg::Stream { attach, event } => {
            if state.is_current_attach(attach) {
                stream_event(&mut state, event)
            } else {
                tracker_debug!("ignoring event from stale stream attachment {attach}");
                Vec::new()
            }
        }
        Msg::StreamFailed { attach, message } => {
            if state.is_current_attach(attach) {
                tracker_warn!("stream {attach} failed: {message}");
                state.apply(&SessionUpdate::ChannelFailed { message }, Channel::Stream);
                state.detach_stream_writer();
            } else {
                tracker_debug!("ignoring failure of stale stream attachment {attach}");
            }
            Vec::new()
        }
        Msg::DetachStream => {
            let attach = state.current_attach();
            detach_stream(&mut state, attach)
        }
        Msg::StreamIdle { attach } => {
            tracker_info!("stream {attach} went idle, handing over to polling");
            detach_stream(&mut state, attach)
        }
        Msg::Polled { generation, result } => {
            if state.is_current_poll(generation) {
                polled(&mut state, result)
            } else {
                tracker_debug!("ignoring result from stale poll generation {generation}");
                Vec::new()
            }
        }
        Msg::HistoryRequested { owner } => {
            state.request_history(owner.clone());
            vec![Effect::ListOperations { owner }]
        }
        Msg::HistoryLoaded { owner, result } => {
            if state.take_history_request(&owner) {
                match result {
                    Ok(entries) => state.set_history(HistoryState { owner, entries }),
                    Err(err) => state.set_error(err),
                }
            }
            Vec::new()
        }
        Msg::Teardown => {
            let effects = state.release_channels();
            state.tear_down();
            tracker_info!("view torn down, released {} channel(s)", effects.len());
            effects
        }
        Msg::Tick => Vec::new(),
    };

    (state, effects)
}

fn submit(state: &mut TrackerState, request: OperationRequest) -> Vec<Effect> {
    let mut effects = state.release_channels();
    let attach = state.attach_stream(request.kind());
    tracker_info!("submitting {} operation on attachment {attach}", request.kind());
    effects.push(Effect::OpenStream { attach, request });
    effects
}

fn resolved(
    state: &mut TrackerState,
    id: SessionId,
    result: Result<Snapshot, TrackerError>,
) -> Vec<Effect> {
    if !state.is_resolving(&id) {
        tracker_debug!(session = id; "ignoring resolve result for a route no longer shown");
        return Vec::new();
    }
    state.finish_resolve();

    let snapshot = match result {
        Ok(snapshot) => snapshot,
        Err(err) => {
            tracker_warn!(session = id; "resolve failed: {err}");
            state.fail(err);
            return Vec::new();
        }
    };

    let age = snapshot.age;
    let placeholder = OperationSession::resuming(id.clone(), snapshot.kind);
    match crate::reconcile(&placeholder, &SessionUpdate::Snapshot(snapshot), Channel::Resolve) {
        Ok(session) => {
            let terminal = session.is_terminal();
            state.install_resolved(session);
            let mut effects: Vec<Effect> =
                state.route().cloned().map(Effect::ReplaceRoute).into_iter().collect();
            if terminal {
                tracker_info!(session = id; "resolved as terminal, no channel attached");
            } else {
                effects.extend(state.start_polling(PollOrigin::Resumed { age }));
            }
            effects
        }
        Err(stale) => {
            tracker_warn!(session = id; "resolved snapshot rejected: {stale}");
            state.fail(TrackerError::from(stale));
            Vec::new()
        }
    }
}

fn stream_event(state: &mut TrackerState, event: StreamEvent) -> Vec<Effect> {
    match event {
        StreamEvent::Progress { step, message } => {
            state.apply(&SessionUpdate::Progress { step, message }, Channel::Stream);
            Vec::new()
        }
        StreamEvent::IdAssigned(id) => {
            let applied = state.apply(&SessionUpdate::IdAssigned(id.clone()), Channel::Stream);
            match state.session_kind() {
                Some(kind) if applied => {
                    tracker_info!(session = id; "early id delivered");
                    let route = Route::new(Some(kind), id);
                    state.set_route(route.clone());
                    vec![Effect::ReplaceRoute(route)]
                }
                _ => Vec::new(),
            }
        }
        StreamEvent::Terminal(report) => {
            state.apply(&SessionUpdate::Terminal(report), Channel::Stream);
            // The connection ends after its terminal event whether or not the
            // report was accepted.
            fall_back_to_polling(state)
        }
    }
}

fn detach_stream(state: &mut TrackerState, attach: AttachId) -> Vec<Effect> {
    if !state.is_current_attach(attach) {
        tracker_debug!("ignoring detach of stale stream attachment {attach}");
        return Vec::new();
    }
    let mut effects = vec![Effect::AbandonStream { attach }];
    effects.extend(fall_back_to_polling(state));
    effects
}

/// Releases the stream writer; polling takes over if the session is still
/// running.
fn fall_back_to_polling(state: &mut TrackerState) -> Vec<Effect> {
    let still_running = state
        .session()
        .is_some_and(|session| !session.is_terminal());
    if !still_running {
        state.detach_stream_writer();
        return Vec::new();
    }
    let has_id = state.session().and_then(OperationSession::id).is_some();
    if has_id {
        state.start_polling(PollOrigin::Submitted).into_iter().collect()
    } else {
        state.apply(
            &SessionUpdate::ChannelFailed {
                message: DETACHED_WITHOUT_ID.to_string(),
            },
            Channel::Stream,
        );
        state.detach_stream_writer();
        Vec::new()
    }
}

fn polled(state: &mut TrackerState, result: Result<Snapshot, TrackerError>) -> Vec<Effect> {
    match result {
        Ok(snapshot) => {
            state.reset_poll_failures();
            state.apply(&SessionUpdate::Snapshot(snapshot), Channel::Poll);
        }
        Err(err @ (TrackerError::NotFound(_) | TrackerError::OperationFailed(_))) => {
            tracker_warn!("poll reported {err}");
            state.apply(
                &SessionUpdate::ChannelFailed {
                    message: err.user_message(),
                },
                Channel::Poll,
            );
        }
        Err(err) => {
            let failures = state.record_poll_failure();
            let limit = state.policy().max_consecutive_failures;
            tracker_warn!("poll failed ({failures}/{limit}): {err}");
            if failures >= limit {
                state.apply(
                    &SessionUpdate::ChannelFailed {
                        message: LOST_CONTACT.to_string(),
                    },
                    Channel::Poll,
                );
            }
        }
    }

    if state.session().is_some_and(OperationSession::is_terminal) {
        vec![state.stop_polling()]
    } else {
        Vec::new()
    }
}

