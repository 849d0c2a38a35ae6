use std::sync::Once;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tracker_core::{
    update, ActiveWriter, Candidate, Effect, Msg, OperationKind, OperationRequest, Payload,
    Phase, PollOrigin, PollPolicy, ReportedStatus, Route, SearchPayload, SessionId, Snapshot,
    Status, StreamEvent, TerminalReport, TrackerError, TrackerState, DETACHED_WITHOUT_ID,
    LOST_CONTACT,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(tracker_logging::initialize_for_tests);
}

fn id(raw: &str) -> SessionId {
    SessionId::new(raw).expect("valid id")
}

fn search_request() -> OperationRequest {
    OperationRequest::Search {
        query: "senior rust engineers in Berlin".to_string(),
        owner: Some("owner-1".to_string()),
    }
}

fn search_snapshot(raw_id: &str, status: Status, log: &str) -> Snapshot {
    Snapshot {
        id: id(raw_id),
        kind: OperationKind::Search,
        status: ReportedStatus::Known(status),
        payload: Payload::Search(SearchPayload {
            log: log.to_string(),
            ..SearchPayload::default()
        }),
        error: None,
        age: None,
    }
}

fn completed_payload() -> Payload {
    Payload::Search(SearchPayload {
        results: vec![Candidate {
            id: "c-1".to_string(),
            name: "Ada".to_string(),
            headline: Some("Systems engineer".to_string()),
            score: Some(0.93),
        }],
        query_text: Some("SELECT * FROM candidates WHERE city = 'Berlin'".to_string()),
        ..SearchPayload::default()
    })
}

fn submit(state: TrackerState) -> (TrackerState, u64) {
    let (state, effects) = update(state, Msg::Submit(search_request()));
    let attach = effects
        .iter()
        .find_map(|effect| match effect {
            Effect::OpenStream { attach, .. } => Some(*attach),
            _ => None,
        })
        .expect("open stream effect");
    (state, attach)
}

fn stream(state: TrackerState, attach: u64, event: StreamEvent) -> (TrackerState, Vec<Effect>) {
    update(state, Msg::Stream { attach, event })
}

fn poll_generation(effects: &[Effect]) -> u64 {
    effects
        .iter()
        .find_map(|effect| match effect {
            Effect::StartPolling { generation, .. } => Some(*generation),
            _ => None,
        })
        .expect("start polling effect")
}

#[test]
fn streamed_search_completes_without_polling() {
    init_logging();
    let (state, attach) = submit(TrackerState::new());
    assert_eq!(state.phase(), Phase::Tracking);

    let (state, effects) = stream(state, attach, StreamEvent::IdAssigned(id("abc123")));
    assert_eq!(
        effects,
        vec![Effect::ReplaceRoute(Route::new(
            Some(OperationKind::Search),
            id("abc123")
        ))]
    );

    let (state, effects) = stream(
        state,
        attach,
        StreamEvent::Progress {
            step: ReportedStatus::from_wire("classifying"),
            message: "Analyzing candidates...".to_string(),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.view().status, Some(Status::Classifying));

    let (state, effects) = stream(
        state,
        attach,
        StreamEvent::Terminal(TerminalReport {
            status: Status::Completed,
            payload: completed_payload(),
            error: None,
        }),
    );

    assert!(effects.is_empty(), "no polling after a streamed completion");
    assert!(!state.is_polling());
    let view = state.view();
    assert_eq!(view.phase, Phase::Finished);
    assert_eq!(view.status, Some(Status::Completed));
    assert_eq!(view.active_channel, ActiveWriter::None);
    assert!(!view.loading);
    match view.progress {
        tracker_core::ProgressView::Search {
            result_count,
            query_text,
            ..
        } => {
            assert_eq!(result_count, 1);
            assert!(query_text.unwrap().starts_with("SELECT"));
        }
        other => panic!("unexpected progress view {other:?}"),
    }
}

#[test]
fn resumed_session_polls_until_completed_then_stops() {
    init_logging();
    let route = Route::parse("/search/abc123").unwrap();
    let (state, effects) = update(TrackerState::new(), Msg::Resume(route));
    assert_eq!(effects, vec![Effect::FetchSnapshot { id: id("abc123") }]);
    assert_eq!(state.phase(), Phase::Resolving);

    let (state, effects) = update(
        state,
        Msg::Resolved {
            id: id("abc123"),
            result: Ok(search_snapshot("abc123", Status::Ranking, "")),
        },
    );
    assert_eq!(
        effects,
        vec![
            Effect::ReplaceRoute(Route::new(Some(OperationKind::Search), id("abc123"))),
            Effect::StartPolling {
                generation: 1,
                id: id("abc123"),
                origin: PollOrigin::Resumed { age: None },
            },
        ]
    );
    let generation = poll_generation(&effects);

    let (state, effects) = update(
        state,
        Msg::Polled {
            generation,
            result: Ok(search_snapshot("abc123", Status::Ranking, "ranking")),
        },
    );
    assert!(effects.is_empty());
    assert!(state.is_polling());

    let (state, effects) = update(
        state,
        Msg::Polled {
            generation,
            result: Ok(search_snapshot("abc123", Status::Completed, "done")),
        },
    );
    assert_eq!(effects, vec![Effect::StopPolling { generation }]);
    assert!(!state.is_polling());
    assert_eq!(state.phase(), Phase::Finished);

    // A late tick from the stopped poller changes nothing.
    let before = state.view();
    let (state, effects) = update(
        state,
        Msg::Polled {
            generation,
            result: Ok(search_snapshot("abc123", Status::Ranking, "late")),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.view().status, before.status);
    assert_eq!(state.view().log, "done");
}

#[test]
fn resolving_a_missing_session_surfaces_not_found() {
    init_logging();
    let (state, _) = update(
        TrackerState::new(),
        Msg::Resume(Route::parse("xyz").unwrap()),
    );
    let (state, effects) = update(
        state,
        Msg::Resolved {
            id: id("xyz"),
            result: Err(TrackerError::NotFound(id("xyz"))),
        },
    );

    assert!(effects.is_empty(), "no channel and no retry");
    assert!(!state.is_polling());
    assert!(state.session().is_none());
    assert_eq!(state.error(), Some(&TrackerError::NotFound(id("xyz"))));
    assert_eq!(state.phase(), Phase::Finished);
    assert!(state.is_settled());
}

#[test]
fn resolving_a_terminal_session_attaches_nothing() {
    init_logging();
    let (state, _) = update(
        TrackerState::new(),
        Msg::Resume(Route::parse("/search/abc123").unwrap()),
    );
    let (state, effects) = update(
        state,
        Msg::Resolved {
            id: id("abc123"),
            result: Ok(search_snapshot("abc123", Status::Completed, "done")),
        },
    );
    // Only the route is recorded; no channel is attached.
    assert_eq!(
        effects,
        vec![Effect::ReplaceRoute(Route::new(
            Some(OperationKind::Search),
            id("abc123")
        ))]
    );
    assert_eq!(state.phase(), Phase::Finished);
    assert_eq!(state.view().active_channel, ActiveWriter::None);
}

#[test]
fn stream_transport_failure_fails_without_polling() {
    init_logging();
    let (state, attach) = submit(TrackerState::new());
    let (state, _) = stream(state, attach, StreamEvent::IdAssigned(id("abc123")));
    let (state, effects) = update(
        state,
        Msg::StreamFailed {
            attach,
            message: "connection reset by peer".to_string(),
        },
    );

    assert!(effects.is_empty());
    assert!(!state.is_polling());
    let view = state.view();
    assert_eq!(view.status, Some(Status::Failed));
    assert_eq!(view.failure.as_deref(), Some("connection reset by peer"));
    assert_eq!(view.phase, Phase::Finished);
}

#[test]
fn detaching_the_stream_hands_over_to_polling_without_duplicating_progress() {
    init_logging();
    let (state, attach) = submit(TrackerState::new());
    let (state, _) = stream(state, attach, StreamEvent::IdAssigned(id("abc123")));
    let (state, _) = stream(
        state,
        attach,
        StreamEvent::Progress {
            step: ReportedStatus::from_wire("searching"),
            message: "Searching candidates".to_string(),
        },
    );
    assert_eq!(state.view().log, "Searching candidates");

    let (state, effects) = update(state, Msg::DetachStream);
    assert_eq!(
        effects,
        vec![
            Effect::AbandonStream { attach },
            Effect::StartPolling {
                generation: 1,
                id: id("abc123"),
                origin: PollOrigin::Submitted,
            },
        ]
    );

    // The abandoned stream resolves late; nothing happens.
    let (state, effects) = stream(
        state,
        attach,
        StreamEvent::Progress {
            step: ReportedStatus::from_wire("classifying"),
            message: "late".to_string(),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state.view().status, Some(Status::Searching));

    // The server log already holds the streamed line; polling replaces rather
    // than appends, so it appears exactly once.
    let (state, _) = update(
        state,
        Msg::Polled {
            generation: 1,
            result: Ok(search_snapshot(
                "abc123",
                Status::Classifying,
                "Searching candidates\nAnalyzing candidates",
            )),
        },
    );
    let (state, effects) = update(
        state,
        Msg::Polled {
            generation: 1,
            result: Ok(search_snapshot(
                "abc123",
                Status::Completed,
                "Searching candidates\nAnalyzing candidates\nDone",
            )),
        },
    );

    assert_eq!(effects, vec![Effect::StopPolling { generation: 1 }]);
    let view = state.view();
    assert_eq!(view.status, Some(Status::Completed));
    assert_eq!(view.log.matches("Searching candidates").count(), 1);
}

#[test]
fn detaching_before_an_id_fails_instead_of_hanging() {
    init_logging();
    let (state, attach) = submit(TrackerState::new());
    let (state, effects) = update(state, Msg::DetachStream);

    assert_eq!(effects, vec![Effect::AbandonStream { attach }]);
    assert_eq!(state.view().failure.as_deref(), Some(DETACHED_WITHOUT_ID));
    assert_eq!(state.phase(), Phase::Finished);
}

#[test]
fn idle_stream_with_known_id_hands_over_to_polling() {
    init_logging();
    let (state, attach) = submit(TrackerState::new());
    let (state, _) = stream(state, attach, StreamEvent::IdAssigned(id("abc123")));
    let (state, _) = stream(
        state,
        attach,
        StreamEvent::Progress {
            step: ReportedStatus::from_wire("searching"),
            message: "Querying index".to_string(),
        },
    );

    let (state, effects) = update(state, Msg::StreamIdle { attach });
    assert_eq!(
        effects,
        vec![
            Effect::AbandonStream { attach },
            Effect::StartPolling {
                generation: 1,
                id: id("abc123"),
                origin: PollOrigin::Submitted,
            },
        ]
    );
    let view = state.view();
    assert_eq!(view.failure, None);
    assert_eq!(view.active_channel, ActiveWriter::Poll);
    assert!(view.loading);

    let generation = poll_generation(&effects);
    let (state, effects) = update(
        state,
        Msg::Polled {
            generation,
            result: Ok(search_snapshot("abc123", Status::Completed, "done")),
        },
    );
    assert_eq!(effects, vec![Effect::StopPolling { generation }]);
    assert_eq!(state.phase(), Phase::Finished);
    assert_eq!(state.view().status, Some(Status::Completed));
    assert_eq!(state.view().failure, None);
}

#[test]
fn idle_stream_before_an_id_fails_with_detach_detail() {
    init_logging();
    let (state, attach) = submit(TrackerState::new());
    let (state, effects) = update(state, Msg::StreamIdle { attach });

    assert_eq!(effects, vec![Effect::AbandonStream { attach }]);
    assert_eq!(state.view().failure.as_deref(), Some(DETACHED_WITHOUT_ID));
}

#[test]
fn idle_notice_from_an_old_attachment_is_ignored() {
    init_logging();
    let (state, first) = submit(TrackerState::new());
    let (state, second) = submit(state);
    let (state, _) = stream(state, second, StreamEvent::IdAssigned(id("abc123")));

    let (state, effects) = update(state, Msg::StreamIdle { attach: first });
    assert!(effects.is_empty());
    assert_eq!(state.view().active_channel, ActiveWriter::Stream);
}

#[test]
fn resolved_route_takes_the_server_kind() {
    init_logging();
    let (state, _) = update(
        TrackerState::new(),
        Msg::Resume(Route::parse("/search/job-7").unwrap()),
    );
    let snapshot = Snapshot {
        id: id("job-7"),
        kind: OperationKind::UploadJob,
        status: ReportedStatus::Known(Status::Transforming),
        payload: Payload::empty(OperationKind::UploadJob),
        error: None,
        age: None,
    };
    let (state, effects) = update(
        state,
        Msg::Resolved {
            id: id("job-7"),
            result: Ok(snapshot),
        },
    );

    let expected = Route::new(Some(OperationKind::UploadJob), id("job-7"));
    assert_eq!(state.route(), Some(&expected));
    assert_eq!(effects.first(), Some(&Effect::ReplaceRoute(expected)));
}

#[test]
fn repeated_poll_transport_errors_end_in_failure() {
    init_logging();
    let policy = PollPolicy {
        max_consecutive_failures: 2,
        ..PollPolicy::default()
    };
    let (state, _) = update(
        TrackerState::with_policy(policy),
        Msg::Resume(Route::parse("/search/abc123").unwrap()),
    );
    let (state, effects) = update(
        state,
        Msg::Resolved {
            id: id("abc123"),
            result: Ok(search_snapshot("abc123", Status::Searching, "")),
        },
    );
    let generation = poll_generation(&effects);

    let transport = || TrackerError::Transport("connection refused".to_string());
    let (state, effects) = update(
        state,
        Msg::Polled {
            generation,
            result: Err(transport()),
        },
    );
    assert!(effects.is_empty(), "a single transport error keeps polling");
    assert!(state.is_polling());

    let (state, effects) = update(
        state,
        Msg::Polled {
            generation,
            result: Err(transport()),
        },
    );
    assert_eq!(effects, vec![Effect::StopPolling { generation }]);
    assert_eq!(state.view().failure.as_deref(), Some(LOST_CONTACT));
}

#[test]
fn transport_error_counter_resets_after_a_good_poll() {
    init_logging();
    let policy = PollPolicy {
        max_consecutive_failures: 2,
        ..PollPolicy::default()
    };
    let (state, _) = update(
        TrackerState::with_policy(policy),
        Msg::Resume(Route::parse("/search/abc123").unwrap()),
    );
    let (mut state, effects) = update(
        state,
        Msg::Resolved {
            id: id("abc123"),
            result: Ok(search_snapshot("abc123", Status::Searching, "")),
        },
    );
    let generation = poll_generation(&effects);

    for result in [
        Err(TrackerError::Transport("timeout".to_string())),
        Ok(search_snapshot("abc123", Status::Classifying, "")),
        Err(TrackerError::Transport("timeout".to_string())),
    ] {
        let (next, _) = update(state, Msg::Polled { generation, result });
        state = next;
    }
    assert!(state.is_polling());
    assert_eq!(state.view().status, Some(Status::Classifying));
}

#[test]
fn teardown_stops_channels_and_ignores_late_results() {
    init_logging();
    let (state, attach) = submit(TrackerState::new());
    let (state, _) = stream(state, attach, StreamEvent::IdAssigned(id("abc123")));
    let (state, effects) = update(state, Msg::DetachStream);
    let generation = poll_generation(&effects);

    let (state, effects) = update(state, Msg::Teardown);
    assert_eq!(effects, vec![Effect::StopPolling { generation }]);
    assert_eq!(state.phase(), Phase::TornDown);

    let before = state.clone();
    let (state, effects) = update(
        state,
        Msg::Polled {
            generation,
            result: Ok(search_snapshot("abc123", Status::Completed, "")),
        },
    );
    assert!(effects.is_empty());
    assert_eq!(state, before);
}

#[test]
fn teardown_while_streaming_abandons_the_stream() {
    init_logging();
    let (state, attach) = submit(TrackerState::new());
    let (state, effects) = update(state, Msg::Teardown);
    assert_eq!(effects, vec![Effect::AbandonStream { attach }]);

    let (state, effects) = update(
        state,
        Msg::StreamFailed {
            attach,
            message: "aborted".to_string(),
        },
    );
    assert!(effects.is_empty());
    assert_ne!(state.view().status, Some(Status::Failed));
}

#[test]
fn resubmitting_ignores_events_from_the_previous_stream() {
    init_logging();
    let (state, first) = submit(TrackerState::new());
    let (state, effects) = update(state, Msg::Submit(search_request()));
    assert!(effects.contains(&Effect::AbandonStream { attach: first }));

    let (state, _) = stream(state, first, StreamEvent::IdAssigned(id("old")));
    assert_eq!(state.view().session_id, None);
}

#[test]
fn resumed_age_is_forwarded_to_the_poller() {
    let (state, _) = update(
        TrackerState::new(),
        Msg::Resume(Route::parse("/search/abc123").unwrap()),
    );
    let mut snapshot = search_snapshot("abc123", Status::Searching, "");
    snapshot.age = Some(Duration::from_secs(5));
    let (_, effects) = update(
        state,
        Msg::Resolved {
            id: id("abc123"),
            result: Ok(snapshot),
        },
    );
    assert!(matches!(
        effects.as_slice(),
        [Effect::ReplaceRoute(_), Effect::StartPolling {
            origin: PollOrigin::Resumed { age: Some(age) },
            ..
        }] if *age == Duration::from_secs(5)
    ));
}

#[test]
fn history_is_loaded_read_only() {
    let (state, effects) = update(
        TrackerState::new(),
        Msg::HistoryRequested {
            owner: "owner-1".to_string(),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::ListOperations {
            owner: "owner-1".to_string()
        }]
    );
    assert!(!state.is_settled());

    let (state, effects) = update(
        state,
        Msg::HistoryLoaded {
            owner: "owner-1".to_string(),
            result: Ok(vec![tracker_core::OperationSummary {
                id: id("abc123"),
                kind: Some(OperationKind::Search),
                status: ReportedStatus::from_wire("ranking"),
                summary: "rust engineers".to_string(),
            }]),
        },
    );
    assert!(effects.is_empty());
    assert!(state.is_settled());
    let view = state.view();
    assert_eq!(view.history.len(), 1);
    assert_eq!(view.history[0].status_label, "Ranking matches...");
}
