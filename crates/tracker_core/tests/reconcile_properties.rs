use std::sync::Once;

use tracker_core::{
    reconcile, ActiveWriter, Channel, OperationKind, OperationSession, Payload, ReportedStatus,
    SearchPayload, SessionId, SessionUpdate, Snapshot, StaleUpdate, Status, TerminalReport,
};

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(tracker_logging::initialize_for_tests);
}

fn id(raw: &str) -> SessionId {
    SessionId::new(raw).expect("valid id")
}

fn snapshot(status: Status, log: &str) -> Snapshot {
    Snapshot {
        id: id("abc123"),
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

fn progress(status: Status) -> SessionUpdate {
    SessionUpdate::Progress {
        step: ReportedStatus::Known(status),
        message: format!("now {status}"),
    }
}

/// Every non-terminal search status plus the terminal pair, in some order.
const SEARCH_STATUSES: [Status; 6] = [
    Status::Pending,
    Status::Searching,
    Status::Classifying,
    Status::Ranking,
    Status::Completed,
    Status::Failed,
];

#[test]
fn observed_status_never_decreases_across_interleavings() {
    init_logging();
    // Exhaustively walk every sequence of four updates where each update is
    // either a stream progress event or a poll snapshot at any status; the
    // writer is switched between channels mid-sequence to mimic a detach.
    let mut sequences = vec![Vec::new()];
    for _ in 0..4 {
        let mut next = Vec::new();
        for prefix in &sequences {
            for status in SEARCH_STATUSES {
                for channel in [Channel::Stream, Channel::Poll] {
                    let mut seq: Vec<(Status, Channel)> = prefix.clone();
                    seq.push((status, channel));
                    next.push(seq);
                }
            }
        }
        sequences = next;
    }

    for sequence in sequences {
        let mut session = OperationSession::resuming(id("abc123"), OperationKind::Search)
            .with_writer(ActiveWriter::Stream);
        let mut previous_rank = session.status().rank();
        for (index, (status, channel)) in sequence.iter().enumerate() {
            if index == 2 {
                session = session.clone().with_writer(ActiveWriter::Poll);
            }
            let update = match channel {
                Channel::Stream if status.is_terminal() => SessionUpdate::Terminal(TerminalReport {
                    status: *status,
                    payload: Payload::empty(OperationKind::Search),
                    error: None,
                }),
                Channel::Stream => progress(*status),
                _ => SessionUpdate::Snapshot(snapshot(*status, "")),
            };
            if let Ok(next) = reconcile(&session, &update, *channel) {
                session = next;
            }
            assert!(
                session.status().rank() >= previous_rank,
                "regressed in {sequence:?}"
            );
            previous_rank = session.status().rank();
        }
    }
}

#[test]
fn terminal_session_rejects_every_later_update() {
    init_logging();
    let session = OperationSession::pending(OperationKind::Search).with_writer(ActiveWriter::Poll);
    let done = reconcile(
        &session,
        &SessionUpdate::Snapshot(snapshot(Status::Completed, "all done")),
        Channel::Poll,
    )
    .expect("completed snapshot applies");

    let later = [
        (progress(Status::Ranking), Channel::Stream),
        (SessionUpdate::Snapshot(snapshot(Status::Failed, "x")), Channel::Poll),
        (SessionUpdate::Snapshot(snapshot(Status::Completed, "y")), Channel::Poll),
        (
            SessionUpdate::ChannelFailed {
                message: "boom".to_string(),
            },
            Channel::Poll,
        ),
    ];
    for (update, channel) in later {
        assert_eq!(
            reconcile(&done, &update, channel),
            Err(StaleUpdate::Frozen(Status::Completed))
        );
    }
    assert_eq!(done.payload().log(), "all done");
}

#[test]
fn ties_refresh_payload_without_changing_status() {
    let session = OperationSession::resuming(id("abc123"), OperationKind::Search)
        .with_writer(ActiveWriter::Poll);
    let first = reconcile(
        &session,
        &SessionUpdate::Snapshot(snapshot(Status::Ranking, "one")),
        Channel::Poll,
    )
    .unwrap();
    let second = reconcile(
        &first,
        &SessionUpdate::Snapshot(snapshot(Status::Ranking, "one\ntwo")),
        Channel::Poll,
    )
    .unwrap();

    assert_eq!(second.status(), Status::Ranking);
    assert_eq!(second.payload().log(), "one\ntwo");
    assert_eq!(second.last_update_seq(), first.last_update_seq() + 1);
}

#[test]
fn stale_poll_after_newer_stream_event_is_discarded() {
    init_logging();
    let session = OperationSession::resuming(id("abc123"), OperationKind::Search)
        .with_writer(ActiveWriter::Stream);
    let ranked = reconcile(&session, &progress(Status::Ranking), Channel::Stream).unwrap();
    let handed_over = ranked.with_writer(ActiveWriter::Poll);

    let result = reconcile(
        &handed_over,
        &SessionUpdate::Snapshot(snapshot(Status::Classifying, "old")),
        Channel::Poll,
    );
    assert_eq!(
        result,
        Err(StaleUpdate::Regression {
            current: Status::Ranking,
            incoming: Status::Classifying,
        })
    );
}

#[test]
fn inactive_channel_cannot_write() {
    let session = OperationSession::pending(OperationKind::Search).with_writer(ActiveWriter::Stream);
    let result = reconcile(
        &session,
        &SessionUpdate::Snapshot(snapshot(Status::Ranking, "")),
        Channel::Poll,
    );
    assert_eq!(
        result,
        Err(StaleUpdate::InactiveWriter {
            channel: Channel::Poll
        })
    );
}

#[test]
fn resolving_an_early_id_never_regresses() {
    init_logging();
    let session = OperationSession::pending(OperationKind::Search).with_writer(ActiveWriter::Stream);
    let classifying = reconcile(&session, &progress(Status::Classifying), Channel::Stream).unwrap();
    let with_id = reconcile(
        &classifying,
        &SessionUpdate::IdAssigned(id("abc123")),
        Channel::Stream,
    )
    .unwrap();
    let status_at_delivery = with_id.status();

    // The server can only be at or past the point where it revealed the id.
    for server_status in [Status::Classifying, Status::Ranking, Status::Completed] {
        let resolved = reconcile(
            &OperationSession::resuming(id("abc123"), OperationKind::Search),
            &SessionUpdate::Snapshot(snapshot(server_status, "")),
            Channel::Resolve,
        )
        .unwrap();
        assert!(resolved.status().rank() >= status_at_delivery.rank());
    }
}

#[test]
fn id_is_immutable_once_assigned() {
    let session = OperationSession::resuming(id("abc123"), OperationKind::Search)
        .with_writer(ActiveWriter::Stream);
    let result = reconcile(
        &session,
        &SessionUpdate::IdAssigned(id("other")),
        Channel::Stream,
    );
    assert!(matches!(result, Err(StaleUpdate::ForeignSession { .. })));

    let same = reconcile(
        &session,
        &SessionUpdate::IdAssigned(id("abc123")),
        Channel::Stream,
    )
    .unwrap();
    assert_eq!(same.id(), Some(&id("abc123")));
}

#[test]
fn unrecognized_status_keeps_rank_and_shows_processing() {
    let session = OperationSession::resuming(id("abc123"), OperationKind::Search)
        .with_writer(ActiveWriter::Stream);
    let ranked = reconcile(&session, &progress(Status::Ranking), Channel::Stream).unwrap();
    let odd = reconcile(
        &ranked,
        &SessionUpdate::Progress {
            step: ReportedStatus::from_wire("re_embedding"),
            message: "Refreshing embeddings".to_string(),
        },
        Channel::Stream,
    )
    .unwrap();

    assert_eq!(odd.status(), Status::Ranking);
    assert_eq!(odd.unrecognized_status(), Some("re_embedding"));
    assert_eq!(odd.status_label(), tracker_core::PROCESSING_LABEL);
    assert!(odd.failure().is_none());
}

#[test]
fn failed_snapshot_uses_server_detail() {
    let session = OperationSession::resuming(id("job-1"), OperationKind::UploadJob)
        .with_writer(ActiveWriter::Poll);
    let failed = reconcile(
        &session,
        &SessionUpdate::Snapshot(Snapshot {
            id: id("job-1"),
            kind: OperationKind::UploadJob,
            status: ReportedStatus::Known(Status::Failed),
            payload: Payload::Upload(tracker_core::UploadPayload {
                error: Some("row 12: missing email column".to_string()),
                ..Default::default()
            }),
            error: None,
            age: None,
        }),
        Channel::Poll,
    )
    .unwrap();

    assert_eq!(failed.failure(), Some("row 12: missing email column"));
}
