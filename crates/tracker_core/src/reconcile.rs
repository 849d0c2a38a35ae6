//! Merges updates from the stream and poll channels into one session view.

use crate::{
    Channel, OperationSession, Payload, ReportedStatus, SessionId, Snapshot, StaleUpdate, Status,
    TerminalReport,
};

/// An update to apply to a session, independent of the transport it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionUpdate {
    /// Incremental stream progress: advances status, appends to the log.
    Progress {
        step: ReportedStatus,
        message: String,
    },
    /// Early id delivery.
    IdAssigned(SessionId),
    /// Full snapshot from poll or resolve: replaces every progress field.
    Snapshot(Snapshot),
    /// Stream terminal event: replaces every progress field.
    Terminal(TerminalReport),
    /// The channel itself gave out; the session is presented as failed.
    ChannelFailed { message: String },
}

/// Applies `update` from `source` to `current`.
///
/// Returns the next session, or the reason the update was discarded. Never
/// mutates `current`. Accepted updates bump `last_update_seq`.
pub fn reconcile(
    current: &OperationSession,
    update: &SessionUpdate,
    source: Channel,
) -> Result<OperationSession, StaleUpdate> {
    if current.status.is_terminal() {
        return Err(StaleUpdate::Frozen(current.status));
    }
    if !current.writer.accepts(source) {
        return Err(StaleUpdate::InactiveWriter { channel: source });
    }

    let mut next = current.clone();
    match update {
        SessionUpdate::Progress { step, message } => {
            match step {
                ReportedStatus::Known(status) if !status.is_terminal() => {
                    advance(&mut next, *status)?;
                }
                // A terminal step name without the terminal event only updates
                // text; the terminal event carries the payload that goes with it.
                ReportedStatus::Known(_) => {}
                ReportedStatus::Unrecognized(raw) => {
                    next.unrecognized_status = Some(raw.clone());
                }
            }
            next.payload.set_step(step_name(step));
            next.payload.append_log(message);
            next.progress_message = Some(message.clone());
        }
        SessionUpdate::IdAssigned(id) => {
            assign_id(&mut next, id)?;
        }
        SessionUpdate::Snapshot(snapshot) => {
            assign_id(&mut next, &snapshot.id)?;
            if snapshot.kind != next.kind || snapshot.payload.kind() != next.kind {
                return Err(StaleUpdate::KindMismatch);
            }
            match &snapshot.status {
                ReportedStatus::Known(status) => advance(&mut next, *status)?,
                ReportedStatus::Unrecognized(raw) => {
                    next.unrecognized_status = Some(raw.clone());
                }
            }
            next.payload = snapshot.payload.clone();
            if next.status == Status::Failed {
                next.failure = failure_detail(snapshot.error.as_deref(), &next.payload);
            }
        }
        SessionUpdate::Terminal(report) => {
            if report.payload.kind() != next.kind {
                return Err(StaleUpdate::KindMismatch);
            }
            advance(&mut next, report.status)?;
            next.payload = report.payload.clone();
            if next.status == Status::Failed {
                next.failure = failure_detail(report.error.as_deref(), &next.payload);
            }
        }
        SessionUpdate::ChannelFailed { message } => {
            advance(&mut next, Status::Failed)?;
            next.failure = Some(message.clone());
        }
    }

    next.last_update_seq = current.last_update_seq + 1;
    Ok(next)
}

fn step_name(step: &ReportedStatus) -> &str {
    match step {
        ReportedStatus::Unrecognized(raw) => raw.as_str(),
        ReportedStatus::Known(status) => status.as_str(),
    }
}

fn advance(session: &mut OperationSession, incoming: Status) -> Result<(), StaleUpdate> {
    if !session.status.admits(incoming) {
        return Err(StaleUpdate::Regression {
            current: session.status,
            incoming,
        });
    }
    session.status = incoming;
    session.unrecognized_status = None;
    Ok(())
}

fn assign_id(session: &mut OperationSession, incoming: &SessionId) -> Result<(), StaleUpdate> {
    match &session.id {
        Some(current) if current != incoming => Err(StaleUpdate::ForeignSession {
            current: current.clone(),
            incoming: incoming.clone(),
        }),
        Some(_) => Ok(()),
        None => {
            session.id = Some(incoming.clone());
            Ok(())
        }
    }
}

fn failure_detail(error: Option<&str>, payload: &Payload) -> Option<String> {
    error
        .or_else(|| payload.error_detail())
        .map(str::trim)
        .filter(|detail| !detail.is_empty())
        .map(ToOwned::to_owned)
}
