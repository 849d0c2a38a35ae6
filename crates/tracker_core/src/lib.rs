//! Tracker core: pure state machine, reconciler and view-model helpers for
//! long-running search and upload operations.
mod effect;
mod error;
mod msg;
mod poll_policy;
mod reconcile;
mod route;
mod session;
mod state;
mod status;
mod update;
mod view_model;

pub use effect::{AttachId, Effect, PollGeneration, PollOrigin};
pub use error::{StaleUpdate, TrackerError, GENERIC_FAILURE};
pub use msg::{Msg, OperationRequest, OperationSummary, Snapshot, StreamEvent, TerminalReport};
pub use poll_policy::PollPolicy;
pub use reconcile::{reconcile, SessionUpdate};
pub use route::Route;
pub use session::{
    ActiveWriter, Candidate, Channel, OperationSession, Payload, SearchPayload, SessionId,
    UploadPayload,
};
pub use state::{HistoryState, Phase, TrackerState};
pub use status::{OperationKind, ReportedStatus, Status, PROCESSING_LABEL};
pub use update::{update, DETACHED_WITHOUT_ID, LOST_CONTACT};
pub use view_model::{HistoryRowView, ProgressView, TrackerViewModel};
