//! Tracker engine: HTTP stream and poll channels, session resolution and
//! route persistence.
mod backend;
mod engine;
mod persist;
mod poll;
mod types;
mod wire;

pub use backend::{BackendSettings, ChannelEventSink, EventSink, OperationBackend, ReqwestBackend};
pub use engine::EngineHandle;
pub use persist::{PersistError, SessionStore, STATE_FILENAME};
pub use poll::PollSchedule;
pub use types::{ChannelError, EngineEvent, FailureKind};
