use crate::{ActiveWriter, OperationKind, OperationSummary, Phase, Route, SessionId, Status};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrackerViewModel {
    pub phase: Phase,
    pub route: Option<Route>,
    pub session_id: Option<SessionId>,
    pub kind: Option<OperationKind>,
    pub status: Option<Status>,
    pub status_label: &'static str,
    pub progress_message: Option<String>,
    pub progress: ProgressView,
    pub log: String,
    /// User-facing failure text when the operation failed.
    pub failure: Option<String>,
    /// Resume or history error.
    pub error: Option<String>,
    pub active_channel: ActiveWriter,
    pub loading: bool,
    pub history: Vec<HistoryRowView>,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ProgressView {
    #[default]
    None,
    Search {
        result_count: usize,
        top_results: Vec<String>,
        query_text: Option<String>,
        cost: Option<f64>,
        elapsed_secs: Option<f64>,
    },
    Upload {
        total: u64,
        new: u64,
        transformed: u64,
        failed: u64,
        current_step: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRowView {
    pub id: SessionId,
    pub status_label: &'static str,
    pub summary: String,
}

impl From<&OperationSummary> for HistoryRowView {
    fn from(summary: &OperationSummary) -> Self {
        Self {
            id: summary.id.clone(),
            status_label: summary.status.label(),
            summary: summary.summary.clone(),
        }
    }
}
