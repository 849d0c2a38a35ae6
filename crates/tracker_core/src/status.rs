use std::fmt;

use serde::{Deserialize, Serialize};

/// Label shown for status strings the client does not recognise.
pub const PROCESSING_LABEL: &str = "Processing...";

/// Which kind of long-running work a session tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Search,
    #[serde(alias = "upload", alias = "upload-job")]
    UploadJob,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Search => "search",
            OperationKind::UploadJob => "upload_job",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed status vocabulary shared by searches and upload jobs.
///
/// Statuses are ordered by [`Status::rank`]; the search path runs
/// `Searching -> Classifying -> Ranking`, the upload path runs
/// `Scraping -> Transforming`. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Searching,
    Scraping,
    Classifying,
    Transforming,
    Ranking,
    Completed,
    Failed,
}

impl Status {
    pub const ALL: [Status; 8] = [
        Status::Pending,
        Status::Searching,
        Status::Scraping,
        Status::Classifying,
        Status::Transforming,
        Status::Ranking,
        Status::Completed,
        Status::Failed,
    ];

    /// Position in the forward-only progression. Statuses sharing a rank are
    /// interchangeable for ordering purposes.
    pub fn rank(self) -> u8 {
        match self {
            Status::Pending => 0,
            Status::Searching | Status::Scraping => 1,
            Status::Classifying | Status::Transforming => 2,
            Status::Ranking => 3,
            Status::Completed | Status::Failed => 4,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }

    /// Whether a session currently in `self` may move to `next`.
    pub fn admits(self, next: Status) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }

    /// Parses a wire status string. Returns `None` for anything outside the
    /// vocabulary.
    pub fn parse(raw: &str) -> Option<Status> {
        let normalized = raw.trim().to_ascii_lowercase();
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Searching => "searching",
            Status::Scraping => "scraping",
            Status::Classifying => "classifying",
            Status::Transforming => "transforming",
            Status::Ranking => "ranking",
            Status::Completed => "completed",
            Status::Failed => "failed",
        }
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Status::Pending => "Queued",
            Status::Searching => "Searching candidates...",
            Status::Scraping => "Scraping profiles...",
            Status::Classifying => "Analyzing candidates...",
            Status::Transforming => "Transforming records...",
            Status::Ranking => "Ranking matches...",
            Status::Completed => "Completed",
            Status::Failed => "Failed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status as reported by a channel, before it is known to be in the
/// vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportedStatus {
    Known(Status),
    Unrecognized(String),
}

impl ReportedStatus {
    pub fn from_wire(raw: &str) -> Self {
        match Status::parse(raw) {
            Some(status) => ReportedStatus::Known(status),
            None => ReportedStatus::Unrecognized(raw.trim().to_string()),
        }
    }

    pub fn known(&self) -> Option<Status> {
        match self {
            ReportedStatus::Known(status) => Some(*status),
            ReportedStatus::Unrecognized(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.known().is_some_and(Status::is_terminal)
    }

    /// Presentation label; unrecognised strings fall back to
    /// [`PROCESSING_LABEL`].
    pub fn label(&self) -> &'static str {
        match self {
            ReportedStatus::Known(status) => status.label(),
            ReportedStatus::Unrecognized(_) => PROCESSING_LABEL,
        }
    }
}

impl From<Status> for ReportedStatus {
    fn from(status: Status) -> Self {
        ReportedStatus::Known(status)
    }
}
