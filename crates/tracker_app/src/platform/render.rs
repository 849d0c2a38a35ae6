use chrono::Local;
use tracker_core::{ActiveWriter, Phase, ProgressView, TrackerViewModel};

/// Text lines describing the current view, without the log tail.
pub fn describe(view: &TrackerViewModel) -> Vec<String> {
    let mut lines = Vec::new();

    if let Some(header) = header(view) {
        lines.push(header);
    }
    if let Some(message) = view.progress_message.as_deref().filter(|m| !m.is_empty()) {
        lines.push(format!("  {message}"));
    }
    match &view.progress {
        ProgressView::None => {}
        ProgressView::Search {
            result_count,
            top_results,
            query_text,
            cost,
            elapsed_secs,
        } => {
            if let Some(query) = query_text {
                lines.push(format!("  query: {query}"));
            }
            if *result_count > 0 {
                lines.push(format!("  {result_count} results"));
                for name in top_results {
                    lines.push(format!("    - {name}"));
                }
            }
            match (cost, elapsed_secs) {
                (Some(cost), Some(secs)) => lines.push(format!("  cost ${cost:.4} in {secs:.1}s")),
                (Some(cost), None) => lines.push(format!("  cost ${cost:.4}")),
                (None, Some(secs)) => lines.push(format!("  took {secs:.1}s")),
                (None, None) => {}
            }
        }
        ProgressView::Upload {
            total,
            new,
            transformed,
            failed,
            current_step,
        } => {
            let mut counters =
                format!("  total {total} | new {new} | transformed {transformed} | failed {failed}");
            if let Some(step) = current_step {
                counters.push_str(&format!(" | step {step}"));
            }
            lines.push(counters);
        }
    }
    if let Some(failure) = &view.failure {
        lines.push(format!("  Failed: {failure}"));
    }
    if let Some(error) = &view.error {
        lines.push(format!("  Error: {error}"));
    }
    for row in &view.history {
        lines.push(format!(
            "  {:<24} {:<26} {}",
            row.id.as_str(),
            row.status_label,
            row.summary
        ));
    }
    lines
}

fn header(view: &TrackerViewModel) -> Option<String> {
    if view.status_label.is_empty() {
        return None;
    }
    let kind = view.kind.map(|kind| kind.as_str()).unwrap_or("operation");
    let id = view
        .session_id
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_else(|| "(no id yet)".to_string());
    let channel = match (view.phase, view.active_channel) {
        (Phase::Tracking, ActiveWriter::Stream) => " [live]",
        (Phase::Tracking, ActiveWriter::Poll) => " [polling]",
        _ => "",
    };
    Some(format!("{kind} {id}: {}{channel}", view.status_label))
}

/// Prints only what changed since the previous frame, plus new log lines.
#[derive(Debug, Default)]
pub struct Printer {
    last: Vec<String>,
    log_lines_shown: usize,
}

impl Printer {
    pub fn frame(&mut self, view: &TrackerViewModel) -> Vec<String> {
        let mut out = Vec::new();
        let lines = describe(view);
        if lines != self.last {
            let stamp = Local::now().format("%H:%M:%S");
            out.extend(lines.iter().map(|line| format!("[{stamp}] {line}")));
            self.last = lines;
        }

        let log: Vec<&str> = view.log.lines().collect();
        if log.len() < self.log_lines_shown {
            // A snapshot replaced the log with a shorter one; start over.
            self.log_lines_shown = 0;
        }
        out.extend(
            log[self.log_lines_shown..]
                .iter()
                .map(|line| format!("    | {line}")),
        );
        self.log_lines_shown = log.len();
        out
    }
}
