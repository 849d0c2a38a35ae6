#![deny(missing_docs)]
//! Shared logging utilities for the tracker workspace.
//!
//! This crate provides the `tracker_*` logging macros used across the codebase
//! and a minimal test initializer for the global logger.
//!
//! Every macro accepts an optional `session = <id>;` prefix. When present the
//! line is tagged with `[session <id>]` so that interleaved output from the
//! stream and poll channels can be attributed to one operation:
//!
//! ```
//! use tracker_logging::tracker_info;
//!
//! tracker_info!(session = "abc123"; "polling every {}s", 15);
//! tracker_info!("engine started");
//! ```

#[doc(hidden)]
pub use log as __log;

/// Formats the session tag used by the `session = ...;` macro form.
pub fn session_tag(id: impl std::fmt::Display) -> String {
    format!("[session {id}]")
}

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! tracker_trace {
    (session = $id:expr; $($arg:tt)*) => {{
        $crate::__log::trace!("{} {}", $crate::session_tag(&$id), format_args!($($arg)*));
    }};
    ($($arg:tt)*) => {{
        $crate::__log::trace!($($arg)*);
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! tracker_debug {
    (session = $id:expr; $($arg:tt)*) => {{
        $crate::__log::debug!("{} {}", $crate::session_tag(&$id), format_args!($($arg)*));
    }};
    ($($arg:tt)*) => {{
        $crate::__log::debug!($($arg)*);
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! tracker_info {
    (session = $id:expr; $($arg:tt)*) => {{
        $crate::__log::info!("{} {}", $crate::session_tag(&$id), format_args!($($arg)*));
    }};
    ($($arg:tt)*) => {{
        $crate::__log::info!($($arg)*);
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! tracker_warn {
    (session = $id:expr; $($arg:tt)*) => {{
        $crate::__log::warn!("{} {}", $crate::session_tag(&$id), format_args!($($arg)*));
    }};
    ($($arg:tt)*) => {{
        $crate::__log::warn!($($arg)*);
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! tracker_error {
    (session = $id:expr; $($arg:tt)*) => {{
        $crate::__log::error!("{} {}", $crate::session_tag(&$id), format_args!($($arg)*));
    }};
    ($($arg:tt)*) => {{
        $crate::__log::error!($($arg)*);
    }};
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
