//! Application configuration: an optional `tracker.ron` file plus
//! environment overrides.

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracker_core::PollPolicy;
use tracker_engine::BackendSettings;
use tracker_logging::tracker_info;

pub const ENV_BASE_URL: &str = "TRACKER_BASE_URL";
pub const ENV_TOKEN: &str = "TRACKER_TOKEN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    pub bearer_token: Option<String>,
    /// Default owner for searches and listings.
    pub owner: Option<String>,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub stream_idle_timeout_secs: u64,
    pub poll: PollConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    pub fast_period_ms: u64,
    pub slow_period_ms: u64,
    pub fast_window_secs: u64,
    pub max_consecutive_failures: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        let backend = BackendSettings::default();
        Self {
            base_url: backend.base_url,
            bearer_token: None,
            owner: None,
            connect_timeout_secs: backend.connect_timeout.as_secs(),
            request_timeout_secs: backend.request_timeout.as_secs(),
            stream_idle_timeout_secs: backend.stream_idle_timeout.as_secs(),
            poll: PollConfig::default(),
        }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        let policy = PollPolicy::default();
        Self {
            fast_period_ms: duration_ms(policy.fast_period),
            slow_period_ms: duration_ms(policy.slow_period),
            fast_window_secs: policy.fast_window.as_secs(),
            max_consecutive_failures: policy.max_consecutive_failures,
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl AppConfig {
    /// Reads `path` if it exists; a missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err).with_context(|| format!("reading {}", path.display()));
            }
        };
        let config = ron::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;
        tracker_info!("loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(base_url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.base_url = base_url;
        }
        if let Some(token) = lookup(ENV_TOKEN).filter(|v| !v.trim().is_empty()) {
            self.bearer_token = Some(token);
        }
        self
    }

    pub fn backend_settings(&self) -> BackendSettings {
        BackendSettings {
            base_url: self.base_url.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            stream_idle_timeout: Duration::from_secs(self.stream_idle_timeout_secs),
            bearer_token: self.bearer_token.clone(),
        }
    }

    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            fast_period: Duration::from_millis(self.poll.fast_period_ms),
            slow_period: Duration::from_millis(self.poll.slow_period_ms),
            fast_window: Duration::from_secs(self.poll.fast_window_secs),
            max_consecutive_failures: self.poll.max_consecutive_failures.max(1),
        }
    }
}
