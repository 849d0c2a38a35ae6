use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracker_core::Route;
use tracker_logging::tracker_debug;

pub const STATE_FILENAME: &str = ".tracker_state.ron";

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("state directory missing or not writable: {0}")]
    StateDir(String),
    #[error("state file is not valid: {0}")]
    Format(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PersistedState {
    route: String,
    saved_utc: DateTime<Utc>,
}

/// Remembers the route of the last tracked session so a later run can resume
/// it. Writes go through a temp file and a rename so readers never see a
/// partial file.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(STATE_FILENAME)
    }

    /// Returns the saved route, or `None` when nothing was saved yet.
    pub fn load(&self) -> Result<Option<Route>, PersistError> {
        let content = match fs::read_to_string(self.path()) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let state: PersistedState =
            ron::from_str(&content).map_err(|err| PersistError::Format(err.to_string()))?;
        let route = Route::parse(&state.route)
            .ok_or_else(|| PersistError::Format(format!("bad route {:?}", state.route)))?;
        tracker_debug!("loaded route {route} saved at {}", state.saved_utc);
        Ok(Some(route))
    }

    pub fn save(&self, route: &Route) -> Result<PathBuf, PersistError> {
        let state = PersistedState {
            route: route.path(),
            saved_utc: Utc::now(),
        };
        let content = ron::ser::to_string_pretty(&state, ron::ser::PrettyConfig::new())
            .map_err(|err| PersistError::Format(err.to_string()))?;
        write_atomic(&self.dir, STATE_FILENAME, &content)
    }
}

fn ensure_state_dir(dir: &Path) -> Result<(), PersistError> {
    if dir.exists() {
        let meta = fs::metadata(dir).map_err(|e| PersistError::StateDir(e.to_string()))?;
        if !meta.is_dir() {
            return Err(PersistError::StateDir("path is not a directory".into()));
        }
        return Ok(());
    }
    fs::create_dir_all(dir).map_err(|e| PersistError::StateDir(e.to_string()))
}

fn write_atomic(dir: &Path, filename: &str, content: &str) -> Result<PathBuf, PersistError> {
    ensure_state_dir(dir)?;
    let target = dir.join(filename);
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content.as_bytes())?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;
    tmp.persist(&target).map_err(|e| PersistError::Io(e.error))?;
    Ok(target)
}
