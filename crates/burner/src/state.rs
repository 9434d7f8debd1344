//! Per-folder resumable job state.
//!
//! Each work folder carries a small JSON file listing which videos are
//! finished and which are still pending. The file is re-read on every update
//! so a hand edit between runs (or between files) is honoured.

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default name of the state file inside each work folder
pub const DEFAULT_STATE_FILE: &str = "burn_state.json";

/// Error type for state persistence.
#[derive(Debug, Error)]
pub enum StateIoError {
    #[error("failed to read state file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("state file {} is not valid JSON: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("failed to write state file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Persisted record of a folder's progress.
///
/// `finished` and `pending` are disjoint and duplicate-free after
/// [`JobState::reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobState {
    pub finished: Vec<String>,
    pub pending: Vec<String>,
}

impl JobState {
    /// Everything pending, nothing finished.
    pub fn fresh(videos: &[String]) -> Self {
        Self {
            finished: Vec::new(),
            pending: videos.to_vec(),
        }
    }

    pub fn is_finished(&self, file_name: &str) -> bool {
        self.finished.iter().any(|f| f == file_name)
    }

    /// Bring a loaded state in line with the files actually present.
    ///
    /// Duplicates are dropped, pending entries that are finished or no longer
    /// on disk are dropped, and an empty pending list is recomputed as
    /// `videos - finished` in the order of `videos`.
    pub fn reconcile(&mut self, videos: &[String]) {
        let mut seen = HashSet::new();
        self.finished.retain(|f| seen.insert(f.clone()));

        let present: HashSet<&str> = videos.iter().map(String::as_str).collect();
        let finished: HashSet<String> = self.finished.iter().cloned().collect();
        let mut seen = HashSet::new();
        self.pending.retain(|p| {
            !finished.contains(p) && present.contains(p.as_str()) && seen.insert(p.clone())
        });

        if self.pending.is_empty() {
            self.pending = videos
                .iter()
                .filter(|v| !finished.contains(*v))
                .cloned()
                .collect();
        }
    }

    /// Move `file_name` to finished. Idempotent; untracked names are added.
    pub fn mark_done(&mut self, file_name: &str) {
        if !self.is_finished(file_name) {
            self.finished.push(file_name.to_string());
        }
        self.pending.retain(|p| p != file_name);
    }
}

/// Reads and writes the state file of a folder.
#[derive(Debug, Clone)]
pub struct StateStore {
    file_name: String,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_FILE)
    }
}

impl StateStore {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn state_path(&self, folder: &Path) -> PathBuf {
        folder.join(&self.file_name)
    }

    /// Read the raw state file. `Ok(None)` when it does not exist.
    pub fn read(&self, folder: &Path) -> Result<Option<JobState>, StateIoError> {
        let path = self.state_path(folder);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(StateIoError::Read { path, source }),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| StateIoError::Corrupt { path, source })
    }

    /// Persist atomically: temporary sibling, then rename over the target.
    pub fn save(&self, folder: &Path, state: &JobState) -> Result<(), StateIoError> {
        let path = self.state_path(folder);
        let tmp_path = folder.join(format!(".{}.tmp", self.file_name));
        let json = serde_json::to_string_pretty(state)?;

        fs::write(&tmp_path, json).map_err(|source| StateIoError::Write {
            path: tmp_path.clone(),
            source,
        })?;

        if let Err(source) = fs::rename(&tmp_path, &path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(StateIoError::Write { path, source });
        }

        Ok(())
    }

    /// Read with read failures degraded to "no state".
    fn read_or_fresh(&self, folder: &Path) -> Option<JobState> {
        match self.read(folder) {
            Ok(state) => state,
            Err(e) => {
                warn!("{}; starting from a fresh state", e);
                None
            }
        }
    }

    /// Load, reconcile against `videos` and write back.
    pub fn load(&self, folder: &Path, videos: &[String]) -> Result<JobState, StateIoError> {
        let mut state = self
            .read_or_fresh(folder)
            .unwrap_or_else(|| JobState::fresh(videos));
        state.reconcile(videos);

        debug!(
            "State for {}: {} finished, {} pending",
            folder.display(),
            state.finished.len(),
            state.pending.len()
        );

        self.save(folder, &state)?;
        Ok(state)
    }

    /// Re-read, mark one file finished and persist.
    pub fn mark_done(&self, folder: &Path, file_name: &str) -> Result<JobState, StateIoError> {
        let mut state = self.read_or_fresh(folder).unwrap_or_default();
        state.mark_done(file_name);
        self.save(folder, &state)?;
        Ok(state)
    }
}
