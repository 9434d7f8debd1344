//! Progress accounting for a batch run.
//!
//! The runner records one completion per attempted file; observers receive an
//! immutable [`ProgressEvent`] over a channel after every file.

use crate::context::WorkFolder;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Result of one file attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FileOutcome {
    Done,
    Failed(String),
}

impl fmt::Display for FileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOutcome::Done => write!(f, "done"),
            FileOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Stage of a single file within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStage {
    ExtractingSubtitle,
    Encoding,
    Done,
    Failed,
}

impl fmt::Display for FileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileStage::ExtractingSubtitle => write!(f, "extracting subtitle"),
            FileStage::Encoding => write!(f, "encoding"),
            FileStage::Done => write!(f, "done"),
            FileStage::Failed => write!(f, "failed"),
        }
    }
}

/// Emitted after every attempted file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub folder: PathBuf,
    pub file: String,
    pub outcome: FileOutcome,
    pub folder_percent: f64,
    pub global_percent: f64,
}

pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct FolderCounts {
    total: usize,
    processed: usize,
}

/// Task counters for one run, snapshotted at [`ProgressReporter::begin`].
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    total: usize,
    processed: usize,
    folders: BTreeMap<PathBuf, FolderCounts>,
}

fn percent(processed: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    (processed as f64 / total as f64 * 100.0).min(100.0)
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset counters and snapshot pending counts.
    pub fn begin<'a>(&mut self, folders: impl IntoIterator<Item = &'a WorkFolder>) {
        self.total = 0;
        self.processed = 0;
        self.folders.clear();

        for folder in folders {
            let total = folder.pending.len();
            self.total += total;
            self.folders.insert(
                folder.path.clone(),
                FolderCounts {
                    total,
                    processed: 0,
                },
            );
        }
    }

    /// Count one attempted file; returns `(folder_percent, global_percent)`.
    pub fn record(&mut self, folder: &Path) -> (f64, f64) {
        self.processed += 1;
        let counts = self.folders.entry(folder.to_path_buf()).or_default();
        counts.processed += 1;
        let folder_percent = percent(counts.processed, counts.total);
        (folder_percent, self.global_percent())
    }

    pub fn global_percent(&self) -> f64 {
        percent(self.processed, self.total)
    }

    pub fn folder_percent(&self, folder: &Path) -> f64 {
        self.folders
            .get(folder)
            .map(|c| percent(c.processed, c.total))
            .unwrap_or(100.0)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn processed(&self) -> usize {
        self.processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn folder(path: &str, pending: &[&str]) -> WorkFolder {
        let mut f = WorkFolder::new(PathBuf::from(path));
        f.pending = pending.iter().map(|s| s.to_string()).collect();
        f
    }

    #[test]
    fn test_two_files_half_then_full() {
        let folders = [folder("/m/show", &["a.mkv", "b.mkv"])];
        let mut progress = ProgressReporter::new();
        progress.begin(folders.iter());
        assert_eq!(progress.total(), 2);
        assert_eq!(progress.global_percent(), 0.0);

        assert_eq!(progress.record(Path::new("/m/show")), (50.0, 50.0));
        assert_eq!(progress.record(Path::new("/m/show")), (100.0, 100.0));
    }

    #[test]
    fn test_zero_total_is_complete() {
        let folders = [folder("/m/empty", &[])];
        let mut progress = ProgressReporter::new();
        progress.begin(folders.iter());
        assert_eq!(progress.global_percent(), 100.0);
        assert_eq!(progress.folder_percent(Path::new("/m/empty")), 100.0);
    }

    #[test]
    fn test_begin_resets() {
        let folders = [folder("/m/a", &["1.mkv"])];
        let mut progress = ProgressReporter::new();
        progress.begin(folders.iter());
        progress.record(Path::new("/m/a"));
        progress.begin(folders.iter());
        assert_eq!(progress.processed(), 0);
        assert_eq!(progress.folder_percent(Path::new("/m/a")), 0.0);
    }

    #[test]
    fn test_unknown_folder_never_exceeds_hundred() {
        let mut progress = ProgressReporter::new();
        progress.begin(std::iter::empty());
        let (folder_pct, global_pct) = progress.record(Path::new("/m/unknown"));
        assert_eq!(folder_pct, 100.0);
        assert_eq!(global_pct, 100.0);
    }

    #[tokio::test]
    async fn test_events_delivered_in_order() {
        let (tx, mut rx) = progress_channel();
        for (i, file) in ["a.mkv", "b.mkv"].iter().enumerate() {
            tx.send(ProgressEvent {
                folder: PathBuf::from("/m"),
                file: file.to_string(),
                outcome: FileOutcome::Done,
                folder_percent: (i + 1) as f64 * 50.0,
                global_percent: (i + 1) as f64 * 50.0,
            })
            .unwrap();
        }
        drop(tx);

        let mut files = Vec::new();
        while let Some(event) = rx.recv().await {
            files.push(event.file);
        }
        assert_eq!(files, vec!["a.mkv", "b.mkv"]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_progress_monotonic_and_bounded(
            sizes in prop::collection::vec(0usize..6, 1..5),
        ) {
            let folders: Vec<WorkFolder> = sizes
                .iter()
                .enumerate()
                .map(|(i, n)| {
                    let pending: Vec<String> = (0..*n).map(|j| format!("{}.mkv", j)).collect();
                    let mut f = WorkFolder::new(PathBuf::from(format!("/m/{}", i)));
                    f.pending = pending;
                    f
                })
                .collect();

            let mut progress = ProgressReporter::new();
            progress.begin(folders.iter());

            let mut last_global = progress.global_percent();
            for f in &folders {
                let mut last_folder = 0.0;
                for _ in 0..f.pending.len() {
                    let (folder_pct, global_pct) = progress.record(&f.path);
                    prop_assert!(folder_pct >= last_folder && folder_pct <= 100.0);
                    prop_assert!(global_pct >= last_global && global_pct <= 100.0);
                    last_folder = folder_pct;
                    last_global = global_pct;
                }
            }
            prop_assert_eq!(progress.global_percent(), 100.0);
        }
    }
}
