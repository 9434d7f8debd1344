//! In-memory model of a batch: discovered folders and their track choices.

use crate::probe::StreamDescriptor;
use crate::progress::ProgressReporter;
use crate::state::JobState;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A directory that directly contains at least one video file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WorkFolder {
    pub path: PathBuf,
    pub pending: Vec<String>,
    pub finished: Vec<String>,
    /// Subtitle tracks of the folder's first video
    pub subtitles: Vec<StreamDescriptor>,
    /// Audio tracks of the folder's first video
    pub audios: Vec<StreamDescriptor>,
    /// Absolute stream index of the chosen subtitle track
    pub selected_subtitle: Option<u32>,
    /// Absolute stream index of the chosen audio track
    pub selected_audio: Option<u32>,
    pub video_count: usize,
    pub total_bytes: u64,
}

impl WorkFolder {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            ..Default::default()
        }
    }

    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }

    /// Sibling directory `<folder><suffix>` receiving the burned outputs.
    pub fn output_dir(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    }

    /// Replace the in-memory lists with a persisted state.
    pub fn apply_state(&mut self, state: JobState) {
        self.finished = state.finished;
        self.pending = state.pending;
    }

    /// Choose a subtitle track by stream index; `None` disables burn-in.
    ///
    /// Returns false (and keeps the current choice) for an index that is not
    /// one of the folder's subtitle streams.
    pub fn select_subtitle(&mut self, index: Option<u32>) -> bool {
        match index {
            Some(i) if !self.subtitles.iter().any(|s| s.index == i) => false,
            _ => {
                self.selected_subtitle = index;
                true
            }
        }
    }

    /// Choose an audio track by stream index; `None` keeps any audio.
    pub fn select_audio(&mut self, index: Option<u32>) -> bool {
        match index {
            Some(i) if !self.audios.iter().any(|a| a.index == i) => false,
            _ => {
                self.selected_audio = index;
                true
            }
        }
    }

    pub fn selected_subtitle_descriptor(&self) -> Option<&StreamDescriptor> {
        let index = self.selected_subtitle?;
        self.subtitles.iter().find(|s| s.index == index)
    }

    pub fn selected_audio_descriptor(&self) -> Option<&StreamDescriptor> {
        let index = self.selected_audio?;
        self.audios.iter().find(|a| a.index == index)
    }

    /// Position of the selected subtitle among the subtitle streams.
    pub fn subtitle_ordinal(&self) -> Option<usize> {
        let index = self.selected_subtitle?;
        self.subtitles.iter().position(|s| s.index == index)
    }
}

/// Everything a run operates on. Owned by the caller, passed explicitly.
#[derive(Debug, Clone, Default)]
pub struct BatchContext {
    pub folders: BTreeMap<PathBuf, WorkFolder>,
    pub progress: ProgressReporter,
}

impl BatchContext {
    pub fn new(folders: BTreeMap<PathBuf, WorkFolder>) -> Self {
        Self {
            folders,
            progress: ProgressReporter::new(),
        }
    }

    pub fn pending_total(&self) -> usize {
        self.folders.values().map(|f| f.pending.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(index: u32, language: &str) -> StreamDescriptor {
        StreamDescriptor {
            index,
            codec_name: "ass".to_string(),
            language: language.to_string(),
            title: None,
        }
    }

    #[test]
    fn test_output_dir_is_sibling() {
        let folder = WorkFolder::new(PathBuf::from("/media/Show S1"));
        assert_eq!(
            folder.output_dir("-burned"),
            PathBuf::from("/media/Show S1-burned")
        );
        assert_eq!(folder.display_name(), "Show S1");
    }

    #[test]
    fn test_selection_validates_index() {
        let mut folder = WorkFolder::new(PathBuf::from("/m"));
        folder.subtitles = vec![stream(2, "eng"), stream(3, "jpn")];

        assert!(folder.select_subtitle(Some(3)));
        assert_eq!(folder.subtitle_ordinal(), Some(1));
        assert_eq!(folder.selected_subtitle_descriptor().map(|s| s.language.as_str()), Some("jpn"));

        assert!(!folder.select_subtitle(Some(9)));
        assert_eq!(folder.selected_subtitle, Some(3));

        assert!(folder.select_subtitle(None));
        assert_eq!(folder.subtitle_ordinal(), None);

        assert!(!folder.select_audio(Some(1)));
        assert!(folder.select_audio(None));
        assert!(folder.selected_audio_descriptor().is_none());
    }

    #[test]
    fn test_apply_state() {
        let mut folder = WorkFolder::new(PathBuf::from("/m"));
        folder.apply_state(JobState {
            finished: vec!["a.mkv".to_string()],
            pending: vec!["b.mkv".to_string()],
        });
        assert_eq!(folder.finished, vec!["a.mkv"]);
        assert_eq!(folder.pending, vec!["b.mkv"]);

        let mut folders = BTreeMap::new();
        folders.insert(folder.path.clone(), folder);
        let ctx = BatchContext::new(folders);
        assert_eq!(ctx.pending_total(), 1);
    }
}
