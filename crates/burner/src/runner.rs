//! Batch runner.
//!
//! Processes every pending file of every folder strictly one at a time:
//! optional subtitle extraction, then the burn, then a state update. A failed
//! file is reported and left pending; the run always continues with the next.

use crate::capability::EncoderSelection;
use crate::context::{BatchContext, WorkFolder};
use crate::encode::{
    build_filter_chain, output_path, AudioMapping, BurnRequest, EncodeError, ExtractRequest,
    ExtractionError,
};
use crate::probe::{probe_bit_depth, StreamDescriptor};
use crate::progress::{FileOutcome, FileStage, ProgressEvent, ProgressSender};
use crate::state::{JobState, StateIoError, StateStore};
use crate::toolkit::MediaToolkit;
use batchburn_config::Config;
use log::{debug, error, info, warn};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Shared stop request, honoured between files.
pub type CancellationFlag = Arc<AtomicBool>;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("no folders to process")]
    NoFolders,
}

/// Why one file did not finish.
#[derive(Debug, Error)]
enum FileError {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error("burn succeeded but state was not saved: {0}")]
    State(#[from] StateIoError),
}

/// Output and encoder settings for a run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub output_suffix: String,
    /// Output container extension, without the dot
    pub container: String,
    pub hwaccel: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            output_suffix: "-burned".to_string(),
            container: "mp4".to_string(),
            hwaccel: Some("auto".to_string()),
        }
    }
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            output_suffix: config.scan.output_suffix.clone(),
            container: config.encode.container.clone(),
            hwaccel: config.encode.hwaccel.clone(),
        }
    }
}

/// Totals of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Stopped early on request
    pub cancelled: bool,
}

pub struct BatchRunner<T: MediaToolkit> {
    toolkit: Arc<T>,
    store: StateStore,
    encoders: EncoderSelection,
    options: RunOptions,
    cancel: Option<CancellationFlag>,
}

impl<T: MediaToolkit> BatchRunner<T> {
    pub fn new(
        toolkit: Arc<T>,
        store: StateStore,
        encoders: EncoderSelection,
        options: RunOptions,
    ) -> Self {
        Self {
            toolkit,
            store,
            encoders,
            options,
            cancel: None,
        }
    }

    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Process every pending file of every folder in `ctx`.
    ///
    /// Folders run in key order, files in the order of the pending list as it
    /// stood when the folder started. One [`ProgressEvent`] is sent per file.
    pub fn run(&self, ctx: &mut BatchContext, events: &ProgressSender) -> Result<RunSummary, RunError> {
        if ctx.folders.is_empty() {
            return Err(RunError::NoFolders);
        }

        ctx.progress.begin(ctx.folders.values());
        info!(
            "Starting batch: {} folder(s), {} file(s), encoders {}",
            ctx.folders.len(),
            ctx.progress.total(),
            self.encoders
        );

        let mut summary = RunSummary::default();
        let paths: Vec<PathBuf> = ctx.folders.keys().cloned().collect();

        'folders: for path in paths {
            let Some(folder) = ctx.folders.get(&path).cloned() else {
                continue;
            };
            if folder.pending.is_empty() {
                continue;
            }
            if self.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            let describe = |track: Option<&StreamDescriptor>| {
                track.map(|t| t.to_string()).unwrap_or_else(|| "none".to_string())
            };
            info!(
                "Processing {} ({} pending, subtitle {}, audio {})",
                folder.display_name(),
                folder.pending.len(),
                describe(folder.selected_subtitle_descriptor()),
                describe(folder.selected_audio_descriptor())
            );

            let output_dir = folder.output_dir(&self.options.output_suffix);
            let dir_error = fs::create_dir_all(&output_dir).err().map(|e| e.to_string());

            for file in &folder.pending {
                if self.is_cancelled() {
                    summary.cancelled = true;
                    break 'folders;
                }

                let result = match &dir_error {
                    Some(reason) => Err(format!(
                        "cannot create output directory {}: {}",
                        output_dir.display(),
                        reason
                    )),
                    None => self
                        .process_file(&folder, file, &output_dir)
                        .map_err(|e| e.to_string()),
                };

                summary.processed += 1;
                let outcome = match result {
                    Ok(state) => {
                        summary.succeeded += 1;
                        if let Some(f) = ctx.folders.get_mut(&path) {
                            f.apply_state(state);
                        }
                        info!("{}: {}", file, FileStage::Done);
                        FileOutcome::Done
                    }
                    Err(reason) => {
                        summary.failed += 1;
                        error!("{}: {} ({})", file, FileStage::Failed, reason);
                        FileOutcome::Failed(reason)
                    }
                };

                let (folder_percent, global_percent) = ctx.progress.record(&path);
                let event = ProgressEvent {
                    folder: path.clone(),
                    file: file.clone(),
                    outcome,
                    folder_percent,
                    global_percent,
                };
                if events.send(event).is_err() {
                    debug!("Progress receiver dropped");
                }
            }
        }

        info!(
            "Batch finished: {} processed, {} succeeded, {} failed{}",
            summary.processed,
            summary.succeeded,
            summary.failed,
            if summary.cancelled { " (cancelled)" } else { "" }
        );
        Ok(summary)
    }

    fn process_file(
        &self,
        folder: &WorkFolder,
        file: &str,
        output_dir: &Path,
    ) -> Result<JobState, FileError> {
        let input = folder.path.join(file);
        let depth = probe_bit_depth(self.toolkit.as_ref(), &input);
        let encoder = self.encoders.for_bit_depth(depth);
        debug!("{}: {} source, encoder {}", file, depth, encoder);

        let sidecar = folder
            .selected_subtitle
            .and_then(|index| self.extract_sidecar(folder, file, index));
        let sidecar_name = sidecar
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned());

        let request = BurnRequest {
            input,
            output: output_path(
                output_dir,
                file,
                &self.options.output_suffix,
                &self.options.container,
            ),
            audio: AudioMapping::from_selection(folder.selected_audio),
            filter: build_filter_chain(depth, sidecar_name.as_deref()),
            encoder: encoder.to_string(),
            hwaccel: self.options.hwaccel.clone(),
            working_dir: Some(folder.path.clone()),
        };

        info!("{}: {}", file, FileStage::Encoding);
        let burned = self.burn(&request);

        if let Some(path) = &sidecar {
            remove_sidecar(path);
        }
        burned?;

        Ok(self.store.mark_done(&folder.path, file)?)
    }

    /// Extract the selected subtitle; `None` means burn without subtitles.
    fn extract_sidecar(&self, folder: &WorkFolder, file: &str, index: u32) -> Option<PathBuf> {
        let sidecar = folder
            .path
            .join(format!("subs-{}.ass", Uuid::new_v4().simple()));
        let request = ExtractRequest {
            input: folder.path.join(file),
            stream_index: index,
            output: sidecar.clone(),
        };

        info!("{}: {}", file, FileStage::ExtractingSubtitle);
        match self.extract(&request) {
            Ok(()) => Some(sidecar),
            Err(e) => {
                warn!("{}: {}; burning without subtitles", file, e);
                remove_sidecar(&sidecar);
                None
            }
        }
    }

    fn extract(&self, request: &ExtractRequest) -> Result<(), ExtractionError> {
        self.toolkit.extract_subtitle(request)?;
        match fs::metadata(&request.output) {
            Ok(m) if m.len() > 0 => Ok(()),
            _ => Err(ExtractionError::EmptyOutput(request.output.clone())),
        }
    }

    fn burn(&self, request: &BurnRequest) -> Result<(), EncodeError> {
        self.toolkit.burn(request)?;
        match fs::metadata(&request.output) {
            Ok(m) if m.len() > 0 => Ok(()),
            _ => Err(EncodeError::MissingOutput(request.output.clone())),
        }
    }
}

fn remove_sidecar(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}
