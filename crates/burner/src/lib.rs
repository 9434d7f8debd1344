//! batchburn
//!
//! Orchestration core for burning subtitles into batches of videos: folder
//! discovery, resumable per-folder state, encoder capability discovery,
//! sequential execution through ffmpeg and progress accounting.

pub mod capability;
pub mod context;
pub mod encode;
pub mod preview;
pub mod probe;
pub mod progress;
pub mod runner;
pub mod scan;
pub mod startup;
pub mod state;
pub mod toolkit;

#[cfg(test)]
pub(crate) mod testing;

pub use batchburn_config as config;
pub use batchburn_config::Config;
pub use capability::{
    discover_available, parse_encoder_listing, resolve_available, select_best, CapabilityError,
    CodecFamily, EncoderSelection, DEFAULT_TRIAL_TIMEOUT,
};
pub use context::{BatchContext, WorkFolder};
pub use encode::{EncodeError, ExtractionError};
pub use preview::{preview_folder, preview_request, PreviewError};
pub use probe::{
    parse_bit_depth, parse_streams, probe_bit_depth, probe_streams, BitDepth, ProbeError,
    StreamDescriptor, StreamListing,
};
pub use progress::{
    progress_channel, FileOutcome, FileStage, ProgressEvent, ProgressReceiver, ProgressReporter,
    ProgressSender,
};
pub use runner::{BatchRunner, CancellationFlag, RunError, RunOptions, RunSummary};
pub use scan::{auto_select, is_video_file, scan_folders, ScanError, ScanOptions};
pub use startup::{check_tool_version, check_toolkit, parse_ffmpeg_version, StartupError};
pub use state::{JobState, StateIoError, StateStore};
pub use toolkit::{FfmpegToolkit, MediaToolkit, ToolError};
