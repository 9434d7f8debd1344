//! ffmpeg/ffplay command construction for subtitle extraction, burn-in and preview.
//!
//! Builders are pure: they return a configured [`Command`] and never run it.

use crate::probe::BitDepth;
use crate::toolkit::ToolError;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

/// Pixel format forced on 8-bit inputs before any other filter
pub const NORMALIZED_PIX_FMT: &str = "yuv420p";

/// Subtitle extraction failed; the file is burned without subtitles.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("subtitle extraction failed: {0}")]
    Tool(#[from] ToolError),

    #[error("extracted subtitle file is missing or empty: {}", .0.display())]
    EmptyOutput(PathBuf),
}

/// Main burn step failed; the file stays pending.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("burn failed: {0}")]
    Tool(#[from] ToolError),

    #[error("burned output is missing or empty: {}", .0.display())]
    MissingOutput(PathBuf),
}

/// Which audio the burn keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioMapping {
    /// One explicitly selected stream (absolute stream index).
    Stream(u32),
    /// Whatever audio exists, if any.
    AnyOptional,
}

impl AudioMapping {
    pub fn from_selection(selected: Option<u32>) -> Self {
        match selected {
            Some(index) => AudioMapping::Stream(index),
            None => AudioMapping::AnyOptional,
        }
    }

    /// Value for `-map`.
    pub fn map_spec(&self) -> String {
        match self {
            AudioMapping::Stream(index) => format!("0:{}", index),
            AudioMapping::AnyOptional => "0:a?".to_string(),
        }
    }
}

/// Extract one subtitle stream into a sidecar file.
#[derive(Debug, Clone)]
pub struct ExtractRequest {
    pub input: PathBuf,
    /// Absolute stream index of the subtitle track
    pub stream_index: u32,
    pub output: PathBuf,
}

/// Burn-in encode of one input file.
#[derive(Debug, Clone)]
pub struct BurnRequest {
    pub input: PathBuf,
    pub output: PathBuf,
    pub audio: AudioMapping,
    /// Complete `-vf` chain, if any
    pub filter: Option<String>,
    /// Video encoder identifier (e.g. `hevc_nvenc`)
    pub encoder: String,
    pub hwaccel: Option<String>,
    /// Directory the tool runs in; sidecars are referenced relative to it
    pub working_dir: Option<PathBuf>,
}

/// Preview of one input with the chosen tracks.
#[derive(Debug, Clone)]
pub struct PreviewRequest {
    pub input: PathBuf,
    /// Absolute stream index of the audio track
    pub audio_stream: Option<u32>,
    /// Position of the subtitle track among the file's subtitle streams
    pub subtitle_ordinal: Option<usize>,
}

/// Escape a value for use inside a filtergraph option.
///
/// Two levels apply: the option value (`\`, `:`, `'`) and the graph itself
/// (`\`, `'`, `[`, `]`, `,`, `;`).
pub fn escape_filter_value(value: &str) -> String {
    let mut option_level = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | ':' | '\'') {
            option_level.push('\\');
        }
        option_level.push(c);
    }

    let mut graph_level = String::with_capacity(option_level.len());
    for c in option_level.chars() {
        if matches!(c, '\\' | '\'' | '[' | ']' | ',' | ';') {
            graph_level.push('\\');
        }
        graph_level.push(c);
    }
    graph_level
}

/// Build the `-vf` chain for a file.
///
/// 8-bit inputs are normalized to [`NORMALIZED_PIX_FMT`] first; 10-bit inputs
/// keep their format. The subtitle sidecar, when present, is burned last.
pub fn build_filter_chain(depth: BitDepth, subtitle_file: Option<&str>) -> Option<String> {
    let mut filters = Vec::new();

    if depth == BitDepth::Eight {
        filters.push(format!("format={}", NORMALIZED_PIX_FMT));
    }

    if let Some(file) = subtitle_file {
        filters.push(format!("subtitles={}", escape_filter_value(file)));
    }

    if filters.is_empty() {
        None
    } else {
        Some(filters.join(","))
    }
}

/// `<output_dir>/<stem><suffix>.<container>`
pub fn output_path(output_dir: &Path, file_name: &str, suffix: &str, container: &str) -> PathBuf {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    output_dir.join(format!("{}{}.{}", stem, suffix, container))
}

/// `ffmpeg -y -i <input> -map 0:<index> <output>`
pub fn build_extract_command(ffmpeg: &Path, request: &ExtractRequest) -> Command {
    let mut cmd = Command::new(ffmpeg);
    cmd.args(["-nostdin", "-hide_banner", "-loglevel", "error", "-y"]);
    cmd.arg("-i").arg(&request.input);
    cmd.arg("-map").arg(format!("0:{}", request.stream_index));
    cmd.arg(&request.output);
    cmd
}

/// Build the main burn-in command.
///
/// Video stream 0 is always mapped; audio follows [`AudioMapping`] and is
/// copied without re-encoding.
pub fn build_burn_command(ffmpeg: &Path, request: &BurnRequest) -> Command {
    let mut cmd = Command::new(ffmpeg);
    cmd.args(["-nostdin", "-hide_banner", "-loglevel", "error", "-y"]);

    if let Some(hwaccel) = &request.hwaccel {
        cmd.arg("-hwaccel").arg(hwaccel);
    }

    cmd.arg("-i").arg(&request.input);
    cmd.arg("-map").arg("0:v:0");
    cmd.arg("-map").arg(request.audio.map_spec());

    if let Some(filter) = &request.filter {
        cmd.arg("-vf").arg(filter);
    }

    cmd.arg("-c:v").arg(&request.encoder);
    cmd.arg("-c:a").arg("copy");
    cmd.arg(&request.output);

    if let Some(dir) = &request.working_dir {
        cmd.current_dir(dir);
    }

    cmd
}

/// Build the ffplay preview command.
pub fn build_preview_command(ffplay: &Path, request: &PreviewRequest) -> Command {
    let mut cmd = Command::new(ffplay);
    cmd.args(["-hide_banner", "-loglevel", "error"]);

    if let Some(index) = request.audio_stream {
        cmd.arg("-ast").arg(index.to_string());
    }

    if let Some(ordinal) = request.subtitle_ordinal {
        let path = request.input.to_string_lossy();
        cmd.arg("-vf").arg(format!(
            "subtitles=filename={}:si={}",
            escape_filter_value(&path),
            ordinal
        ));
    }

    cmd.arg("-i").arg(&request.input);
    cmd
}
