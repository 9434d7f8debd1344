//! Media probing via ffprobe.
//!
//! Collects subtitle/audio stream descriptors and the bit depth of the primary
//! video stream. Callers treat every probe failure as "no information": empty
//! track lists and 8-bit.

use crate::toolkit::{MediaToolkit, ToolError};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

/// Language tag used when a stream carries none
pub const UNDETERMINED_LANGUAGE: &str = "und";

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// ffprobe could not be run or exited with an error.
    #[error("ffprobe failed: {0}")]
    Tool(#[from] ToolError),

    /// ffprobe output could not be parsed.
    #[error("Failed to parse ffprobe output: {0}")]
    Parse(String),
}

/// One subtitle or audio stream of a media file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Absolute stream index within the file.
    pub index: u32,
    pub codec_name: String,
    /// Language tag, `und` when absent.
    pub language: String,
    /// Free-form title tag, if any.
    pub title: Option<String>,
}

impl StreamDescriptor {
    /// Case-insensitive substring match of any preferred language against the
    /// language tag or title.
    pub fn matches_language(&self, preferred: &[String]) -> bool {
        let language = self.language.to_lowercase();
        let title = self.title.as_deref().unwrap_or("").to_lowercase();

        preferred
            .iter()
            .map(|p| p.trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .any(|p| language.contains(&p) || title.contains(&p))
    }
}

impl fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}):{}", self.codec_name, self.language, self.index)?;
        if let Some(title) = &self.title {
            write!(f, " \"{}\"", title)?;
        }
        Ok(())
    }
}

/// Track metadata of a file, partitioned by stream type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamListing {
    pub subtitles: Vec<StreamDescriptor>,
    pub audios: Vec<StreamDescriptor>,
}

/// Bit depth class of the primary video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitDepth {
    Eight,
    TenOrMore,
}

impl fmt::Display for BitDepth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BitDepth::Eight => write!(f, "8-bit"),
            BitDepth::TenOrMore => write!(f, "10-bit"),
        }
    }
}

/// Raw ffprobe JSON structures for parsing.
mod ffprobe_json {
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub streams: Option<Vec<Stream>>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub index: u32,
        pub codec_type: Option<String>,
        pub codec_name: Option<String>,
        pub tags: Option<HashMap<String, String>>,
    }
}

/// `ffprobe -v error -show_streams -of json <input>`
pub fn build_streams_command(ffprobe: &Path, input: &Path) -> Command {
    let mut cmd = Command::new(ffprobe);
    cmd.args(["-v", "error", "-show_streams", "-of", "json"]);
    cmd.arg(input);
    cmd
}

/// Pixel format of the first video stream, value only.
pub fn build_pix_fmt_command(ffprobe: &Path, input: &Path) -> Command {
    let mut cmd = Command::new(ffprobe);
    cmd.args([
        "-v",
        "error",
        "-select_streams",
        "v:0",
        "-show_entries",
        "stream=pix_fmt",
        "-of",
        "default=nokey=1:noprint_wrappers=1",
    ]);
    cmd.arg(input);
    cmd
}

fn tag<'a>(tags: &'a Option<std::collections::HashMap<String, String>>, key: &str) -> Option<&'a str> {
    tags.as_ref().and_then(|t| {
        t.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    })
}

/// Parse ffprobe stream JSON into subtitle and audio descriptors.
pub fn parse_streams(json_str: &str) -> Result<StreamListing, ProbeError> {
    let output: ffprobe_json::FfprobeOutput =
        serde_json::from_str(json_str).map_err(|e| ProbeError::Parse(e.to_string()))?;

    let mut listing = StreamListing::default();

    for stream in output.streams.unwrap_or_default() {
        let language = tag(&stream.tags, "language")
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .unwrap_or(UNDETERMINED_LANGUAGE)
            .to_string();
        let descriptor = StreamDescriptor {
            index: stream.index,
            codec_name: stream.codec_name.clone().unwrap_or_else(|| "unknown".to_string()),
            language,
            title: tag(&stream.tags, "title").map(str::to_string),
        };

        match stream.codec_type.as_deref() {
            Some("subtitle") => listing.subtitles.push(descriptor),
            Some("audio") => listing.audios.push(descriptor),
            _ => {}
        }
    }

    Ok(listing)
}

/// Classify a pixel format name by bits per component.
///
/// Planar formats carry their depth as a trailing number (`yuv420p10le`,
/// `gbrp12`, `gray16`). Semi-planar and packed high-depth formats encode it in
/// the name (`p010`, `y210`, `nv20`, `xv30`, `v30x`). Packed RGB carries either
/// the total (`rgb24`, `rgb48`) or one digit per channel (`rgb565`, `bgr444`).
/// Unknown or empty input is 8-bit.
pub fn parse_bit_depth(pix_fmt: &str) -> BitDepth {
    let fmt = pix_fmt.trim().to_lowercase();
    let fmt = fmt
        .strip_suffix("le")
        .or_else(|| fmt.strip_suffix("be"))
        .unwrap_or(&fmt);

    if fmt == "v30x" {
        return BitDepth::TenOrMore;
    }

    let digits_start = fmt
        .rfind(|c: char| !c.is_ascii_digit())
        .map(|i| i + 1)
        .unwrap_or(0);
    let (head, digits) = fmt.split_at(digits_start);
    let Ok(value) = digits.parse::<u32>() else {
        return BitDepth::Eight;
    };

    let depth = match head {
        // p010, p216, y210, y212: last two digits are the depth
        "p" | "y" => value % 100,
        "nv" if value == 20 => 10,
        "nv" => 8,
        // xv30, xv36, xv48: total of three components
        "xv" => value / 3,
        // rgb565, bgr444: one digit per channel
        "rgb" | "bgr" if digits.len() == 3 => digits
            .chars()
            .filter_map(|c| c.to_digit(10))
            .max()
            .unwrap_or(8),
        "rgb" | "bgr" => value / 3,
        "rgba" | "bgra" | "argb" | "abgr" => value / 4,
        "x2rgb" | "x2bgr" | "ya" => value,
        h if h.ends_with('p') || h.ends_with("pf") || h.starts_with("gray") => value,
        _ => 8,
    };

    if depth >= 10 {
        BitDepth::TenOrMore
    } else {
        BitDepth::Eight
    }
}

/// Probe the subtitle and audio tracks of `path`.
pub fn probe_streams<T: MediaToolkit + ?Sized>(
    toolkit: &T,
    path: &Path,
) -> Result<StreamListing, ProbeError> {
    let json = toolkit.probe_streams_json(path)?;
    let listing = parse_streams(&json)?;
    debug!(
        "Probed {}: {} subtitle stream(s), {} audio stream(s)",
        path.display(),
        listing.subtitles.len(),
        listing.audios.len()
    );
    Ok(listing)
}

/// Bit depth of the primary video stream; any failure reads as 8-bit.
pub fn probe_bit_depth<T: MediaToolkit + ?Sized>(toolkit: &T, path: &Path) -> BitDepth {
    match toolkit.probe_pix_fmt(path) {
        Ok(pix_fmt) => parse_bit_depth(&pix_fmt),
        Err(e) => {
            debug!("Bit depth probe failed for {}, assuming 8-bit: {}", path.display(), e);
            BitDepth::Eight
        }
    }
}
