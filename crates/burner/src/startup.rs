//! Startup checks for the external media toolkit.
//!
//! Verifies that ffmpeg and ffprobe can be launched before any folder is
//! touched. ffplay is only needed for previews and is checked softly.

use batchburn_config::ToolsConfig;
use log::{info, warn};
use std::path::Path;
use std::process::{Command, Stdio};
use thiserror::Error;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{tool} not available: {reason}")]
    ToolUnavailable { tool: String, reason: String },

    #[error("could not determine version of {tool}: {output}")]
    Version { tool: String, output: String },
}

/// Parse an ffmpeg-family version banner and extract the major version.
///
/// Handles the banners of ffmpeg, ffprobe and ffplay:
/// - Standard: "ffmpeg version 6.1.1 ..."
/// - N-prefixed: "ffprobe version n7.0-... ..."
///
/// Git builds (`N-113000-g...`) carry no release number and yield `None`.
pub fn parse_ffmpeg_version(version_output: &str) -> Option<u32> {
    let version_line = version_output.lines().map(str::to_lowercase).find(|line| {
        ["ffmpeg version", "ffprobe version", "ffplay version"]
            .iter()
            .any(|banner| line.contains(banner))
    })?;

    let version_part = version_line
        .split(" version ")
        .nth(1)?
        .split_whitespace()
        .next()?
        .to_string();

    // n-prefixed release tags (e.g. "n7.0-...")
    let version_str = version_part.strip_prefix('n').unwrap_or(&version_part);

    let major_str = version_str.split(|c| c == '.' || c == '-').next()?;

    major_str.parse().ok()
}

/// Run `<binary> -version` and return its first output line.
pub fn check_tool_version(binary: &Path) -> Result<String, StartupError> {
    let tool = binary.display().to_string();
    let output = Command::new(binary)
        .arg("-version")
        .stdin(Stdio::null())
        .output()
        .map_err(|e| StartupError::ToolUnavailable {
            tool: tool.clone(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(StartupError::ToolUnavailable {
            tool,
            reason: format!("-version exited with {}", output.status),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    stdout
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .ok_or_else(|| StartupError::Version {
            tool,
            output: "(empty)".to_string(),
        })
}

/// Check the configured toolkit; returns the ffmpeg major version if known.
pub fn check_toolkit(tools: &ToolsConfig) -> Result<Option<u32>, StartupError> {
    let banner = check_tool_version(&tools.ffmpeg)?;
    info!("{}", banner);
    let major = parse_ffmpeg_version(&banner);

    let probe_banner = check_tool_version(&tools.ffprobe)?;
    info!("{}", probe_banner);

    if let Err(e) = check_tool_version(&tools.ffplay) {
        warn!("Preview unavailable: {}", e);
    }

    Ok(major)
}
