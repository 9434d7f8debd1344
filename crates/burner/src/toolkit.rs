//! Media toolkit seam.
//!
//! Every interaction with the external media tools (ffprobe, ffmpeg, ffplay)
//! goes through [`MediaToolkit`]. The orchestration core only sees raw tool
//! output and typed failures; [`FfmpegToolkit`] is the process-backed
//! implementation.

use crate::capability::build_trial_command;
use crate::encode::{
    build_burn_command, build_extract_command, build_preview_command, BurnRequest,
    ExtractRequest, PreviewRequest,
};
use crate::probe::{build_pix_fmt_command, build_streams_command};
use batchburn_config::ToolsConfig;
use log::debug;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// How often a time-bounded invocation checks whether the child has exited
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Number of trailing stderr lines kept in error messages
const STDERR_TAIL_LINES: usize = 12;

/// Failure of a single external tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The tool exited with a non-zero status.
    #[error("{tool} exited with code {code}: {stderr}")]
    Failed {
        tool: String,
        code: i32,
        stderr: String,
    },

    /// The tool was killed by a signal.
    #[error("{tool} was terminated by signal")]
    Terminated { tool: String },

    /// The tool did not finish within its time budget and was killed.
    #[error("{tool} timed out after {timeout:?}")]
    TimedOut { tool: String, timeout: Duration },

    /// The tool could not be started.
    #[error("failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    /// Waiting on a running tool failed.
    #[error("failed waiting for {tool}: {source}")]
    Wait {
        tool: String,
        #[source]
        source: io::Error,
    },
}

impl ToolError {
    /// True when the tool binary itself is missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ToolError::Spawn { source, .. } if source.kind() == io::ErrorKind::NotFound)
    }
}

/// Request/response contract with the external media toolkit.
pub trait MediaToolkit: Send + Sync {
    /// JSON stream listing of `input` (`-show_streams -of json`).
    fn probe_streams_json(&self, input: &Path) -> Result<String, ToolError>;

    /// Raw `pix_fmt` entry of the first video stream of `input`.
    fn probe_pix_fmt(&self, input: &Path) -> Result<String, ToolError>;

    /// Short synthetic encode with `encoder`, killed after `timeout`.
    fn trial_encode(&self, encoder: &str, timeout: Duration) -> Result<(), ToolError>;

    /// Static encoder listing (`-encoders`).
    fn list_encoders(&self) -> Result<String, ToolError>;

    /// Extract one subtitle stream to a sidecar file.
    fn extract_subtitle(&self, request: &ExtractRequest) -> Result<(), ToolError>;

    /// Main burn-in encode.
    fn burn(&self, request: &BurnRequest) -> Result<(), ToolError>;

    /// Launch a preview player without waiting for it.
    fn launch_preview(&self, request: &PreviewRequest) -> Result<(), ToolError>;
}

/// [`MediaToolkit`] backed by ffmpeg/ffprobe/ffplay processes.
#[derive(Debug, Clone)]
pub struct FfmpegToolkit {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub ffplay: PathBuf,
}

impl Default for FfmpegToolkit {
    fn default() -> Self {
        Self::from_config(&ToolsConfig::default())
    }
}

impl FfmpegToolkit {
    pub fn from_config(tools: &ToolsConfig) -> Self {
        Self {
            ffmpeg: tools.ffmpeg.clone(),
            ffprobe: tools.ffprobe.clone(),
            ffplay: tools.ffplay.clone(),
        }
    }
}

impl MediaToolkit for FfmpegToolkit {
    fn probe_streams_json(&self, input: &Path) -> Result<String, ToolError> {
        let output = run_command(build_streams_command(&self.ffprobe, input))?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn probe_pix_fmt(&self, input: &Path) -> Result<String, ToolError> {
        let output = run_command(build_pix_fmt_command(&self.ffprobe, input))?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn trial_encode(&self, encoder: &str, timeout: Duration) -> Result<(), ToolError> {
        run_with_timeout(build_trial_command(&self.ffmpeg, encoder), timeout)
    }

    fn list_encoders(&self) -> Result<String, ToolError> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-encoders"]);
        let output = run_command(cmd)?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn extract_subtitle(&self, request: &ExtractRequest) -> Result<(), ToolError> {
        run_command(build_extract_command(&self.ffmpeg, request)).map(|_| ())
    }

    fn burn(&self, request: &BurnRequest) -> Result<(), ToolError> {
        run_command(build_burn_command(&self.ffmpeg, request)).map(|_| ())
    }

    fn launch_preview(&self, request: &PreviewRequest) -> Result<(), ToolError> {
        let mut cmd = build_preview_command(&self.ffplay, request);
        let tool = tool_name(&cmd);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        debug!("Launching preview: {:?}", cmd);
        let mut child = cmd
            .spawn()
            .map_err(|source| ToolError::Spawn { tool, source })?;

        // Reap the player when it exits; nothing else waits on it.
        thread::spawn(move || {
            let _ = child.wait();
        });

        Ok(())
    }
}

fn tool_name(cmd: &Command) -> String {
    cmd.get_program().to_string_lossy().into_owned()
}

/// Keep the last few non-empty lines of a tool's stderr.
pub(crate) fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

fn check_status(tool: &str, status: ExitStatus, stderr: &[u8]) -> Result<(), ToolError> {
    if status.success() {
        return Ok(());
    }

    match status.code() {
        Some(code) => Err(ToolError::Failed {
            tool: tool.to_string(),
            code,
            stderr: stderr_tail(stderr),
        }),
        None => Err(ToolError::Terminated {
            tool: tool.to_string(),
        }),
    }
}

/// Run a command to completion, capturing its output.
fn run_command(mut cmd: Command) -> Result<Output, ToolError> {
    let tool = tool_name(&cmd);
    cmd.stdin(Stdio::null());
    debug!("Running {:?}", cmd);

    let output = cmd.output().map_err(|source| ToolError::Spawn {
        tool: tool.clone(),
        source,
    })?;

    check_status(&tool, output.status, &output.stderr)?;
    Ok(output)
}

/// Run a command with all output discarded, killing it once `timeout` elapses.
fn run_with_timeout(mut cmd: Command, timeout: Duration) -> Result<(), ToolError> {
    let tool = tool_name(&cmd);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    debug!("Running {:?} (timeout {:?})", cmd, timeout);

    let mut child = cmd.spawn().map_err(|source| ToolError::Spawn {
        tool: tool.clone(),
        source,
    })?;
    let deadline = Instant::now() + timeout;

    loop {
        match child.try_wait() {
            Ok(Some(status)) => return check_status(&tool, status, &[]),
            Ok(None) => {}
            Err(source) => {
                let _ = child.kill();
                return Err(ToolError::Wait { tool, source });
            }
        }

        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ToolError::TimedOut { tool, timeout });
        }

        thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr: String = (0..20).map(|i| format!("line {}\n\n", i)).collect();
        let tail = stderr_tail(stderr.as_bytes());
        let lines: Vec<&str> = tail.lines().collect();
        assert_eq!(lines.len(), STDERR_TAIL_LINES);
        assert_eq!(lines.first(), Some(&"line 8"));
        assert_eq!(lines.last(), Some(&"line 19"));
    }

    #[test]
    fn test_missing_binary_is_not_found() {
        let toolkit = FfmpegToolkit {
            ffmpeg: PathBuf::from("/nonexistent/batchburn-ffmpeg"),
            ffprobe: PathBuf::from("/nonexistent/batchburn-ffprobe"),
            ffplay: PathBuf::from("/nonexistent/batchburn-ffplay"),
        };

        let err = toolkit.list_encoders().unwrap_err();
        assert!(err.is_not_found(), "expected NotFound, got {:?}", err);

        let err = toolkit
            .trial_encode("libx264", Duration::from_secs(1))
            .unwrap_err();
        assert!(err.is_not_found());

        let err = toolkit
            .probe_pix_fmt(Path::new("/nonexistent/video.mkv"))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_command_reports_exit_code() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "echo boom >&2; exit 3"]);
        match run_command(cmd) {
            Err(ToolError::Failed { code, stderr, .. }) => {
                assert_eq!(code, 3);
                assert_eq!(stderr, "boom");
            }
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_run_with_timeout_kills_slow_child() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "sleep 5"]);
        let started = Instant::now();
        let err = run_with_timeout(cmd, Duration::from_millis(100)).unwrap_err();
        assert!(matches!(err, ToolError::TimedOut { .. }));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_with_timeout_success() {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", "exit 0"]);
        assert!(run_with_timeout(cmd, Duration::from_secs(5)).is_ok());
    }
}
