//! Scripted [`MediaToolkit`] for tests.

use crate::encode::{BurnRequest, ExtractRequest, PreviewRequest};
use crate::toolkit::{MediaToolkit, ToolError};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// Answers probes from per-file-name tables and records every request.
///
/// Burns and extractions write small files so the runner's output checks
/// see real results on disk.
#[derive(Default)]
pub struct FakeToolkit {
    streams: HashMap<String, String>,
    pix_fmts: HashMap<String, String>,
    encoders: BTreeSet<String>,
    missing_trials: bool,
    missing_listing: bool,
    missing_player: bool,
    failing_extract: bool,
    failing_burns: HashSet<String>,
    trials: AtomicUsize,
    extracts: Mutex<Vec<ExtractRequest>>,
    burns: Mutex<Vec<BurnRequest>>,
    previews: Mutex<Vec<PreviewRequest>>,
}

fn file_key(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn failed(tool: &str, stderr: &str) -> ToolError {
    ToolError::Failed {
        tool: tool.to_string(),
        code: 1,
        stderr: stderr.to_string(),
    }
}

fn not_found(tool: &str) -> ToolError {
    ToolError::Spawn {
        tool: tool.to_string(),
        source: io::Error::new(io::ErrorKind::NotFound, "No such file or directory"),
    }
}

impl FakeToolkit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_streams(mut self, file_name: &str, json: &str) -> Self {
        self.streams.insert(file_name.to_string(), json.to_string());
        self
    }

    pub fn with_pix_fmt(mut self, file_name: &str, pix_fmt: &str) -> Self {
        self.pix_fmts
            .insert(file_name.to_string(), format!("{}\n", pix_fmt));
        self
    }

    /// Encoders that pass the trial encode and appear in the listing.
    pub fn with_encoders(mut self, encoders: &[&str]) -> Self {
        self.encoders
            .extend(encoders.iter().map(|e| e.to_string()));
        self
    }

    pub fn with_missing_trials(mut self) -> Self {
        self.missing_trials = true;
        self
    }

    pub fn with_missing_listing(mut self) -> Self {
        self.missing_listing = true;
        self
    }

    pub fn with_missing_player(mut self) -> Self {
        self.missing_player = true;
        self
    }

    /// Every extraction leaves a partial sidecar and fails.
    pub fn failing_extract(mut self) -> Self {
        self.failing_extract = true;
        self
    }

    pub fn failing_burn_for(mut self, file_name: &str) -> Self {
        self.failing_burns.insert(file_name.to_string());
        self
    }

    pub fn trial_count(&self) -> usize {
        self.trials.load(Ordering::SeqCst)
    }

    pub fn extract_requests(&self) -> Vec<ExtractRequest> {
        self.extracts.lock().unwrap().clone()
    }

    pub fn burn_requests(&self) -> Vec<BurnRequest> {
        self.burns.lock().unwrap().clone()
    }

    pub fn preview_requests(&self) -> Vec<PreviewRequest> {
        self.previews.lock().unwrap().clone()
    }
}

impl MediaToolkit for FakeToolkit {
    fn probe_streams_json(&self, input: &Path) -> Result<String, ToolError> {
        self.streams
            .get(&file_key(input))
            .cloned()
            .ok_or_else(|| failed("ffprobe", "Invalid data found when processing input"))
    }

    fn probe_pix_fmt(&self, input: &Path) -> Result<String, ToolError> {
        self.pix_fmts
            .get(&file_key(input))
            .cloned()
            .ok_or_else(|| failed("ffprobe", "Invalid data found when processing input"))
    }

    fn trial_encode(&self, encoder: &str, timeout: Duration) -> Result<(), ToolError> {
        self.trials.fetch_add(1, Ordering::SeqCst);
        if self.missing_trials {
            return Err(not_found("ffmpeg"));
        }
        if self.encoders.contains(encoder) {
            Ok(())
        } else {
            Err(ToolError::TimedOut {
                tool: "ffmpeg".to_string(),
                timeout,
            })
        }
    }

    fn list_encoders(&self) -> Result<String, ToolError> {
        if self.missing_listing {
            return Err(not_found("ffmpeg"));
        }
        let mut listing = String::from("Encoders:\n V..... = Video\n ------\n");
        for encoder in &self.encoders {
            listing.push_str(&format!(" V....D {:<20} fake encoder\n", encoder));
        }
        Ok(listing)
    }

    fn extract_subtitle(&self, request: &ExtractRequest) -> Result<(), ToolError> {
        self.extracts.lock().unwrap().push(request.clone());
        if self.failing_extract {
            let _ = fs::write(&request.output, "[Script");
            return Err(failed("ffmpeg", "Subtitle encoding failed"));
        }
        fs::write(&request.output, "[Script Info]\nScriptType: v4.00+\n")
            .map_err(|e| failed("ffmpeg", &e.to_string()))
    }

    fn burn(&self, request: &BurnRequest) -> Result<(), ToolError> {
        self.burns.lock().unwrap().push(request.clone());
        if self.failing_burns.contains(&file_key(&request.input)) {
            return Err(failed("ffmpeg", "Conversion failed!"));
        }
        fs::write(&request.output, "burned").map_err(|e| failed("ffmpeg", &e.to_string()))
    }

    fn launch_preview(&self, request: &PreviewRequest) -> Result<(), ToolError> {
        if self.missing_player {
            return Err(not_found("ffplay"));
        }
        self.previews.lock().unwrap().push(request.clone());
        Ok(())
    }
}
