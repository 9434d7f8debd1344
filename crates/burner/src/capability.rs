//! Encoder capability discovery and selection.
//!
//! Hardware encoders are only usable when the driver stack behind them works,
//! so availability is established by trial-encoding a tiny synthetic clip with
//! each candidate. Families are probed in parallel (one worker each); the
//! candidates of one family are tried one after another.

use crate::probe::BitDepth;
use crate::toolkit::{MediaToolkit, ToolError};
use log::{debug, info, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinSet;

/// Default upper bound for one trial encode
pub const DEFAULT_TRIAL_TIMEOUT: Duration = Duration::from_secs(4);

/// Error type for capability discovery.
#[derive(Debug, Error)]
pub enum CapabilityError {
    /// A single trial encode failed or timed out.
    #[error("trial encode with {encoder} failed: {source}")]
    Trial {
        encoder: &'static str,
        #[source]
        source: ToolError,
    },

    /// The toolkit binary could not be started at all.
    #[error("media toolkit unavailable: {0}")]
    ToolUnavailable(String),

    /// A discovery worker panicked or was cancelled.
    #[error("discovery worker failed: {0}")]
    Worker(String),
}

/// Target compression standard, independent of the concrete encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CodecFamily {
    Av1,
    Hevc,
    H264,
}

impl CodecFamily {
    pub const ALL: [CodecFamily; 3] = [CodecFamily::Av1, CodecFamily::Hevc, CodecFamily::H264];

    /// Hardware encoders in preference order: NVENC, QSV, AMF.
    pub fn hardware_candidates(&self) -> &'static [&'static str] {
        match self {
            CodecFamily::Av1 => &["av1_nvenc", "av1_qsv", "av1_amf"],
            CodecFamily::Hevc => &["hevc_nvenc", "hevc_qsv", "hevc_amf"],
            CodecFamily::H264 => &["h264_nvenc", "h264_qsv", "h264_amf"],
        }
    }

    /// Software encoder used when no hardware candidate is available.
    pub fn software_fallback(&self) -> &'static str {
        match self {
            CodecFamily::Av1 => "libsvtav1",
            CodecFamily::Hevc => "libx265",
            CodecFamily::H264 => "libx264",
        }
    }

    /// Best encoder of this family present in `available`.
    pub fn best_available(&self, available: &BTreeSet<String>) -> &'static str {
        self.hardware_candidates()
            .iter()
            .copied()
            .find(|candidate| available.contains(*candidate))
            .unwrap_or_else(|| self.software_fallback())
    }
}

impl fmt::Display for CodecFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecFamily::Av1 => write!(f, "av1"),
            CodecFamily::Hevc => write!(f, "hevc"),
            CodecFamily::H264 => write!(f, "h264"),
        }
    }
}

/// One chosen encoder per codec family, resolved once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncoderSelection {
    pub av1: &'static str,
    pub hevc: &'static str,
    pub h264: &'static str,
}

impl EncoderSelection {
    /// Software encoders for every family.
    pub fn software() -> Self {
        Self {
            av1: CodecFamily::Av1.software_fallback(),
            hevc: CodecFamily::Hevc.software_fallback(),
            h264: CodecFamily::H264.software_fallback(),
        }
    }

    pub fn for_family(&self, family: CodecFamily) -> &'static str {
        match family {
            CodecFamily::Av1 => self.av1,
            CodecFamily::Hevc => self.hevc,
            CodecFamily::H264 => self.h264,
        }
    }

    /// HEVC keeps 10-bit sources intact; everything else goes to H.264.
    pub fn for_bit_depth(&self, depth: BitDepth) -> &'static str {
        match depth {
            BitDepth::TenOrMore => self.hevc,
            BitDepth::Eight => self.h264,
        }
    }
}

impl fmt::Display for EncoderSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "av1={} hevc={} h264={}", self.av1, self.hevc, self.h264)
    }
}

/// Pick the preferred encoder of each family from an availability set.
pub fn select_best(available: &BTreeSet<String>) -> EncoderSelection {
    EncoderSelection {
        av1: CodecFamily::Av1.best_available(available),
        hevc: CodecFamily::Hevc.best_available(available),
        h264: CodecFamily::H264.best_available(available),
    }
}

/// Trial encode: 0.2 s of tone and test pattern into the null muxer.
pub fn build_trial_command(ffmpeg: &Path, encoder: &str) -> Command {
    let mut cmd = Command::new(ffmpeg);
    cmd.args(["-nostdin", "-hide_banner", "-loglevel", "error"]);
    cmd.args(["-f", "lavfi", "-i", "sine=frequency=440:duration=0.2"]);
    cmd.args(["-f", "lavfi", "-i", "testsrc2=duration=0.2:size=320x240:rate=1"]);
    cmd.arg("-c:v").arg(encoder);
    cmd.args(["-c:a", "aac", "-f", "null", "-"]);
    cmd
}

/// Parse `ffmpeg -encoders` output into the set of encoder names.
///
/// Entries look like ` V....D h264_nvenc  NVIDIA NVENC H.264 encoder`; legend
/// lines (` V..... = Video`) are skipped.
pub fn parse_encoder_listing(output: &str) -> BTreeSet<String> {
    output
        .lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            let flags = tokens.next()?;
            let name = tokens.next()?;
            let is_flags = flags.len() == 6 && flags.chars().all(|c| "VASFXBD.".contains(c));
            (is_flags && name != "=").then(|| name.to_string())
        })
        .collect()
}

/// Trial every candidate of one family in order.
fn test_family<T: MediaToolkit + ?Sized>(
    toolkit: &T,
    family: CodecFamily,
    timeout: Duration,
) -> Result<Vec<(&'static str, bool)>, CapabilityError> {
    let mut results = Vec::new();

    for &encoder in family.hardware_candidates() {
        let available = match toolkit.trial_encode(encoder, timeout) {
            Ok(()) => true,
            Err(e) if e.is_not_found() => {
                return Err(CapabilityError::ToolUnavailable(e.to_string()));
            }
            Err(source) => {
                debug!("{}", CapabilityError::Trial { encoder, source });
                false
            }
        };

        info!(
            "{}: {}",
            encoder,
            if available { "AVAILABLE" } else { "UNAVAILABLE" }
        );
        results.push((encoder, available));
    }

    Ok(results)
}

/// Discover usable hardware encoders by trial encoding.
///
/// Each family runs on its own blocking worker and returns its own results;
/// the results are merged once every worker has finished.
pub async fn discover_available<T: MediaToolkit + 'static>(
    toolkit: Arc<T>,
    timeout: Duration,
) -> Result<BTreeSet<String>, CapabilityError> {
    let mut workers = JoinSet::new();
    for family in CodecFamily::ALL {
        let toolkit = toolkit.clone();
        workers.spawn_blocking(move || test_family(toolkit.as_ref(), family, timeout));
    }

    let mut results: BTreeMap<&'static str, bool> = BTreeMap::new();
    let mut failure = None;

    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(Ok(family_results)) => results.extend(family_results),
            Ok(Err(e)) => failure = Some(e),
            Err(e) => failure = Some(CapabilityError::Worker(e.to_string())),
        }
    }

    if let Some(e) = failure {
        return Err(e);
    }

    Ok(results
        .into_iter()
        .filter(|(_, available)| *available)
        .map(|(encoder, _)| encoder.to_string())
        .collect())
}

/// Discovery with the static encoder listing as a weaker fallback.
///
/// Never fails: when neither source works the set is empty and every family
/// falls back to its software encoder.
pub async fn resolve_available<T: MediaToolkit + 'static>(
    toolkit: Arc<T>,
    timeout: Duration,
) -> BTreeSet<String> {
    match discover_available(toolkit.clone(), timeout).await {
        Ok(available) => available,
        Err(e) => {
            warn!("Encoder discovery could not run ({}); falling back to encoder listing", e);
            let listing = tokio::task::spawn_blocking(move || toolkit.list_encoders()).await;
            match listing {
                Ok(Ok(output)) => parse_encoder_listing(&output),
                Ok(Err(e)) => {
                    warn!("Encoder listing failed, using software encoders: {}", e);
                    BTreeSet::new()
                }
                Err(e) => {
                    warn!("Encoder listing worker failed, using software encoders: {}", e);
                    BTreeSet::new()
                }
            }
        }
    }
}
