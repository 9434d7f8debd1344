//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Locations of the external media toolkit binaries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
    /// Player used for previews
    #[serde(default = "default_ffplay")]
    pub ffplay: PathBuf,
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_ffplay() -> PathBuf {
    PathBuf::from("ffplay")
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
            ffplay: default_ffplay(),
        }
    }
}

/// Folder discovery and state tracking
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScanConfig {
    /// Language codes or names preferred when auto-selecting tracks
    #[serde(default = "default_preferred_languages")]
    pub preferred_languages: Vec<String>,
    /// Name of the per-folder state file
    #[serde(default = "default_state_file_name")]
    pub state_file_name: String,
    /// Suffix of the sibling output directory (`<folder><suffix>`)
    #[serde(default = "default_output_suffix")]
    pub output_suffix: String,
}

fn default_preferred_languages() -> Vec<String> {
    vec!["jpn".to_string(), "japanese".to_string()]
}

fn default_state_file_name() -> String {
    "burn_state.json".to_string()
}

fn default_output_suffix() -> String {
    "-burned".to_string()
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            preferred_languages: default_preferred_languages(),
            state_file_name: default_state_file_name(),
            output_suffix: default_output_suffix(),
        }
    }
}

/// Encoder probing and output settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncodeConfig {
    /// Upper bound for a single trial encode during capability discovery
    #[serde(default = "default_trial_timeout_secs")]
    pub trial_timeout_secs: u64,
    /// Container extension of burned outputs
    #[serde(default = "default_container")]
    pub container: String,
    /// Value passed to `-hwaccel` for decoding (None disables the flag)
    #[serde(default = "default_hwaccel")]
    pub hwaccel: Option<String>,
}

fn default_trial_timeout_secs() -> u64 {
    4
}

fn default_container() -> String {
    "mp4".to_string()
}

fn default_hwaccel() -> Option<String> {
    Some("auto".to_string())
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            trial_timeout_secs: default_trial_timeout_secs(),
            container: default_container(),
            hwaccel: default_hwaccel(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub encode: EncodeConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing optional fields fall back to their defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// - BATCHBURN_FFMPEG -> tools.ffmpeg
    /// - BATCHBURN_FFPROBE -> tools.ffprobe
    /// - BATCHBURN_FFPLAY -> tools.ffplay
    /// - BATCHBURN_PREFERRED_LANGUAGES -> scan.preferred_languages (comma separated)
    /// - BATCHBURN_TRIAL_TIMEOUT_SECS -> encode.trial_timeout_secs
    /// - BATCHBURN_CONTAINER -> encode.container
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("BATCHBURN_FFMPEG") {
            if !val.is_empty() {
                self.tools.ffmpeg = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("BATCHBURN_FFPROBE") {
            if !val.is_empty() {
                self.tools.ffprobe = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("BATCHBURN_FFPLAY") {
            if !val.is_empty() {
                self.tools.ffplay = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("BATCHBURN_PREFERRED_LANGUAGES") {
            let languages: Vec<String> = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !languages.is_empty() {
                self.scan.preferred_languages = languages;
            }
        }

        if let Ok(val) = env::var("BATCHBURN_TRIAL_TIMEOUT_SECS") {
            if let Ok(secs) = val.parse::<u64>() {
                self.encode.trial_timeout_secs = secs;
            }
        }

        if let Ok(val) = env::var("BATCHBURN_CONTAINER") {
            let container = val.trim().trim_start_matches('.');
            if !container.is_empty() {
                self.encode.container = container.to_string();
            }
        }
    }

    /// Load configuration from file and apply environment overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Like [`Config::load`]; with no path, defaults plus environment overrides.
    /// An explicit path must exist.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => Self::load(p),
            None => {
                let mut config = Self::default();
                config.apply_env_overrides();
                Ok(config)
            }
        }
    }
}
