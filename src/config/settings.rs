//! Configuration settings for vidpipe.

use crate::error::{Result, VidpipeError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Accepted values for `general.log_level`.
const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub pipeline: PipelineSettings,
    pub download: DownloadSettings,
    pub transcription: TranscriptionSettings,
    pub summarization: SummarizationSettings,
    pub checkpoint: CheckpointSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Root directory for downloads, transcriptions and summaries.
    pub output_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            output_dir: "~/vidpipe".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Worker pool and retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Number of URLs processed at the same time.
    pub max_concurrency: usize,
    /// Attempts per strategy before falling back to the next one.
    pub max_retries: u32,
    /// Base delay for the linear backoff schedule.
    pub retry_base_delay_seconds: u64,
    /// Extra factor applied to the backoff wait after a rate-limit error.
    pub rate_limit_multiplier: u32,
    /// Whole-job runs before a URL is given up on.
    pub job_retries: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            max_retries: 3,
            retry_base_delay_seconds: 5,
            rate_limit_multiplier: 2,
            job_retries: 3,
        }
    }
}

impl PipelineSettings {
    /// Base backoff delay as a `Duration`.
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_secs(self.retry_base_delay_seconds)
    }
}

/// Download backend identifiers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum DownloadBackend {
    YtDlp,
    YoutubeDl,
    Direct,
}

impl std::str::FromStr for DownloadBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "yt-dlp" | "ytdlp" => Ok(DownloadBackend::YtDlp),
            "youtube-dl" | "youtubedl" => Ok(DownloadBackend::YoutubeDl),
            "direct" | "http" => Ok(DownloadBackend::Direct),
            _ => Err(format!("Unknown download backend: {}", s)),
        }
    }
}

impl std::fmt::Display for DownloadBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadBackend::YtDlp => write!(f, "yt-dlp"),
            DownloadBackend::YoutubeDl => write!(f, "youtube-dl"),
            DownloadBackend::Direct => write!(f, "direct"),
        }
    }
}

/// Download stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSettings {
    /// Backends in priority order.
    pub strategies: Vec<String>,
    /// Timeout for a single download attempt.
    pub timeout_seconds: u64,
}

impl Default for DownloadSettings {
    fn default() -> Self {
        Self {
            strategies: vec!["yt-dlp".into(), "youtube-dl".into(), "direct".into()],
            timeout_seconds: 600,
        }
    }
}

impl DownloadSettings {
    /// Parse the configured backend names.
    pub fn backends(&self) -> Result<Vec<DownloadBackend>> {
        parse_backends(&self.strategies)
    }
}

/// Transcription backend identifiers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptionBackend {
    /// OpenAI Whisper API.
    OpenAI,
    /// Local `whisper` command line tool.
    Local,
}

impl std::str::FromStr for TranscriptionBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "api" | "whisper-api" => Ok(TranscriptionBackend::OpenAI),
            "local" | "whisper" => Ok(TranscriptionBackend::Local),
            _ => Err(format!("Unknown transcription backend: {}", s)),
        }
    }
}

impl std::fmt::Display for TranscriptionBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TranscriptionBackend::OpenAI => write!(f, "openai"),
            TranscriptionBackend::Local => write!(f, "local"),
        }
    }
}

/// Transcription stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionSettings {
    /// Backends in priority order.
    pub strategies: Vec<String>,
    /// Model for the OpenAI backend.
    pub model: String,
    /// Model name passed to the local whisper tool.
    pub local_model: String,
    /// Optional language hint.
    pub language: Option<String>,
    /// Largest file the remote backend accepts (25 MiB for Whisper).
    pub transcription_size_limit_bytes: u64,
    /// Segment length used when a file must be split.
    pub segment_duration_seconds: u32,
    /// Segments transcribed at the same time.
    pub segment_worker_count: usize,
}

impl Default for TranscriptionSettings {
    fn default() -> Self {
        Self {
            strategies: vec!["openai".into(), "local".into()],
            model: "whisper-1".to_string(),
            local_model: "base".to_string(),
            language: None,
            transcription_size_limit_bytes: 26_214_400,
            segment_duration_seconds: 300,
            segment_worker_count: 3,
        }
    }
}

impl TranscriptionSettings {
    /// Parse the configured backend names.
    pub fn backends(&self) -> Result<Vec<TranscriptionBackend>> {
        parse_backends(&self.strategies)
    }
}

/// Summarization backend identifiers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SummarizationBackend {
    OpenAI,
    Anthropic,
}

impl std::str::FromStr for SummarizationBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "gpt" => Ok(SummarizationBackend::OpenAI),
            "anthropic" | "claude" => Ok(SummarizationBackend::Anthropic),
            _ => Err(format!("Unknown summarization backend: {}", s)),
        }
    }
}

impl std::fmt::Display for SummarizationBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SummarizationBackend::OpenAI => write!(f, "openai"),
            SummarizationBackend::Anthropic => write!(f, "anthropic"),
        }
    }
}

/// Summarization stage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizationSettings {
    /// Backends in priority order.
    pub strategies: Vec<String>,
    /// Chat model for the OpenAI backend.
    pub openai_model: String,
    /// Model for the Anthropic backend.
    pub anthropic_model: String,
    /// Response token budget.
    pub max_tokens: u32,
    /// Languages the summary is translated into after it is written.
    pub translate_to: Vec<String>,
    /// Directory with `summary.toml` / `translation.toml` prompt overrides.
    pub prompts_dir: Option<String>,
}

impl Default for SummarizationSettings {
    fn default() -> Self {
        Self {
            strategies: vec!["openai".into(), "anthropic".into()],
            openai_model: "gpt-4o-mini".to_string(),
            anthropic_model: "claude-3-5-haiku-latest".to_string(),
            max_tokens: 1000,
            translate_to: Vec::new(),
            prompts_dir: None,
        }
    }
}

impl SummarizationSettings {
    /// Parse the configured backend names.
    pub fn backends(&self) -> Result<Vec<SummarizationBackend>> {
        parse_backends(&self.strategies)
    }
}

/// Checkpoint store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointSettings {
    /// Path to the SQLite checkpoint database.
    pub path: String,
}

impl Default for CheckpointSettings {
    fn default() -> Self {
        Self {
            path: "~/vidpipe/checkpoints.db".to_string(),
        }
    }
}

fn parse_backends<T>(names: &[String]) -> Result<Vec<T>>
where
    T: std::str::FromStr<Err = String>,
{
    names
        .iter()
        .map(|name| name.parse::<T>().map_err(VidpipeError::Config))
        .collect()
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| VidpipeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vidpipe")
            .join("config.toml")
    }

    /// Check values that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.max_concurrency == 0 {
            return Err(VidpipeError::Config("pipeline.max_concurrency must be at least 1".into()));
        }
        if self.pipeline.max_retries == 0 {
            return Err(VidpipeError::Config("pipeline.max_retries must be at least 1".into()));
        }
        if self.pipeline.job_retries == 0 {
            return Err(VidpipeError::Config("pipeline.job_retries must be at least 1".into()));
        }
        if self.transcription.segment_worker_count == 0 {
            return Err(VidpipeError::Config(
                "transcription.segment_worker_count must be at least 1".into(),
            ));
        }
        if self.transcription.segment_duration_seconds == 0 {
            return Err(VidpipeError::Config(
                "transcription.segment_duration_seconds must be at least 1".into(),
            ));
        }
        if !LOG_LEVELS.contains(&self.general.log_level.to_ascii_lowercase().as_str()) {
            return Err(VidpipeError::Config(format!(
                "general.log_level must be one of {}",
                LOG_LEVELS.join(", ")
            )));
        }
        self.download.backends()?;
        self.transcription.backends()?;
        self.summarization.backends()?;
        Ok(())
    }

    /// Tracing filter for the crate: `-v` flags override the configured level.
    pub fn log_filter(&self, verbose: u8) -> String {
        let level = match verbose {
            0 => self.general.log_level.to_ascii_lowercase(),
            1 => "info".to_string(),
            2 => "debug".to_string(),
            _ => "trace".to_string(),
        };
        format!("vidpipe={}", level)
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    /// Get the expanded output directory path.
    pub fn output_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.output_dir)
    }

    /// Get the expanded checkpoint database path.
    pub fn checkpoint_path(&self) -> PathBuf {
        Self::expand_path(&self.checkpoint.path)
    }
}
