//! Error types for vidpipe.

use serde::Serialize;
use thiserror::Error;

/// Library-level error type for vidpipe operations.
#[derive(Error, Debug)]
pub enum VidpipeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Input missing: {0}")]
    InputMissing(String),

    #[error("Strategy unavailable: {0}")]
    StrategyUnavailable(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Input too large for strategy: {size} bytes exceeds limit of {limit} bytes")]
    OutputTooLarge { size: u64, limit: u64 },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Summarization failed: {0}")]
    Summarization(String),

    #[error("Checkpoint store error: {0}")]
    Checkpoint(String),

    #[error("Artifact store error: {0}")]
    Artifact(String),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("External tool failed: {0}")]
    ToolFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// How the retry policy and stage executor treat an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Network or service hiccup; retried with the normal schedule.
    Transient,
    /// Retried, but only after an elevated wait.
    RateLimited,
    /// Credentials rejected. Aborts the whole stage.
    Authentication,
    /// The strategy cannot run at all; fall back without spending retries.
    Unavailable,
    /// The input exceeds the strategy's size limit; skip the strategy.
    TooLarge,
    /// The stage input does not exist. Fatal for the stage.
    InputMissing,
    /// The batch was cancelled.
    Cancelled,
}

impl ErrorClass {
    /// Whether another attempt of the same strategy may succeed.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorClass::Transient | ErrorClass::RateLimited)
    }
}

impl VidpipeError {
    /// Classify this error for retry and fallback decisions.
    pub fn class(&self) -> ErrorClass {
        match self {
            VidpipeError::Authentication(_) => ErrorClass::Authentication,
            VidpipeError::RateLimited(_) => ErrorClass::RateLimited,
            VidpipeError::StrategyUnavailable(_)
            | VidpipeError::ToolNotFound(_)
            | VidpipeError::Config(_)
            | VidpipeError::InvalidInput(_) => ErrorClass::Unavailable,
            VidpipeError::OutputTooLarge { .. } => ErrorClass::TooLarge,
            VidpipeError::InputMissing(_) => ErrorClass::InputMissing,
            VidpipeError::Cancelled => ErrorClass::Cancelled,
            VidpipeError::Http(e) => match e.status().map(|s| s.as_u16()) {
                Some(401) | Some(403) => ErrorClass::Authentication,
                Some(429) => ErrorClass::RateLimited,
                _ => ErrorClass::Transient,
            },
            _ => ErrorClass::Transient,
        }
    }
}

/// Result type alias for vidpipe operations.
pub type Result<T> = std::result::Result<T, VidpipeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(
            VidpipeError::Authentication("bad key".into()).class(),
            ErrorClass::Authentication
        );
        assert_eq!(
            VidpipeError::RateLimited("slow down".into()).class(),
            ErrorClass::RateLimited
        );
        assert_eq!(
            VidpipeError::ToolNotFound("yt-dlp".into()).class(),
            ErrorClass::Unavailable
        );
        assert_eq!(
            VidpipeError::OutputTooLarge { size: 30, limit: 25 }.class(),
            ErrorClass::TooLarge
        );
        assert_eq!(
            VidpipeError::Download("connection reset".into()).class(),
            ErrorClass::Transient
        );
        assert!(ErrorClass::RateLimited.is_retryable());
        assert!(!ErrorClass::InputMissing.is_retryable());
    }
}
