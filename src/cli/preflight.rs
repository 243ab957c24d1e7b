//! Pre-flight checks before a batch starts.
//!
//! A backend whose tool or key is missing only falls through to the next
//! one at run time, so a stage is reported as unusable here only when none
//! of its configured backends could possibly run.

use crate::config::{
    DownloadBackend, Settings, SummarizationBackend, TranscriptionBackend,
};
use crate::error::{Result, VidpipeError};
use std::process::Command;

/// Check that every stage has at least one backend that can run.
pub fn check(settings: &Settings) -> Result<()> {
    settings.validate()?;

    let download = settings.download.backends()?;
    if !download.iter().any(|b| download_ready(*b)) {
        return Err(VidpipeError::Config(format!(
            "No usable download backend among {:?}",
            settings.download.strategies
        )));
    }

    let transcription = settings.transcription.backends()?;
    if !transcription.iter().any(|b| transcription_ready(*b)) {
        return Err(VidpipeError::Config(format!(
            "No usable transcription backend among {:?}. Set OPENAI_API_KEY or install whisper.",
            settings.transcription.strategies
        )));
    }

    let summarization = settings.summarization.backends()?;
    if !summarization.iter().any(|b| summarization_ready(*b)) {
        return Err(VidpipeError::Config(format!(
            "No usable summarization backend among {:?}. Set OPENAI_API_KEY or ANTHROPIC_API_KEY.",
            settings.summarization.strategies
        )));
    }

    Ok(())
}

fn download_ready(backend: DownloadBackend) -> bool {
    match backend {
        DownloadBackend::YtDlp => tool_available("yt-dlp"),
        DownloadBackend::YoutubeDl => tool_available("youtube-dl"),
        DownloadBackend::Direct => true,
    }
}

fn transcription_ready(backend: TranscriptionBackend) -> bool {
    match backend {
        TranscriptionBackend::OpenAI => env_key_set("OPENAI_API_KEY"),
        TranscriptionBackend::Local => tool_available("whisper"),
    }
}

fn summarization_ready(backend: SummarizationBackend) -> bool {
    match backend {
        SummarizationBackend::OpenAI => env_key_set("OPENAI_API_KEY"),
        SummarizationBackend::Anthropic => env_key_set("ANTHROPIC_API_KEY"),
    }
}

/// Whether `name` is set to something non-empty.
pub fn env_key_set(name: &str) -> bool {
    std::env::var(name).is_ok_and(|v| !v.trim().is_empty())
}

/// Whether an external tool runs at all.
pub fn tool_available(name: &str) -> bool {
    Command::new(name)
        .arg(version_arg(name))
        .output()
        .is_ok_and(|output| output.status.success())
}

/// ffmpeg/ffprobe use -version (single dash), others use --version
pub fn version_arg(name: &str) -> &'static str {
    match name {
        "ffmpeg" | "ffprobe" => "-version",
        _ => "--version",
    }
}
