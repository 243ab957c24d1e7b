//! Local `whisper` command line backend.

use super::TranscriptionStrategy;
use crate::audio::spawn_error;
use crate::error::{Result, VidpipeError};
use crate::stage::Strategy;
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, instrument};

/// Runs the openai-whisper CLI on the local machine.
pub struct LocalWhisperTranscriber {
    model: String,
    language: Option<String>,
}

impl LocalWhisperTranscriber {
    pub fn new(model: &str, language: Option<String>) -> Self {
        Self {
            model: model.to_string(),
            language,
        }
    }
}

impl Strategy for LocalWhisperTranscriber {
    fn id(&self) -> &str {
        "local"
    }
}

#[async_trait]
impl TranscriptionStrategy for LocalWhisperTranscriber {
    #[instrument(skip(self), fields(audio_path = %audio_path.display(), model = %self.model))]
    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        let out_dir = tempfile::tempdir()?;

        let mut cmd = Command::new("whisper");
        cmd.arg(audio_path)
            .arg("--model").arg(&self.model)
            .arg("--output_format").arg("txt")
            .arg("--output_dir").arg(out_dir.path())
            .arg("--verbose").arg("False");
        if let Some(lang) = &self.language {
            cmd.arg("--language").arg(lang);
        }

        let output = cmd
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| spawn_error("whisper", e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VidpipeError::Transcription(format!(
                "whisper failed: {}",
                stderr.trim()
            )));
        }

        let stem = audio_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("audio");
        let transcript_path = out_dir.path().join(format!("{}.txt", stem));

        let text = tokio::fs::read_to_string(&transcript_path).await.map_err(|e| {
            VidpipeError::Transcription(format!("whisper wrote no transcript: {}", e))
        })?;

        debug!("Local transcript has {} characters", text.len());
        Ok(text.trim().to_string())
    }
}
