//! OpenAI Whisper API backend.

use super::TranscriptionStrategy;
use crate::error::{Result, VidpipeError};
use crate::openai::{classify_openai_error, create_client, is_api_key_configured};
use crate::stage::Strategy;
use async_openai::config::OpenAIConfig;
use async_openai::types::{AudioInput, AudioResponseFormat, CreateTranscriptionRequestArgs};
use async_openai::Client;
use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, instrument};

/// Transcribes through the OpenAI audio API.
pub struct WhisperApiTranscriber {
    client: Client<OpenAIConfig>,
    model: String,
    language: Option<String>,
    size_limit: u64,
}

impl WhisperApiTranscriber {
    pub fn new(model: &str, language: Option<String>, size_limit: u64) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            model: model.to_string(),
            language,
            size_limit,
        })
    }
}

impl Strategy for WhisperApiTranscriber {
    fn id(&self) -> &str {
        "openai"
    }
}

#[async_trait]
impl TranscriptionStrategy for WhisperApiTranscriber {
    #[instrument(skip(self), fields(audio_path = %audio_path.display()))]
    async fn transcribe(&self, audio_path: &Path) -> Result<String> {
        if !is_api_key_configured() {
            return Err(VidpipeError::StrategyUnavailable(
                "OPENAI_API_KEY is not set".into(),
            ));
        }

        debug!("Transcribing audio with {}", self.model);

        let file_bytes = tokio::fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("audio.mp3")
            .to_string();

        let mut request_builder = CreateTranscriptionRequestArgs::default();
        request_builder
            .file(AudioInput::from_vec_u8(file_name, file_bytes))
            .model(&self.model)
            .response_format(AudioResponseFormat::VerboseJson);

        if let Some(lang) = &self.language {
            request_builder.language(lang);
        }

        let request = request_builder
            .build()
            .map_err(|e| VidpipeError::Transcription(format!("Failed to build request: {}", e)))?;

        let response = self
            .client
            .audio()
            .transcribe_verbose_json(request)
            .await
            .map_err(|e| classify_openai_error("Whisper API", e))?;

        Ok(response.text.trim().to_string())
    }

    fn max_input_size_bytes(&self) -> Option<u64> {
        Some(self.size_limit)
    }
}
