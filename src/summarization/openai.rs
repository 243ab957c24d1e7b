//! OpenAI chat completions backend.

use super::SummarizationStrategy;
use crate::config::Prompts;
use crate::error::{Result, VidpipeError};
use crate::openai::{classify_openai_error, create_client, is_api_key_configured};
use crate::stage::Strategy;
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Summarizes and translates with an OpenAI chat model.
pub struct OpenAISummarizer {
    client: Client<OpenAIConfig>,
    model: String,
    max_tokens: u32,
    prompts: Arc<Prompts>,
}

impl OpenAISummarizer {
    pub fn new(model: &str, max_tokens: u32, prompts: Arc<Prompts>) -> Result<Self> {
        Ok(Self {
            client: create_client()?,
            model: model.to_string(),
            max_tokens,
            prompts,
        })
    }

    async fn complete(&self, system: &str, user: String) -> Result<String> {
        if !is_api_key_configured() {
            return Err(VidpipeError::StrategyUnavailable(
                "OPENAI_API_KEY is not set".into(),
            ));
        }

        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system.to_string())
                .build()
                .map_err(|e| VidpipeError::Summarization(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user)
                .build()
                .map_err(|e| VidpipeError::Summarization(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(0.3)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(|e| VidpipeError::Summarization(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| classify_openai_error("Chat completion", e))?;

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| VidpipeError::Summarization("Empty response from model".into()))?;

        debug!("Model returned {} characters", content.len());
        Ok(content)
    }
}

impl Strategy for OpenAISummarizer {
    fn id(&self) -> &str {
        "openai"
    }
}

#[async_trait]
impl SummarizationStrategy for OpenAISummarizer {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn summarize(&self, text: &str) -> Result<String> {
        self.complete(&self.prompts.summary.system, self.prompts.summary_request(text))
            .await
    }

    #[instrument(skip(self, text), fields(model = %self.model))]
    async fn translate(&self, text: &str, language: &str) -> Result<String> {
        self.complete(
            &self.prompts.translation.system,
            self.prompts.translation_request(text, language),
        )
        .await
    }
}
