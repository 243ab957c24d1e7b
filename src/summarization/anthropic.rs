//! Anthropic messages API backend.

use super::SummarizationStrategy;
use crate::config::Prompts;
use crate::error::{Result, VidpipeError};
use crate::stage::Strategy;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

const MESSAGES_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

/// Summarizes and translates with a Claude model.
pub struct AnthropicSummarizer {
    client: Client,
    model: String,
    max_tokens: u32,
    prompts: Arc<Prompts>,
}

impl AnthropicSummarizer {
    pub fn new(model: &str, max_tokens: u32, prompts: Arc<Prompts>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(300)).build()?;
        Ok(Self {
            client,
            model: model.to_string(),
            max_tokens,
            prompts,
        })
    }

    fn api_key() -> Result<String> {
        std::env::var("ANTHROPIC_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| VidpipeError::StrategyUnavailable("ANTHROPIC_API_KEY is not set".into()))
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let api_key = Self::api_key()?;

        let mut headers = HeaderMap::new();
        headers.insert(
            "x-api-key",
            HeaderValue::from_str(api_key.trim())
                .map_err(|_| VidpipeError::Authentication("Invalid Anthropic API key".into()))?,
        );
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let body = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages: vec![Message {
                role: "user",
                content: vec![ContentBlock { kind: "text", text: user }],
            }],
        };

        let resp = self
            .client
            .post(MESSAGES_URL)
            .headers(headers)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(status_error(status, &text));
        }

        let parsed: MessagesResponse = resp.json().await?;
        let answer = parsed
            .content
            .into_iter()
            .filter_map(|block| match block {
                ResponseBlock::Text { text } => Some(text),
                ResponseBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        if answer.trim().is_empty() {
            return Err(VidpipeError::Summarization(
                "Anthropic response missing text content".into(),
            ));
        }

        debug!("Model returned {} characters", answer.len());
        Ok(answer.trim().to_string())
    }
}

fn status_error(status: StatusCode, body: &str) -> VidpipeError {
    let msg = format!("Anthropic returned {}: {}", status, body);
    match status.as_u16() {
        401 | 403 => VidpipeError::Authentication(msg),
        429 => VidpipeError::RateLimited(msg),
        _ => VidpipeError::Summarization(msg),
    }
}

impl Strategy for AnthropicSummarizer {
    fn id(&self) -> &str {
        "anthropic"
    }
}

#[async_trait]
impl SummarizationStrategy for AnthropicSummarizer {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn summarize(&self, text: &str) -> Result<String> {
        let user = self.prompts.summary_request(text);
        self.complete(&self.prompts.summary.system, &user).await
    }

    #[instrument(skip(self, text), fields(model = %self.model))]
    async fn translate(&self, text: &str, language: &str) -> Result<String> {
        let user = self.prompts.translation_request(text, language);
        self.complete(&self.prompts.translation.system, &user).await
    }
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: Vec<ContentBlock<'a>>,
}

#[derive(Serialize)]
struct ContentBlock<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    #[serde(other)]
    Other,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;

    #[test]
    fn test_status_classification() {
        assert_eq!(
            status_error(StatusCode::UNAUTHORIZED, "invalid x-api-key").class(),
            ErrorClass::Authentication
        );
        assert_eq!(
            status_error(StatusCode::TOO_MANY_REQUESTS, "rate_limit_error").class(),
            ErrorClass::RateLimited
        );
        assert_eq!(
            status_error(StatusCode::SERVICE_UNAVAILABLE, "overloaded").class(),
            ErrorClass::Transient
        );
    }

    #[test]
    fn test_parse_response_blocks() {
        let json = r#"{
            "content": [
                {"type": "text", "text": "First"},
                {"type": "tool_use", "id": "x", "name": "y", "input": {}},
                {"type": "text", "text": "Second"}
            ]
        }"#;
        let parsed: MessagesResponse = serde_json::from_str(json).unwrap();
        let texts: Vec<_> = parsed
            .content
            .into_iter()
            .filter_map(|b| match b {
                ResponseBlock::Text { text } => Some(text),
                ResponseBlock::Other => None,
            })
            .collect();
        assert_eq!(texts, vec!["First", "Second"]);
    }

    #[test]
    fn test_request_shape() {
        let body = MessagesRequest {
            model: "claude-3-5-haiku-latest",
            max_tokens: 1000,
            system: "Be brief.",
            messages: vec![Message {
                role: "user",
                content: vec![ContentBlock { kind: "text", text: "hi" }],
            }],
        };
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["system"], "Be brief.");
        assert_eq!(value["messages"][0]["content"][0]["type"], "text");
    }
}
