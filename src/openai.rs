//! OpenAI client configuration and error mapping.

use crate::error::{Result, VidpipeError};
use async_openai::{config::OpenAIConfig, error::OpenAIError, Client};
use std::time::Duration;

/// Default timeout for OpenAI API requests (5 minutes).
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Create an OpenAI client with the default timeout.
pub fn create_client() -> Result<Client<OpenAIConfig>> {
    create_client_with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
}

/// Create an OpenAI client with a custom timeout.
pub fn create_client_with_timeout(timeout: Duration) -> Result<Client<OpenAIConfig>> {
    let http_client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Client::with_config(OpenAIConfig::default()).with_http_client(http_client))
}

/// Whether `OPENAI_API_KEY` is set to something non-empty.
pub fn is_api_key_configured() -> bool {
    std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.trim().is_empty())
}

/// Map an OpenAI error onto the retry taxonomy.
pub fn classify_openai_error(context: &str, err: OpenAIError) -> VidpipeError {
    match err {
        OpenAIError::ApiError(api) => {
            let kind = api.r#type.clone().unwrap_or_default();
            classify_api_message(context, &kind, &api.message)
        }
        other => VidpipeError::OpenAI(format!("{}: {}", context, other)),
    }
}

fn classify_api_message(context: &str, kind: &str, message: &str) -> VidpipeError {
    let msg = format!("{}: {}", context, message);
    let kind = kind.to_lowercase();
    let lower = message.to_lowercase();

    if kind.contains("authentication")
        || kind == "invalid_api_key"
        || lower.contains("api key")
        || lower.contains("authentication")
    {
        VidpipeError::Authentication(msg)
    } else if kind.contains("rate_limit")
        || kind == "insufficient_quota"
        || lower.contains("rate limit")
    {
        VidpipeError::RateLimited(msg)
    } else {
        VidpipeError::OpenAI(msg)
    }
}
