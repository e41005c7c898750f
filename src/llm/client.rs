//! Text-generation client.
//!
//! The pipeline only needs "system instruction + user message in, text
//! out". `TextGenerator` is that contract; `AnthropicClient` implements it
//! over the Messages HTTP API.

use crate::config::LlmConfig;
use crate::llm::json::{extract_json, JsonExtractError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Text-generation failures.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API key is not set")]
    MissingApiKey,

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("cannot connect to {0}")]
    Connect(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("failed to parse API response: {0}")]
    Parse(String),

    #[error("response contained no text")]
    EmptyResponse,
}

/// Anything that turns a system instruction and a user message into text.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system: &str, user: &str) -> Result<String, LlmError>;
}

/// Outcome of a JSON-producing generation call.
#[derive(Debug, Error)]
pub enum GenerateJsonError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Json(#[from] JsonExtractError),
}

/// Generate and extract the single JSON object in the answer.
pub async fn generate_json(
    generator: &dyn TextGenerator,
    system: &str,
    user: &str,
) -> Result<Value, GenerateJsonError> {
    let raw = generator.generate(system, user).await?;
    Ok(extract_json(&raw)?)
}

/// Messages API request.
#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<RequestMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// Messages API response.
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

/// Client for the Anthropic Messages API.
///
/// The credential travels inside the client, so two runs with different
/// keys never share state.
pub struct AnthropicClient {
    http_client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    timeout_seconds: u64,
}

impl AnthropicClient {
    /// Build a client, failing early when no API key is configured.
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(LlmError::MissingApiKey)?
            .to_string();

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            timeout_seconds: config.timeout_seconds,
        })
    }
}

#[async_trait]
impl TextGenerator for AnthropicClient {
    async fn generate(&self, system: &str, user: &str) -> Result<String, LlmError> {
        let url = format!("{}/v1/messages", self.api_url);

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            system,
            messages: vec![RequestMessage {
                role: "user",
                content: user,
            }],
        };

        debug!(model = %self.model, prompt_chars = user.len(), "Sending generation request");

        let response = self
            .http_client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout_seconds)
                } else if e.is_connect() {
                    LlmError::Connect(self.api_url.clone())
                } else {
                    LlmError::Network(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, body });
        }

        let parsed: MessagesResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        text_of(parsed)
    }
}

/// Concatenate the text blocks of a response.
fn text_of(response: MessagesResponse) -> Result<String, LlmError> {
    let text: String = response
        .content
        .into_iter()
        .filter(|b| b.block_type == "text")
        .filter_map(|b| b.text)
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        Err(LlmError::EmptyResponse)
    } else {
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedGenerator;

    #[test]
    fn test_missing_api_key() {
        let config = LlmConfig::default();
        assert!(matches!(
            AnthropicClient::new(&config),
            Err(LlmError::MissingApiKey)
        ));

        let blank = LlmConfig {
            api_key: Some("   ".to_string()),
            ..LlmConfig::default()
        };
        assert!(matches!(
            AnthropicClient::new(&blank),
            Err(LlmError::MissingApiKey)
        ));
    }

    #[test]
    fn test_client_builds_with_key() {
        let config = LlmConfig {
            api_key: Some("sk-test".to_string()),
            ..LlmConfig::default()
        };
        assert!(AnthropicClient::new(&config).is_ok());
    }

    #[test]
    fn test_text_of_joins_text_blocks() {
        let response: MessagesResponse = serde_json::from_value(serde_json::json!({
            "content": [
                {"type": "text", "text": "{\"a\":"},
                {"type": "tool_use", "id": "x"},
                {"type": "text", "text": " 1}"}
            ]
        }))
        .unwrap();
        assert_eq!(text_of(response).unwrap(), "{\"a\": 1}");
    }

    #[test]
    fn test_text_of_empty() {
        let response = MessagesResponse { content: vec![] };
        assert!(matches!(text_of(response), Err(LlmError::EmptyResponse)));
    }

    #[tokio::test]
    async fn test_generate_json_reports_parse_error() {
        let generator = ScriptedGenerator::new(vec!["no json here"]);
        let err = generate_json(&generator, "sys", "user").await.unwrap_err();
        assert!(matches!(err, GenerateJsonError::Json(_)));
    }
}
