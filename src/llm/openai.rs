//! OpenAI chat completions client with strict JSON-schema output.

use super::{Generator, OutputSchema};
use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "Верни ТОЛЬКО валидный JSON. Без прозы. Без markdown. Без объяснений. Без блоков кода. Все тексты на русском языке.";

/// OpenAI client configuration
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    response_format: Value,
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

pub struct OpenAiClient {
    config: OpenAiConfig,
    http: Client,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { config, http })
    }
}

#[async_trait]
impl Generator for OpenAiClient {
    async fn generate(
        &self,
        prompt: &str,
        schema: &OutputSchema,
        temperature: f32,
    ) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: Some(SYSTEM_PROMPT.to_string()),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Some(prompt.to_string()),
                },
            ],
            response_format: schema.response_format(),
            temperature,
            top_p: 0.95,
        };

        debug!(
            "Requesting {} from {} (temperature {})",
            schema.name, self.config.model, temperature
        );

        let url = format!("{}/chat/completions", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Model API error: {} - {}", status, body);
            return Err(map_error_status(status.as_u16(), body));
        }

        let parsed: ChatResponse = response.json().await?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or(PipelineError::EmptyModelResponse)
    }
}

/// Quota, auth and billing failures get their own errors; anything else is
/// passed through with the provider's message.
pub fn map_error_status(status: u16, body: String) -> PipelineError {
    match status {
        429 => PipelineError::QuotaExceeded,
        401 => PipelineError::AuthFailed,
        402 => PipelineError::PaymentRequired,
        _ => PipelineError::Provider {
            status: Some(status),
            message: body,
        },
    }
}
