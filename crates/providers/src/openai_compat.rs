//! OpenAI-compatible completion backend.
//!
//! Works with OpenAI, Perplexity, OpenRouter, Ollama, vLLM and any other
//! endpoint exposing `/chat/completions`. Requests are non-streaming; the
//! response's `usage` block is passed through so the context window can
//! make its eviction decision after the fact.

use async_trait::async_trait;
use kgagent_config::{CompletionConfig, TransportConfig};
use kgagent_core::error::BackendError;
use kgagent_core::message::{Role, TurnRecord};
use kgagent_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::transport;

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
    transport: TransportConfig,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        transport: &TransportConfig,
    ) -> Result<Self, BackendError> {
        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: transport::build_client(transport)?,
            transport: transport.clone(),
        })
    }

    /// Create an OpenAI provider with default transport settings.
    pub fn openai(api_key: impl Into<String>) -> Result<Self, BackendError> {
        Self::new(
            "openai",
            "https://api.openai.com/v1",
            api_key,
            &TransportConfig::default(),
        )
    }

    /// Build the completion backend from configuration.
    pub fn from_config(config: &CompletionConfig) -> Result<Self, BackendError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            BackendError::NotConfigured(
                "completion API key missing (set KGAGENT_API_KEY or OPENAI_API_KEY)".into(),
            )
        })?;
        Self::new("completion", &config.api_url, api_key, &config.transport)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Convert turn records to the OpenAI message format.
    fn to_api_messages(messages: &[TurnRecord]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().to_string(),
                content: m.content.clone(),
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
            "stream": false,
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }
        body
    }

    /// Decode a successful `/chat/completions` body.
    fn parse_response(body: &str) -> Result<ProviderResponse, BackendError> {
        let api_response: ApiResponse = serde_json::from_str(body)
            .map_err(|e| BackendError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::InvalidResponse("No choices in response".into()))?;

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ProviderResponse {
            message: TurnRecord::new(Role::Assistant, choice.message.content.unwrap_or_default()),
            usage,
            model: api_response.model,
        })
    }

    async fn send_once(&self, body: &serde_json::Value) -> Result<ProviderResponse, BackendError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(transport::map_send_error)?;

        let status = response.status().as_u16();
        let retry_after = transport::retry_after(&response);
        let text = response.text().await.map_err(transport::map_send_error)?;

        if !(200..300).contains(&status) {
            debug!(provider = %self.name, status, body = %text, "Provider returned error");
            return Err(transport::map_status(status, &text, retry_after));
        }

        Self::parse_response(&text)
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, BackendError> {
        let body = Self::request_body(&request);
        debug!(
            provider = %self.name,
            model = %request.model,
            messages = request.messages.len(),
            "Sending completion request"
        );
        transport::with_retries(&self.name, &self.transport, || self.send_once(&body)).await
    }

    async fn health_check(&self) -> Result<bool, BackendError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(transport::map_send_error)?;

        Ok(response.status().is_success())
    }
}

// --- OpenAI API types ---

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    total_tokens: u32,
}
