//! Fallback search backend over a chat-completion API.
//!
//! Perplexity's online models answer from live web search but speak the
//! OpenAI chat protocol, so the search backend is a thin adapter around any
//! [`Provider`] with its own model and temperature.

use std::sync::Arc;

use async_trait::async_trait;
use kgagent_config::SearchConfig;
use kgagent_core::error::BackendError;
use kgagent_core::message::TurnRecord;
use kgagent_core::provider::{Provider, ProviderRequest};
use kgagent_core::search::SearchBackend;
use tracing::debug;

use crate::openai_compat::OpenAiCompatProvider;

/// A [`SearchBackend`] that forwards the message sequence to a chat model.
pub struct ChatSearchBackend {
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
}

impl ChatSearchBackend {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            provider,
            model: model.into(),
            temperature,
        }
    }

    /// Build the search backend from configuration.
    pub fn from_config(config: &SearchConfig) -> Result<Self, BackendError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            BackendError::NotConfigured("search API key missing (set PERPLEXITY_API_KEY)".into())
        })?;
        let provider =
            OpenAiCompatProvider::new("search", &config.api_url, api_key, &config.transport)?;
        Ok(Self::new(Arc::new(provider), &config.model, config.temperature))
    }
}

#[async_trait]
impl SearchBackend for ChatSearchBackend {
    fn name(&self) -> &str {
        self.provider.name()
    }

    async fn search(&self, messages: Vec<TurnRecord>) -> Result<String, BackendError> {
        debug!(backend = %self.provider.name(), model = %self.model, "Fallback search");
        let request =
            ProviderRequest::new(&self.model, messages).with_temperature(self.temperature);
        let response = self.provider.complete(request).await?;
        Ok(response.message.content)
    }
}
