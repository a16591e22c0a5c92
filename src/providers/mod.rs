//! AI provider integrations
//!
//! Every backend implements [`CompletionService`], the only boundary the
//! simulation, comparison and arena runners depend on.

mod ollama;
mod openai_compat;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{Config, GenerationConfig};
use crate::conversation::Message;

pub use ollama::OllamaProvider;
pub use openai_compat::{OpenAICompatConfig, OpenAICompatProvider};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
}

/// A single chat completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_message: String,
    pub messages: Vec<Message>,
    pub generation: GenerationConfig,
    /// Ask the backend for a JSON object reply. A hint only; callers must
    /// still parse defensively.
    pub structured_output: bool,
}

impl CompletionRequest {
    pub fn new(
        system_message: impl Into<String>,
        messages: &[Message],
        generation: &GenerationConfig,
    ) -> Self {
        Self {
            system_message: system_message.into(),
            messages: messages.to_vec(),
            generation: generation.clone(),
            structured_output: false,
        }
    }

    pub fn structured(mut self) -> Self {
        self.structured_output = true;
        self
    }
}

/// A chat completion backend returning the raw reply text.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError>;

    fn provider_name(&self) -> &'static str;
}

pub enum Provider {
    OpenAICompat(OpenAICompatProvider),
    Ollama(OllamaProvider),
}

impl Provider {
    pub fn from_name(name: &str, config: &Config) -> Result<Self, ProviderError> {
        match name.to_lowercase().as_str() {
            "openai" => {
                let api_key = config
                    .openai_api_key
                    .clone()
                    .ok_or_else(|| ProviderError::NotConfigured("OPENAI_API_KEY".into()))?;
                let mut compat = OpenAICompatConfig::openai(api_key);
                if let Some(ref base_url) = config.openai_base_url {
                    compat.base_url = base_url.clone();
                }
                compat.organization = config.openai_organization.clone();
                compat.timeout_secs = config.request_timeout_secs;
                Ok(Provider::OpenAICompat(OpenAICompatProvider::new(compat)?))
            }
            "groq" => {
                let api_key = config
                    .groq_api_key
                    .clone()
                    .ok_or_else(|| ProviderError::NotConfigured("GROQ_API_KEY".into()))?;
                let mut compat = OpenAICompatConfig::groq(api_key);
                compat.timeout_secs = config.request_timeout_secs;
                Ok(Provider::OpenAICompat(OpenAICompatProvider::new(compat)?))
            }
            "local" => {
                let base_url = config
                    .openai_base_url
                    .clone()
                    .ok_or_else(|| ProviderError::NotConfigured("OPENAI_BASE_URL".into()))?;
                let mut compat = OpenAICompatConfig::local(base_url);
                compat.api_key = config.openai_api_key.clone();
                compat.timeout_secs = config.request_timeout_secs;
                Ok(Provider::OpenAICompat(OpenAICompatProvider::new(compat)?))
            }
            "ollama" => {
                let url = config
                    .ollama_url
                    .clone()
                    .unwrap_or_else(|| "http://localhost:11434".into());
                Ok(Provider::Ollama(OllamaProvider::new(
                    url,
                    config.request_timeout_secs,
                )?))
            }
            _ => Err(ProviderError::UnknownProvider(name.to_string())),
        }
    }
}

#[async_trait]
impl CompletionService for Provider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        match self {
            Provider::OpenAICompat(p) => p.complete(request).await,
            Provider::Ollama(p) => p.complete(request).await,
        }
    }

    fn provider_name(&self) -> &'static str {
        match self {
            Provider::OpenAICompat(_) => "openai_compat",
            Provider::Ollama(_) => "ollama",
        }
    }
}
