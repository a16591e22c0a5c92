//! Ollama provider implementation

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{CompletionRequest, CompletionService, ProviderError};

pub struct OllamaProvider {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
    num_predict: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    message: OllamaMessage,
}

impl From<&CompletionRequest> for OllamaRequest {
    fn from(request: &CompletionRequest) -> Self {
        let messages = std::iter::once(OllamaMessage {
            role: "system".to_string(),
            content: request.system_message.clone(),
        })
        .chain(request.messages.iter().map(|m| OllamaMessage {
            role: m.role.as_str().to_string(),
            content: m.content.clone(),
        }))
        .collect();

        let generation = &request.generation;
        Self {
            model: generation.model.clone(),
            messages,
            stream: false,
            format: request.structured_output.then_some("json"),
            options: OllamaOptions {
                temperature: generation.temperature,
                top_p: generation.top_p,
                num_predict: generation.max_tokens,
                presence_penalty: generation.presence_penalty,
                frequency_penalty: generation.frequency_penalty,
            },
        }
    }
}

impl OllamaProvider {
    pub fn new(base_url: String, timeout_secs: u64) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl CompletionService for OllamaProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let body = OllamaRequest::from(request);

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url.trim_end_matches('/')))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::InvalidResponse(format!(
                "{}: {}",
                status, body
            )));
        }

        let ollama_response: OllamaResponse = response.json().await?;

        Ok(ollama_response.message.content)
    }

    fn provider_name(&self) -> &'static str {
        "ollama"
    }
}
