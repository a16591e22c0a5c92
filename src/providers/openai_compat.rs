//! OpenAI-compatible provider
//!
//! Works with any API that implements the OpenAI chat completions format:
//! - OpenAI (api.openai.com)
//! - Groq (api.groq.com)
//! - vLLM (local server)
//! - LM Studio (local server)
//! - LocalAI (local server)
//!
//! Structured output is requested through `response_format`
//! (`{"type": "json_object"}`), which these servers treat as a hint.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::conversation::Message;

use super::{CompletionRequest, CompletionService, ProviderError};

/// OpenAI-compatible chat message
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

impl ChatMessage {
    fn system(content: &str) -> Self {
        Self {
            role: "system".to_string(),
            content: content.to_string(),
        }
    }
}

impl From<&Message> for ChatMessage {
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role.as_str().to_string(),
            content: msg.content.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

/// Chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

impl From<&CompletionRequest> for ChatCompletionRequest {
    fn from(request: &CompletionRequest) -> Self {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(ChatMessage::system(&request.system_message));
        messages.extend(request.messages.iter().map(ChatMessage::from));

        let generation = &request.generation;
        Self {
            model: generation.model.clone(),
            messages,
            temperature: generation.temperature,
            max_tokens: generation.max_tokens,
            top_p: generation.top_p,
            presence_penalty: generation.presence_penalty,
            frequency_penalty: generation.frequency_penalty,
            response_format: request.structured_output.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        }
    }
}

/// Chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

/// Error response from API
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// OpenAI-compatible provider configuration
#[derive(Debug, Clone)]
pub struct OpenAICompatConfig {
    /// Base URL for the API (e.g., https://api.openai.com/v1)
    pub base_url: String,
    /// API key (optional for local servers)
    pub api_key: Option<String>,
    /// Optional organization ID (OpenAI)
    pub organization: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for OpenAICompatConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            organization: None,
            timeout_secs: 120,
        }
    }
}

impl OpenAICompatConfig {
    /// Create config for OpenAI
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Self::default()
        }
    }

    /// Create config for Groq
    pub fn groq(api_key: impl Into<String>) -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".to_string(),
            api_key: Some(api_key.into()),
            organization: None,
            timeout_secs: 60,
        }
    }

    /// Create config for a local server (vLLM, LM Studio, etc.)
    pub fn local(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            organization: None,
            timeout_secs: 300, // Local inference can be slower
        }
    }
}

/// OpenAI-compatible API provider
pub struct OpenAICompatProvider {
    config: OpenAICompatConfig,
    client: Client,
}

impl OpenAICompatProvider {
    /// Create a new provider with the given configuration
    pub fn new(config: OpenAICompatConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl CompletionService for OpenAICompatProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let url = self.endpoint();
        let body = ChatCompletionRequest::from(request);

        let mut req_builder = self.client.post(&url);

        if let Some(ref api_key) = self.config.api_key {
            req_builder = req_builder.bearer_auth(api_key);
        }

        if let Some(ref org) = self.config.organization {
            req_builder = req_builder.header("OpenAI-Organization", org);
        }

        let response = req_builder.json(&body).send().await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            if let Ok(error_resp) = serde_json::from_str::<ErrorResponse>(&text) {
                return Err(ProviderError::InvalidResponse(format!(
                    "API error ({}): {}",
                    status, error_resp.error.message
                )));
            }
            return Err(ProviderError::InvalidResponse(format!(
                "HTTP {}: {}",
                status, text
            )));
        }

        let completion: ChatCompletionResponse = serde_json::from_str(&text).map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse response: {} - Body: {}", e, text))
        })?;

        if let Some(ref usage) = completion.usage {
            tracing::debug!(
                model = %body.model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "completion finished"
            );
        }

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("No choices in response".to_string()))?;

        if choice.finish_reason.as_deref() == Some("length") {
            tracing::warn!(model = %body.model, "reply truncated by max_tokens");
        }

        Ok(choice.message.content.unwrap_or_default())
    }

    fn provider_name(&self) -> &'static str {
        "openai_compat"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;

    #[test]
    fn test_config_presets() {
        let openai = OpenAICompatConfig::openai("test-key");
        assert!(openai.base_url.contains("openai.com"));
        assert_eq!(openai.api_key, Some("test-key".to_string()));

        let groq = OpenAICompatConfig::groq("groq-key");
        assert!(groq.base_url.contains("groq.com"));

        let local = OpenAICompatConfig::local("http://localhost:8000/v1");
        assert!(local.api_key.is_none());
        assert_eq!(local.timeout_secs, 300);
    }

    #[test]
    fn test_request_prepends_system_message() {
        let messages = vec![Message::user("Hello"), Message::assistant("Hi")];
        let request = CompletionRequest::new("You are terse.", &messages, &GenerationConfig::default());
        let body = ChatCompletionRequest::from(&request);

        assert_eq!(body.messages.len(), 3);
        assert_eq!(body.messages[0].role, "system");
        assert_eq!(body.messages[0].content, "You are terse.");
        assert_eq!(body.messages[2].role, "assistant");
    }

    #[test]
    fn test_response_format_only_when_structured() {
        let generation = GenerationConfig::default();
        let plain = CompletionRequest::new("s", &[], &generation);
        let json = serde_json::to_value(ChatCompletionRequest::from(&plain)).unwrap();
        assert!(json.get("response_format").is_none());
        assert!(json.get("presence_penalty").is_none());

        let structured = plain.structured();
        let json = serde_json::to_value(ChatCompletionRequest::from(&structured)).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
        assert_eq!(json["max_tokens"], 256);
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let provider =
            OpenAICompatProvider::new(OpenAICompatConfig::local("http://localhost:8000/v1/")).unwrap();
        assert_eq!(provider.endpoint(), "http://localhost:8000/v1/chat/completions");
    }
}
