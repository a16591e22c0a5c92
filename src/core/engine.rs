//! Completion engine shared by every runner
//!
//! Wraps a [`CompletionService`] with the per-call timeout so simulation,
//! comparison, arena and chat all treat a slow backend the same way.

use std::sync::Arc;
use std::time::Duration;

use crate::config::ConfigError;
use crate::providers::{CompletionRequest, CompletionService, ProviderError};

/// Run-scoped errors raised before any call is sent
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<ConfigError> for RunError {
    fn from(err: ConfigError) -> Self {
        RunError::Configuration(err.to_string())
    }
}

pub struct BenchEngine {
    service: Arc<dyn CompletionService>,
    call_timeout: Duration,
}

impl BenchEngine {
    pub fn new(service: Arc<dyn CompletionService>, call_timeout: Duration) -> Self {
        Self {
            service,
            call_timeout,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        self.service.provider_name()
    }

    /// Issue one completion call. An expired timeout is reported as
    /// [`ProviderError::Timeout`], a transport failure like any other.
    pub async fn call(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        tracing::trace!(
            provider = self.service.provider_name(),
            model = %request.generation.model,
            messages = request.messages.len(),
            structured = request.structured_output,
            "completion call"
        );

        match tokio::time::timeout(self.call_timeout, self.service.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.call_timeout)),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::config::GenerationConfig;

    #[tokio::test]
    async fn test_call_returns_reply() {
        let service = Arc::new(ScriptedService::new().script("sys", vec![reply("hello")]));
        let engine = engine(service.clone());
        let request = CompletionRequest::new("sys", &[], &GenerationConfig::default());

        let text = engine.call(&request).await.unwrap();
        assert_eq!(text, "hello");
        assert_eq!(service.calls_for("sys"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_times_out() {
        let service = Arc::new(ScriptedService::new().script("sys", vec![Scripted::Hang]));
        let engine = BenchEngine::new(service, Duration::from_secs(2));
        let request = CompletionRequest::new("sys", &[], &GenerationConfig::default());

        let err = engine.call(&request).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(d) if d == Duration::from_secs(2)));
    }
}
