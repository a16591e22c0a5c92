//! Application configuration

pub mod generation;
pub mod prompts;

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use generation::GenerationConfig;
pub use prompts::{builtin as prompts_builtin, PromptError, PromptSet};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Backend used for every completion call: "openai", "groq", "local", "ollama"
    pub provider: String,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub openai_organization: Option<String>,
    pub groq_api_key: Option<String>,
    pub ollama_url: Option<String>,
    /// Upper bound for a single completion call
    pub request_timeout_secs: u64,
    /// Optional TOML prompt set used to seed new sessions
    pub prompts_path: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".into()),
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            provider: env::var("PROMPTBENCH_PROVIDER").unwrap_or_else(|_| "openai".into()),
            openai_api_key: env::var("OPENAI_API_KEY").ok(),
            openai_base_url: env::var("OPENAI_BASE_URL").ok(),
            openai_organization: env::var("OPENAI_ORGANIZATION").ok(),
            groq_api_key: env::var("GROQ_API_KEY").ok(),
            ollama_url: env::var("OLLAMA_URL").ok(),
            request_timeout_secs: env::var("PROMPTBENCH_TIMEOUT_SECS")
                .ok()
                .and_then(|t| t.parse().ok())
                .unwrap_or(120),
            prompts_path: env::var("PROMPTBENCH_PROMPTS").ok().map(PathBuf::from),
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Validation error: {0}")]
    Validation(String),
}
