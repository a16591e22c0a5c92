//! Prompt sets loaded from TOML files
//!
//! A prompt set seeds a session with candidate system prompts and the
//! counterpart prompt used for simulated users.
//!
//! # Example Prompt File
//!
//! ```toml
//! [simulation]
//! prompt = "You are a curious student. Answer the tutor briefly."
//!
//! [[variants]]
//! name = "strict tutor"
//! content = "You are a quiz tutor. Reply with a JSON object ..."
//!
//! [[variants]]
//! content = "You are a friendly quiz tutor. Reply with a JSON object ..."
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

/// Variants and counterpart prompt read from a file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptSet {
    /// Counterpart settings
    #[serde(default)]
    pub simulation: SimulationPrompt,

    /// Candidate system prompts, in file order
    #[serde(default)]
    pub variants: Vec<PromptVariantEntry>,
}

/// Counterpart system prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationPrompt {
    #[serde(default = "default_simulation_prompt")]
    pub prompt: String,
}

fn default_simulation_prompt() -> String {
    builtin::SIMULATED_USER.to_string()
}

impl Default for SimulationPrompt {
    fn default() -> Self {
        Self {
            prompt: default_simulation_prompt(),
        }
    }
}

/// One candidate system prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptVariantEntry {
    /// Optional label, only used for logging
    #[serde(default)]
    pub name: Option<String>,

    pub content: String,
}

impl PromptSet {
    /// Load a prompt set from a file path
    pub async fn load_from_file(path: &Path) -> Result<Self, PromptError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| PromptError::IoError(e.to_string()))?;

        Self::parse(&content)
    }

    /// Parse a prompt set from TOML text
    pub fn parse(content: &str) -> Result<Self, PromptError> {
        let set: PromptSet =
            toml::from_str(content).map_err(|e| PromptError::ParseError(e.to_string()))?;

        if let Some(idx) = set.variants.iter().position(|v| v.content.trim().is_empty()) {
            return Err(PromptError::EmptyVariant(idx));
        }

        Ok(set)
    }

    /// Variant texts in file order
    pub fn variant_texts(&self) -> Vec<String> {
        self.variants.iter().map(|v| v.content.clone()).collect()
    }
}

/// Errors from prompt loading
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Prompt variant {0} has no content")]
    EmptyVariant(usize),
}

/// Built-in prompts that don't require files
pub mod builtin {
    /// Default prompt under test for a new session
    pub const DEFAULT_VARIANT: &str = "You are a helpful AI assistant.";

    /// Default counterpart prompt for a new session
    pub const SIMULATED_USER: &str = "You are playing the role of a simulated user.";
}
