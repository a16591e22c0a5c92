//! Sampling parameters shared by every call of a run

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Model and sampling settings for one run.
///
/// Immutable for the duration of a run; the subject and counterpart calls of
/// a simulation share the same value and only differ in system prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Model identifier (e.g. "gpt-4o-mini")
    #[serde(default = "default_model")]
    pub model: String,

    /// Sampling temperature in [0, 1]
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Upper bound on reply length
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Nucleus sampling in [0, 1]
    #[serde(default = "default_top_p")]
    pub top_p: f32,

    /// Optional presence penalty in [-2, 2]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,

    /// Optional frequency penalty in [-2, 2]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    256
}

fn default_top_p() -> f32 {
    1.0
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            top_p: default_top_p(),
            presence_penalty: None,
            frequency_penalty: None,
        }
    }
}

impl GenerationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::Validation("model must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ConfigError::Validation(format!(
                "temperature must be within [0, 1], got {}",
                self.temperature
            )));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::Validation("max_tokens must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.top_p) {
            return Err(ConfigError::Validation(format!(
                "top_p must be within [0, 1], got {}",
                self.top_p
            )));
        }
        for (name, penalty) in [
            ("presence_penalty", self.presence_penalty),
            ("frequency_penalty", self.frequency_penalty),
        ] {
            if let Some(value) = penalty {
                if !(-2.0..=2.0).contains(&value) {
                    return Err(ConfigError::Validation(format!(
                        "{} must be within [-2, 2], got {}",
                        name, value
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = GenerationConfig::default();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.max_tokens, 256);
        assert_ok!(config.validate());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: GenerationConfig = serde_json::from_str(r#"{"model":"gpt-4o"}"#).unwrap();
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(config.top_p, 1.0);
        assert!(config.presence_penalty.is_none());
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let too_hot = GenerationConfig {
            temperature: 1.5,
            ..GenerationConfig::default()
        };
        assert_err!(too_hot.validate());

        let no_tokens = GenerationConfig {
            max_tokens: 0,
            ..GenerationConfig::default()
        };
        assert_err!(no_tokens.validate());

        let bad_penalty = GenerationConfig {
            frequency_penalty: Some(-3.0),
            ..GenerationConfig::default()
        };
        assert_err!(bad_penalty.validate());
    }
}
