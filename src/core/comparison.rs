//! Single-turn comparisons
//!
//! Two flavours:
//! - prompt comparison: every selected variant answers the same user message,
//!   repeated for a number of iterations
//! - model arena: one system prompt, two independently configured models,
//!   repeated for a number of rounds
//!
//! Unlike the simulation, a failing call never stops the run; the failure is
//! recorded on its entry instead.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::GenerationConfig;
use crate::conversation::Message;
use crate::providers::CompletionRequest;

use super::engine::{BenchEngine, RunError};
use super::reply::StructuredReply;

/// Maximum comparison iterations per request
pub const MAX_ITERATIONS: u32 = 10;

/// Maximum arena rounds per request
pub const MAX_ROUNDS: u32 = 30;

/// Result of one call in a comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReplyOutcome {
    Ok { content: String },
    Failed { error: String },
}

#[cfg(test)]
impl ReplyOutcome {
    pub fn content(&self) -> Option<&str> {
        match self {
            ReplyOutcome::Ok { content } => Some(content),
            ReplyOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComparisonRequest {
    pub prompt_variants: Vec<String>,
    pub selected: Vec<usize>,
    pub user_message: String,
    pub generation: GenerationConfig,
    pub iterations: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonEntry {
    pub iteration: u32,
    pub prompt_variant_index: usize,
    /// Variant text at the time of the call
    pub prompt: String,
    pub user_message: String,
    pub response: ReplyOutcome,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArenaRequest {
    pub system_prompt: String,
    pub user_message: String,
    #[serde(default)]
    pub model_a: GenerationConfig,
    #[serde(default)]
    pub model_b: GenerationConfig,
    #[serde(default = "default_rounds")]
    pub rounds: u32,
}

fn default_rounds() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArenaRound {
    pub round: u32,
    pub model_a_response: ReplyOutcome,
    pub model_b_response: ReplyOutcome,
}

/// Both model configurations of an arena run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArenaSettings {
    pub model_a: GenerationConfig,
    pub model_b: GenerationConfig,
}

/// Arena rounds together with the settings that produced them
#[derive(Debug, Clone, Serialize)]
pub struct ArenaReport {
    pub exported_at: DateTime<Utc>,
    /// Suggested name if the client saves the document
    pub file_name: String,
    pub system_prompt: String,
    pub user_input: String,
    pub settings: ArenaSettings,
    pub results: Vec<ArenaRound>,
}

impl ArenaReport {
    pub fn new(request: ArenaRequest, results: Vec<ArenaRound>) -> Self {
        let exported_at = Utc::now();
        Self {
            exported_at,
            file_name: format!("test_results_{}.json", exported_at.format("%Y%m%d_%H%M%S")),
            system_prompt: request.system_prompt,
            user_input: request.user_message,
            settings: ArenaSettings {
                model_a: request.model_a,
                model_b: request.model_b,
            },
            results,
        }
    }
}

fn check_repeats(name: &str, value: u32, max: u32) -> Result<(), RunError> {
    if value == 0 || value > max {
        return Err(RunError::Configuration(format!(
            "{} must be within 1..={}, got {}",
            name, max, value
        )));
    }
    Ok(())
}

fn check_user_message(message: &str) -> Result<(), RunError> {
    if message.trim().is_empty() {
        return Err(RunError::Configuration(
            "user message must not be empty".into(),
        ));
    }
    Ok(())
}

impl ComparisonRequest {
    pub fn validate(&self) -> Result<(), RunError> {
        if self.selected.is_empty() {
            return Err(RunError::Configuration(
                "no prompt variants to compare".into(),
            ));
        }
        if let Some(idx) = self
            .selected
            .iter()
            .find(|&&idx| idx >= self.prompt_variants.len())
        {
            return Err(RunError::Configuration(format!(
                "prompt variant {} does not exist",
                idx
            )));
        }
        check_user_message(&self.user_message)?;
        check_repeats("iterations", self.iterations, MAX_ITERATIONS)?;
        self.generation.validate()?;
        Ok(())
    }
}

impl ArenaRequest {
    pub fn validate(&self) -> Result<(), RunError> {
        check_user_message(&self.user_message)?;
        check_repeats("rounds", self.rounds, MAX_ROUNDS)?;
        self.model_a.validate()?;
        self.model_b.validate()?;
        Ok(())
    }
}

impl BenchEngine {
    /// Ask every selected variant for a structured reply to one user message.
    pub async fn compare(
        &self,
        request: &ComparisonRequest,
    ) -> Result<Vec<ComparisonEntry>, RunError> {
        request.validate()?;

        tracing::info!(
            variants = request.selected.len(),
            iterations = request.iterations,
            "starting prompt comparison"
        );

        let history = [Message::user(request.user_message.as_str())];
        let mut entries = Vec::new();

        for iteration in 1..=request.iterations {
            for &idx in &request.selected {
                let call = CompletionRequest::new(
                    request.prompt_variants[idx].as_str(),
                    &history,
                    &request.generation,
                )
                .structured();

                let response = match self.call(&call).await {
                    Ok(raw) => match StructuredReply::parse(&raw) {
                        Ok(reply) => ReplyOutcome::Ok {
                            content: reply.message,
                        },
                        Err(e) => ReplyOutcome::Failed {
                            error: e.to_string(),
                        },
                    },
                    Err(e) => ReplyOutcome::Failed {
                        error: e.to_string(),
                    },
                };

                if let ReplyOutcome::Failed { ref error } = response {
                    tracing::warn!(variant = idx, iteration, %error, "comparison call failed");
                }

                entries.push(ComparisonEntry {
                    iteration,
                    prompt_variant_index: idx,
                    prompt: request.prompt_variants[idx].clone(),
                    user_message: request.user_message.clone(),
                    response,
                });
            }
        }

        Ok(entries)
    }

    /// Send the same prompt to two model configurations, round after round.
    pub async fn arena(&self, request: &ArenaRequest) -> Result<Vec<ArenaRound>, RunError> {
        request.validate()?;

        tracing::info!(
            model_a = %request.model_a.model,
            model_b = %request.model_b.model,
            rounds = request.rounds,
            "starting model arena"
        );

        let history = [Message::user(request.user_message.as_str())];
        let mut rounds = Vec::with_capacity(request.rounds as usize);

        for round in 1..=request.rounds {
            let model_a_response = self
                .plain_reply(&request.system_prompt, &history, &request.model_a)
                .await;
            let model_b_response = self
                .plain_reply(&request.system_prompt, &history, &request.model_b)
                .await;

            rounds.push(ArenaRound {
                round,
                model_a_response,
                model_b_response,
            });
        }

        Ok(rounds)
    }

    async fn plain_reply(
        &self,
        system_prompt: &str,
        history: &[Message],
        generation: &GenerationConfig,
    ) -> ReplyOutcome {
        let call = CompletionRequest::new(system_prompt, history, generation);
        match self.call(&call).await {
            Ok(content) => ReplyOutcome::Ok { content },
            Err(e) => {
                tracing::warn!(model = %generation.model, error = %e, "arena call failed");
                ReplyOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::engine::testing::*;
    use super::*;

    fn comparison(selected: Vec<usize>, iterations: u32) -> ComparisonRequest {
        ComparisonRequest {
            prompt_variants: vec!["A".into(), "B".into()],
            selected,
            user_message: "What is Rust?".into(),
            generation: GenerationConfig::default(),
            iterations,
        }
    }

    #[tokio::test]
    async fn test_compare_orders_by_iteration_then_variant() {
        let service = Arc::new(
            ScriptedService::new()
                .script("A", vec![reply(r#"{"message":"a1"}"#), reply(r#"{"message":"a2"}"#)])
                .script("B", vec![reply(r#"{"message":"b1"}"#), reply("plain")]),
        );
        let engine = engine(service.clone());

        let entries = engine.compare(&comparison(vec![0, 1], 2)).await.unwrap();

        let summary: Vec<_> = entries
            .iter()
            .map(|e| (e.iteration, e.prompt_variant_index, e.response.content()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (1, 0, Some("a1")),
                (1, 1, Some("b1")),
                (2, 0, Some("a2")),
                (2, 1, None),
            ]
        );
        assert!(matches!(entries[3].response, ReplyOutcome::Failed { .. }));
        assert_eq!(entries[1].prompt, "B");

        let calls = service.calls.lock().unwrap();
        assert!(calls.iter().all(|c| c.structured_output));
        assert!(calls
            .iter()
            .all(|c| c.messages == vec![Message::user("What is Rust?")]));
    }

    #[tokio::test]
    async fn test_compare_rejects_bad_input() {
        let engine = engine(Arc::new(ScriptedService::new()));

        assert!(engine.compare(&comparison(vec![], 1)).await.is_err());
        assert!(engine.compare(&comparison(vec![5], 1)).await.is_err());
        assert!(engine.compare(&comparison(vec![0], 0)).await.is_err());
        assert!(engine
            .compare(&comparison(vec![0], MAX_ITERATIONS + 1))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_arena_records_failures_per_side() {
        let service = Arc::new(
            ScriptedService::new().script("judge", vec![reply("A says hi"), fail("quota exceeded")]),
        );
        let engine = engine(service.clone());
        let request = ArenaRequest {
            system_prompt: "judge".into(),
            user_message: "hello".into(),
            model_a: GenerationConfig::default(),
            model_b: GenerationConfig {
                model: "gpt-4o".into(),
                ..GenerationConfig::default()
            },
            rounds: 1,
        };

        let rounds = engine.arena(&request).await.unwrap();

        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].model_a_response.content(), Some("A says hi"));
        assert!(matches!(
            rounds[0].model_b_response,
            ReplyOutcome::Failed { ref error } if error.contains("quota exceeded")
        ));

        let calls = service.calls.lock().unwrap();
        assert_eq!(calls[0].generation.model, "gpt-4o-mini");
        assert_eq!(calls[1].generation.model, "gpt-4o");
        assert!(!calls[0].structured_output);
    }

    #[test]
    fn test_arena_report_keeps_both_settings() {
        let request = ArenaRequest {
            system_prompt: "judge".into(),
            user_message: "hello".into(),
            model_a: GenerationConfig::default(),
            model_b: GenerationConfig {
                model: "gpt-4o".into(),
                presence_penalty: Some(0.5),
                ..GenerationConfig::default()
            },
            rounds: 1,
        };
        let rounds = vec![ArenaRound {
            round: 1,
            model_a_response: ReplyOutcome::Ok {
                content: "a".into(),
            },
            model_b_response: ReplyOutcome::Failed {
                error: "timeout".into(),
            },
        }];

        let report = ArenaReport::new(request, rounds);
        assert!(report.file_name.starts_with("test_results_"));
        assert!(report.file_name.ends_with(".json"));

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["system_prompt"], "judge");
        assert_eq!(json["user_input"], "hello");
        assert_eq!(json["settings"]["model_a"]["model"], "gpt-4o-mini");
        assert_eq!(json["settings"]["model_b"]["model"], "gpt-4o");
        assert_eq!(json["settings"]["model_b"]["presence_penalty"], 0.5);
        assert_eq!(json["results"][0]["model_b_response"]["status"], "failed");
    }

    #[test]
    fn test_arena_request_defaults() {
        let request: ArenaRequest =
            serde_json::from_str(r#"{"system_prompt":"s","user_message":"u"}"#).unwrap();
        assert_eq!(request.rounds, 1);
        assert_eq!(request.model_a, GenerationConfig::default());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_reply_outcome_serialization() {
        let ok = serde_json::to_value(ReplyOutcome::Ok {
            content: "hi".into(),
        })
        .unwrap();
        assert_eq!(ok, serde_json::json!({"status": "ok", "content": "hi"}));
    }
}
