//! Multi-turn conversation simulation
//!
//! For every selected prompt variant the driver alternates between:
//! 1. the *subject* (the variant under test), asked for a structured reply
//! 2. the *counterpart* (a simulated user driven by the simulation prompt)
//!
//! Each variant works on its own copy of the base transcript, so variants
//! never see each other's turns. Variants run concurrently; outcomes come
//! back in selection order.

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::config::GenerationConfig;
use crate::conversation::{Message, Transcript};
use crate::providers::CompletionRequest;

use super::engine::{BenchEngine, RunError};
use super::reply::StructuredReply;

/// Inputs of one simulation run
#[derive(Debug, Clone)]
pub struct SimulationRequest {
    /// All known variants; indices are stable
    pub prompt_variants: Vec<String>,
    /// Indices into `prompt_variants`, in the order results are reported
    pub selected: Vec<usize>,
    /// System prompt of the counterpart
    pub simulation_prompt: String,
    pub generation: GenerationConfig,
    /// Maximum number of (subject, counterpart) pairs per variant
    pub turn_limit: u32,
    /// History every variant starts from
    pub base_transcript: Transcript,
}

/// Transcript produced while testing one variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub prompt_variant_index: usize,
    pub transcript: Vec<Message>,
}

/// Which side of a turn a call belonged to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Subject,
    Counterpart,
}

/// Why a variant's turn loop was cut short
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VariantError {
    #[error("{speaker:?} call failed on turn {turn}: {message}")]
    Transport {
        turn: u32,
        speaker: Speaker,
        message: String,
    },

    #[error("subject reply on turn {turn} could not be parsed: {message}")]
    ResponseParse {
        turn: u32,
        message: String,
        raw: String,
    },
}

/// Best-effort result for one variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantOutcome {
    #[serde(flatten)]
    pub result: SimulationResult,
    /// Turns whose subject and counterpart calls both finished
    pub turns_completed: u32,
    /// The subject reported `is_end` before the turn limit ran out
    pub ended_by_subject: bool,
    /// Turns whose counterpart reply was kept as raw text
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded_turns: Vec<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<VariantError>,
}

impl VariantOutcome {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

impl SimulationRequest {
    pub fn validate(&self) -> Result<(), RunError> {
        if self.selected.is_empty() {
            return Err(RunError::Configuration(
                "at least one prompt variant must be selected".into(),
            ));
        }
        for (pos, &idx) in self.selected.iter().enumerate() {
            if idx >= self.prompt_variants.len() {
                return Err(RunError::Configuration(format!(
                    "prompt variant {} does not exist ({} known)",
                    idx,
                    self.prompt_variants.len()
                )));
            }
            if self.selected[..pos].contains(&idx) {
                return Err(RunError::Configuration(format!(
                    "prompt variant {} selected twice",
                    idx
                )));
            }
        }
        if self.turn_limit == 0 {
            return Err(RunError::Configuration(
                "turn limit must be at least 1".into(),
            ));
        }
        self.generation.validate()?;
        Ok(())
    }
}

impl BenchEngine {
    /// Simulate every selected variant and return one outcome per variant.
    pub async fn simulate(
        &self,
        request: &SimulationRequest,
    ) -> Result<Vec<VariantOutcome>, RunError> {
        request.validate()?;

        tracing::info!(
            variants = request.selected.len(),
            turn_limit = request.turn_limit,
            model = %request.generation.model,
            "starting simulation"
        );

        let runs = request
            .selected
            .iter()
            .map(|&idx| self.simulate_variant(idx, request));

        // join_all keeps input order regardless of completion order
        let outcomes = join_all(runs).await;

        let failed = outcomes.iter().filter(|o| !o.is_complete()).count();
        tracing::info!(
            variants = outcomes.len(),
            failed,
            "simulation finished"
        );

        Ok(outcomes)
    }

    async fn simulate_variant(&self, index: usize, request: &SimulationRequest) -> VariantOutcome {
        let subject_prompt = &request.prompt_variants[index];
        let mut transcript = request.base_transcript.clone();
        let mut turns_completed = 0;
        let mut ended_by_subject = false;
        let mut degraded_turns = Vec::new();
        let mut error = None;

        for turn in 1..=request.turn_limit {
            let subject_call = CompletionRequest::new(
                subject_prompt.as_str(),
                transcript.messages(),
                &request.generation,
            )
            .structured();

            let raw = match self.call(&subject_call).await {
                Ok(raw) => raw,
                Err(e) => {
                    error = Some(VariantError::Transport {
                        turn,
                        speaker: Speaker::Subject,
                        message: e.to_string(),
                    });
                    break;
                }
            };

            let subject = match StructuredReply::parse(&raw) {
                Ok(reply) => reply,
                Err(e) => {
                    error = Some(VariantError::ResponseParse {
                        turn,
                        message: e.to_string(),
                        raw,
                    });
                    break;
                }
            };

            transcript.add_assistant(&subject.message);

            let counterpart_call = CompletionRequest::new(
                request.simulation_prompt.as_str(),
                transcript.messages(),
                &request.generation,
            );

            let raw = match self.call(&counterpart_call).await {
                Ok(raw) => raw,
                Err(e) => {
                    error = Some(VariantError::Transport {
                        turn,
                        speaker: Speaker::Counterpart,
                        message: e.to_string(),
                    });
                    break;
                }
            };

            match StructuredReply::parse(&raw) {
                Ok(reply) => transcript.add_assistant(&reply.message),
                Err(e) => {
                    tracing::debug!(variant = index, turn, error = %e, "keeping raw counterpart reply");
                    degraded_turns.push(turn);
                    transcript.add_assistant(&raw);
                }
            }

            turns_completed = turn;

            if subject.is_end {
                ended_by_subject = true;
                break;
            }
        }

        if let Some(ref e) = error {
            tracing::warn!(variant = index, error = %e, "variant run cut short");
        }

        VariantOutcome {
            result: SimulationResult {
                prompt_variant_index: index,
                transcript: transcript.messages().to_vec(),
            },
            turns_completed,
            ended_by_subject,
            degraded_turns,
            error,
        }
    }
}
