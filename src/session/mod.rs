//! Interactive test sessions
//!
//! A session is the explicit context a client works in: the prompt variants
//! under test, which of them are selected, the counterpart prompt, the
//! shared transcript and the sampling settings. Runners receive a snapshot
//! of it; they never touch the stored session directly.

mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{prompts_builtin, ConfigError, GenerationConfig, PromptSet};
use crate::conversation::{Message, Transcript};
use crate::core::{ComparisonEntry, ComparisonRequest, RunError, SimulationRequest, VariantOutcome};
use crate::providers::ProviderError;

pub use store::{ChatOutcome, SessionStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    /// Candidate system prompts; only ever appended to
    pub prompt_variants: Vec<String>,
    /// Selected variant indices in selection order
    pub selected: Vec<usize>,
    pub simulation_prompt: String,
    pub transcript: Transcript,
    pub generation: GenerationConfig,
    pub turn_limit: u32,
    /// Outcomes of the most recent simulation, replaced on every run
    #[serde(default)]
    pub last_simulation: Vec<VariantOutcome>,
    /// Comparison entries of every run since the last reset
    #[serde(default)]
    pub comparison_results: Vec<ComparisonEntry>,
    /// Iteration count of the most recent comparison
    #[serde(default = "default_iterations")]
    pub comparison_iterations: u32,
    pub created_at: DateTime<Utc>,
}

fn default_iterations() -> u32 {
    1
}

/// Optional seed values when creating a session
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSession {
    #[serde(default)]
    pub prompt_variants: Option<Vec<String>>,
    #[serde(default)]
    pub simulation_prompt: Option<String>,
    #[serde(default)]
    pub generation: Option<GenerationConfig>,
    #[serde(default)]
    pub turn_limit: Option<u32>,
}

/// Partial settings update
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    #[serde(default)]
    pub simulation_prompt: Option<String>,
    #[serde(default)]
    pub generation: Option<GenerationConfig>,
    #[serde(default)]
    pub turn_limit: Option<u32>,
}

/// JSON snapshot of a session handed back to the client
#[derive(Debug, Clone, Serialize)]
pub struct SessionExport {
    pub session_id: Uuid,
    pub exported_at: DateTime<Utc>,
    /// Suggested name if the client saves the document
    pub file_name: String,
    pub prompt_variants: Vec<String>,
    pub simulation_prompt: String,
    /// Texts of the selected variants, in selection order
    pub selected_prompts: Vec<String>,
    pub messages: Vec<Message>,
    #[serde(flatten)]
    pub generation: GenerationConfig,
    pub turn_limit: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub simulation_results: Vec<VariantOutcome>,
}

/// Accumulated comparison results handed back to the client
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonExport {
    pub session_id: Uuid,
    pub exported_at: DateTime<Utc>,
    pub file_name: String,
    #[serde(flatten)]
    pub generation: GenerationConfig,
    pub num_iterations: u32,
    pub tests: Vec<ComparisonEntry>,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid request: {0}")]
    Invalid(String),

    #[error(transparent)]
    Run(#[from] RunError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

impl From<ConfigError> for SessionError {
    fn from(err: ConfigError) -> Self {
        SessionError::Invalid(err.to_string())
    }
}

impl Session {
    /// Create a session, seeded from a prompt set when one is configured
    pub fn new(seed: Option<&PromptSet>) -> Self {
        let (prompt_variants, simulation_prompt) = match seed {
            Some(set) if !set.variants.is_empty() => {
                (set.variant_texts(), set.simulation.prompt.clone())
            }
            Some(set) => (
                vec![prompts_builtin::DEFAULT_VARIANT.to_string()],
                set.simulation.prompt.clone(),
            ),
            None => (
                vec![prompts_builtin::DEFAULT_VARIANT.to_string()],
                prompts_builtin::SIMULATED_USER.to_string(),
            ),
        };

        Self {
            id: Uuid::new_v4(),
            prompt_variants,
            selected: Vec::new(),
            simulation_prompt,
            transcript: Transcript::new(),
            generation: GenerationConfig::default(),
            turn_limit: 1,
            last_simulation: Vec::new(),
            comparison_results: Vec::new(),
            comparison_iterations: default_iterations(),
            created_at: Utc::now(),
        }
    }

    /// Apply client-supplied seed values
    pub fn apply(&mut self, init: NewSession) -> Result<(), SessionError> {
        if let Some(variants) = init.prompt_variants {
            if variants.is_empty() {
                return Err(SessionError::Invalid(
                    "prompt_variants must not be empty".into(),
                ));
            }
            self.prompt_variants.clear();
            for variant in variants {
                self.add_variant(variant)?;
            }
        }
        self.update_settings(SettingsUpdate {
            simulation_prompt: init.simulation_prompt,
            generation: init.generation,
            turn_limit: init.turn_limit,
        })
    }

    /// Append a prompt variant and return its stable index
    pub fn add_variant(&mut self, content: String) -> Result<usize, SessionError> {
        if content.trim().is_empty() {
            return Err(SessionError::Invalid("prompt variant must not be empty".into()));
        }
        self.prompt_variants.push(content);
        Ok(self.prompt_variants.len() - 1)
    }

    /// Replace the selection, keeping first-seen order and dropping repeats
    pub fn set_selection(&mut self, indices: Vec<usize>) -> Result<(), SessionError> {
        let mut selected = Vec::with_capacity(indices.len());
        for idx in indices {
            if idx >= self.prompt_variants.len() {
                return Err(SessionError::Invalid(format!(
                    "prompt variant {} does not exist",
                    idx
                )));
            }
            if !selected.contains(&idx) {
                selected.push(idx);
            }
        }
        self.selected = selected;
        Ok(())
    }

    pub fn update_settings(&mut self, update: SettingsUpdate) -> Result<(), SessionError> {
        if let Some(generation) = update.generation {
            generation.validate()?;
            self.generation = generation;
        }
        if let Some(turn_limit) = update.turn_limit {
            if turn_limit == 0 {
                return Err(SessionError::Invalid("turn_limit must be at least 1".into()));
            }
            self.turn_limit = turn_limit;
        }
        if let Some(prompt) = update.simulation_prompt {
            self.simulation_prompt = prompt;
        }
        Ok(())
    }

    pub fn add_message(&mut self, message: Message) -> Result<(), SessionError> {
        if message.content.trim().is_empty() {
            return Err(SessionError::Invalid("message content must not be empty".into()));
        }
        self.transcript.push(message);
        Ok(())
    }

    /// Clear the transcript and every stored result
    pub fn reset(&mut self) {
        self.transcript.clear();
        self.last_simulation.clear();
        self.comparison_results.clear();
    }

    pub fn simulation_request(&self) -> SimulationRequest {
        SimulationRequest {
            prompt_variants: self.prompt_variants.clone(),
            selected: self.selected.clone(),
            simulation_prompt: self.simulation_prompt.clone(),
            generation: self.generation.clone(),
            turn_limit: self.turn_limit,
            base_transcript: self.transcript.clone(),
        }
    }

    /// Compares the selection, or every variant when nothing is selected
    pub fn comparison_request(&self, user_message: String, iterations: u32) -> ComparisonRequest {
        let selected = if self.selected.is_empty() {
            (0..self.prompt_variants.len()).collect()
        } else {
            self.selected.clone()
        };

        ComparisonRequest {
            prompt_variants: self.prompt_variants.clone(),
            selected,
            user_message,
            generation: self.generation.clone(),
            iterations,
        }
    }

    /// System prompt for plain chat: the first selected variant, else the first variant
    pub fn chat_prompt(&self) -> &str {
        let idx = self.selected.first().copied().unwrap_or(0);
        self.prompt_variants
            .get(idx)
            .map(String::as_str)
            .unwrap_or(prompts_builtin::DEFAULT_VARIANT)
    }

    pub fn export(&self) -> SessionExport {
        let exported_at = Utc::now();
        SessionExport {
            session_id: self.id,
            exported_at,
            file_name: format!("chat_history_{}.json", exported_at.format("%Y%m%d_%H%M%S")),
            prompt_variants: self.prompt_variants.clone(),
            simulation_prompt: self.simulation_prompt.clone(),
            selected_prompts: self
                .selected
                .iter()
                .map(|&idx| self.prompt_variants[idx].clone())
                .collect(),
            messages: self.transcript.messages().to_vec(),
            generation: self.generation.clone(),
            turn_limit: self.turn_limit,
            simulation_results: self.last_simulation.clone(),
        }
    }

    /// Store the entries of a comparison run after the earlier ones
    pub fn record_comparison(&mut self, entries: &[ComparisonEntry], iterations: u32) {
        self.comparison_results.extend_from_slice(entries);
        self.comparison_iterations = iterations;
    }

    pub fn comparison_export(&self) -> ComparisonExport {
        let exported_at = Utc::now();
        ComparisonExport {
            session_id: self.id,
            exported_at,
            file_name: format!(
                "prompt_test_results_{}.json",
                exported_at.format("%Y%m%d_%H%M%S")
            ),
            generation: self.generation.clone(),
            num_iterations: self.comparison_iterations,
            tests: self.comparison_results.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ReplyOutcome;

    #[test]
    fn test_new_session_defaults() {
        let session = Session::new(None);
        assert_eq!(session.prompt_variants, vec![prompts_builtin::DEFAULT_VARIANT]);
        assert_eq!(session.simulation_prompt, prompts_builtin::SIMULATED_USER);
        assert_eq!(session.turn_limit, 1);
        assert!(session.selected.is_empty());
        assert!(session.transcript.is_empty());
    }

    #[test]
    fn test_seeded_from_prompt_set() {
        let set = PromptSet::parse(
            r#"
[simulation]
prompt = "student"

[[variants]]
content = "tutor one"

[[variants]]
content = "tutor two"
"#,
        )
        .unwrap();
        let session = Session::new(Some(&set));
        assert_eq!(session.prompt_variants, vec!["tutor one", "tutor two"]);
        assert_eq!(session.simulation_prompt, "student");
    }

    #[test]
    fn test_variant_indices_are_stable() {
        let mut session = Session::new(None);
        assert_eq!(session.add_variant("second".into()).unwrap(), 1);
        assert_eq!(session.add_variant("third".into()).unwrap(), 2);
        session.set_selection(vec![2]).unwrap();
        session.set_selection(vec![]).unwrap();
        assert_eq!(session.prompt_variants[2], "third");
        assert!(session.add_variant("  ".into()).is_err());
    }

    #[test]
    fn test_selection_dedups_in_order() {
        let mut session = Session::new(None);
        session.add_variant("b".into()).unwrap();
        session.add_variant("c".into()).unwrap();

        session.set_selection(vec![2, 0, 2, 1, 0]).unwrap();
        assert_eq!(session.selected, vec![2, 0, 1]);

        let err = session.set_selection(vec![0, 7]).unwrap_err();
        assert!(matches!(err, SessionError::Invalid(_)));
        assert_eq!(session.selected, vec![2, 0, 1]);
    }

    #[test]
    fn test_settings_validation() {
        let mut session = Session::new(None);
        let err = session
            .update_settings(SettingsUpdate {
                turn_limit: Some(0),
                ..SettingsUpdate::default()
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::Invalid(_)));

        session
            .update_settings(SettingsUpdate {
                simulation_prompt: Some("impatient user".into()),
                turn_limit: Some(4),
                generation: Some(GenerationConfig {
                    model: "gpt-4o".into(),
                    ..GenerationConfig::default()
                }),
            })
            .unwrap();
        assert_eq!(session.turn_limit, 4);
        assert_eq!(session.simulation_prompt, "impatient user");
        assert_eq!(session.generation.model, "gpt-4o");
    }

    #[test]
    fn test_reset_clears_transcript() {
        let mut session = Session::new(None);
        session.add_message(Message::user("hello")).unwrap();
        session.reset();
        assert!(session.transcript.is_empty());
        assert_eq!(session.prompt_variants.len(), 1);
    }

    #[test]
    fn test_comparison_falls_back_to_all_variants() {
        let mut session = Session::new(None);
        session.add_variant("b".into()).unwrap();
        let request = session.comparison_request("hi".into(), 1);
        assert_eq!(request.selected, vec![0, 1]);

        session.set_selection(vec![1]).unwrap();
        let request = session.comparison_request("hi".into(), 1);
        assert_eq!(request.selected, vec![1]);
        assert_eq!(session.chat_prompt(), "b");
    }

    #[test]
    fn test_comparison_export_accumulates_runs() {
        let entry = |iteration, text: &str| ComparisonEntry {
            iteration,
            prompt_variant_index: 0,
            prompt: prompts_builtin::DEFAULT_VARIANT.into(),
            user_message: text.into(),
            response: ReplyOutcome::Ok {
                content: format!("re: {text}"),
            },
        };

        let mut session = Session::new(None);
        session.record_comparison(&[entry(1, "a")], 1);
        session.record_comparison(&[entry(1, "b"), entry(2, "b")], 2);

        let export = session.comparison_export();
        assert_eq!(export.tests.len(), 3);
        assert_eq!(export.tests[0].user_message, "a");
        assert_eq!(export.num_iterations, 2);
        assert!(export.file_name.starts_with("prompt_test_results_"));

        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["tests"][2]["iteration"], 2);

        session.reset();
        assert!(session.comparison_export().tests.is_empty());
    }

    #[test]
    fn test_export_snapshot() {
        let mut session = Session::new(None);
        session.add_variant("second".into()).unwrap();
        session.set_selection(vec![1]).unwrap();
        session.add_message(Message::user("hi")).unwrap();

        let export = session.export();
        assert!(export.file_name.starts_with("chat_history_"));
        assert!(export.file_name.ends_with(".json"));
        assert_eq!(export.selected_prompts, vec!["second"]);

        let json = serde_json::to_value(&export).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["content"], "hi");
        assert!(json.get("simulation_results").is_none());
    }
}
