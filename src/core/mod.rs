//! Core prompt testing engine
//!
//! This module contains the orchestration logic: the multi-turn simulation
//! driver, single-turn comparisons and structured reply parsing.

mod comparison;
mod engine;
mod reply;
mod simulation;

pub use comparison::{ArenaReport, ArenaRequest, ComparisonEntry, ComparisonRequest};
pub use engine::{BenchEngine, RunError};
pub use simulation::{SimulationRequest, VariantOutcome};

#[cfg(test)]
pub(crate) use comparison::ReplyOutcome;
#[cfg(test)]
pub(crate) use engine::testing;
