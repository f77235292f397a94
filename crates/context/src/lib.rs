//! CiteForge Context Engine
//!
//! Grounded answer orchestration:
//! - Question decomposition into independent sub-questions
//! - Per sub-question retrieval cycles (expansion, search, verification,
//!   reranking, cited answer generation, sufficiency check)
//! - Budgeted refinement rounds driven by reported gaps
//! - Run-scoped citation numbering and final answer assembly
//!
//! Entry point is [`Engine`]: start a run, consume its [`ProgressEvent`]
//! stream, cancel it if needed.

pub mod aggregator;
pub mod assembler;
pub mod budget;
pub mod calls;
pub mod citations;
pub mod cycle;
pub mod decomposition;
pub mod engine;
pub mod events;
pub mod parsing;
pub mod planner;
pub mod prompts;
pub mod refinement;
pub mod run_config;
pub mod runner;

#[cfg(test)]
mod testing;

pub use engine::{Engine, RunHandle};
pub use events::ProgressEvent;
pub use planner::PlannerState;
pub use run_config::RunConfig;
