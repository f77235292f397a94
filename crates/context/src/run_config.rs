//! Per-run configuration

use citeforge_common::config::{AgentConfig, TimeoutConfig};
use citeforge_common::errors::{AppError, Result};
use citeforge_common::models::SearchFilters;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Settings for one run, seeded from `AgentConfig` and overridable per call
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RunConfig {
    pub decomposition_enabled: bool,

    pub direct_retrieval_enabled: bool,

    #[validate(range(min = 1, max = 20))]
    pub max_sub_questions: usize,

    #[validate(range(min = 1, max = 10))]
    pub max_query_variants: usize,

    #[validate(range(min = 1, max = 50))]
    pub max_sections_per_answer: usize,

    pub verification_enabled: bool,

    #[validate(range(min = 1, max = 10))]
    pub max_rounds: u32,

    #[validate(range(min = 1))]
    pub max_budget: i64,

    pub cost_per_sub_question: u32,

    #[validate(range(max = 20))]
    pub max_refined_questions: usize,

    #[validate(range(min = 1))]
    pub max_insufficient_signals: u32,

    pub contradiction_detection_enabled: bool,

    /// Passed untouched to the search interface
    #[serde(default)]
    pub filters: SearchFilters,

    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

impl From<&AgentConfig> for RunConfig {
    fn from(agent: &AgentConfig) -> Self {
        Self {
            decomposition_enabled: agent.decomposition_enabled,
            direct_retrieval_enabled: agent.direct_retrieval_enabled,
            max_sub_questions: agent.max_sub_questions,
            max_query_variants: agent.max_query_variants,
            max_sections_per_answer: agent.max_sections_per_answer,
            verification_enabled: agent.verification_enabled,
            max_rounds: agent.max_rounds,
            max_budget: agent.max_budget,
            cost_per_sub_question: agent.cost_per_sub_question,
            max_refined_questions: agent.max_refined_questions,
            max_insufficient_signals: agent.max_insufficient_signals,
            contradiction_detection_enabled: agent.contradiction_detection_enabled,
            filters: SearchFilters::default(),
            timeouts: agent.timeouts.clone(),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

impl RunConfig {
    pub fn with_filters(mut self, filters: SearchFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Reject settings that cannot produce a run
    pub fn check(&self) -> Result<()> {
        self.validate().map_err(|e| AppError::Validation {
            message: e.to_string(),
            field: e.field_errors().keys().next().map(|k| k.to_string()),
        })
    }
}
