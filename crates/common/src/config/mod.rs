//! Configuration management for CiteForge
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default, config/{APP_ENV}, config/local)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// LLM provider configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Search backend configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Reranker configuration
    #[serde(default)]
    pub reranker: RerankerConfig,

    /// Orchestration defaults applied to every run
    #[serde(default)]
    pub agent: AgentConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Provider: openai (any chat-completions compatible endpoint)
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// Chat completions endpoint
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// API key
    pub api_key: Option<String>,

    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// HTTP timeout in seconds (per attempt)
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient failures
    #[serde(default = "default_llm_retries")]
    pub max_retries: u32,

    /// Outbound requests per second (0 disables rate limiting)
    #[serde(default)]
    pub requests_per_second: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Provider: http
    #[serde(default = "default_search_provider")]
    pub provider: String,

    /// Base URL of the search service
    pub endpoint: Option<String>,

    /// API key sent as bearer token (optional)
    pub api_key: Option<String>,

    /// Sections requested per query variant
    #[serde(default = "default_search_limit")]
    pub limit: usize,

    /// HTTP timeout in seconds
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RerankerConfig {
    /// Provider: score (keep retrieval scores) or http
    #[serde(default = "default_reranker_provider")]
    pub provider: String,

    /// Rerank endpoint (http provider only)
    pub endpoint: Option<String>,

    /// API key (http provider only)
    pub api_key: Option<String>,

    /// Model name sent to the rerank endpoint
    pub model: Option<String>,
}

/// Orchestration defaults. Every field can be overridden per run.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    /// Decompose the question into sub-questions
    #[serde(default = "default_true")]
    pub decomposition_enabled: bool,

    /// Search the original question alongside decomposition and hand the
    /// results to final synthesis
    #[serde(default = "default_true")]
    pub direct_retrieval_enabled: bool,

    /// Maximum sub-questions produced by decomposition
    #[serde(default = "default_max_sub_questions")]
    pub max_sub_questions: usize,

    /// Maximum search-query variants per sub-question
    #[serde(default = "default_max_query_variants")]
    pub max_query_variants: usize,

    /// Maximum sections kept after reranking
    #[serde(default = "default_max_sections_per_answer")]
    pub max_sections_per_answer: usize,

    /// Run the LLM relevance check on retrieved sections
    #[serde(default = "default_true")]
    pub verification_enabled: bool,

    /// Maximum answering rounds (initial round included)
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Total budget units for the run
    #[serde(default = "default_max_budget")]
    pub max_budget: i64,

    /// Budget units charged per dispatched sub-question
    #[serde(default = "default_cost_per_sub_question")]
    pub cost_per_sub_question: u32,

    /// Maximum refined sub-questions per refinement round
    #[serde(default = "default_max_refined_questions")]
    pub max_refined_questions: usize,

    /// Stop refining after this many insufficient sufficiency signals
    #[serde(default = "default_max_insufficient_signals")]
    pub max_insufficient_signals: u32,

    /// Run the contradiction pass during final assembly
    #[serde(default = "default_true")]
    pub contradiction_detection_enabled: bool,

    /// Per-call timeouts
    #[serde(default)]
    pub timeouts: TimeoutConfig,
}

/// Timeouts (seconds) applied to every external call
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_fast_timeout")]
    pub decomposition_secs: u64,

    #[serde(default = "default_fast_timeout")]
    pub expansion_secs: u64,

    #[serde(default = "default_search_call_timeout")]
    pub search_secs: u64,

    #[serde(default = "default_fast_timeout")]
    pub verification_secs: u64,

    #[serde(default = "default_search_call_timeout")]
    pub rerank_secs: u64,

    #[serde(default = "default_answer_timeout")]
    pub answer_secs: u64,

    #[serde(default = "default_fast_timeout")]
    pub sufficiency_secs: u64,

    #[serde(default = "default_fast_timeout")]
    pub refinement_secs: u64,

    #[serde(default = "default_synthesis_timeout")]
    pub synthesis_secs: u64,

    #[serde(default = "default_answer_timeout")]
    pub contradiction_secs: u64,

    #[serde(default = "default_persistence_timeout")]
    pub persistence_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_true")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default)]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_true() -> bool { true }
fn default_llm_provider() -> String { "openai".to_string() }
fn default_llm_endpoint() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_llm_model() -> String { "gpt-4o-mini".to_string() }
fn default_llm_timeout() -> u64 { 60 }
fn default_llm_retries() -> u32 { 2 }
fn default_temperature() -> f32 { 0.0 }
fn default_search_provider() -> String { "http".to_string() }
fn default_search_limit() -> usize { 10 }
fn default_search_timeout() -> u64 { 15 }
fn default_reranker_provider() -> String { "score".to_string() }
fn default_max_sub_questions() -> usize { 5 }
fn default_max_query_variants() -> usize { 3 }
fn default_max_sections_per_answer() -> usize { 8 }
fn default_max_rounds() -> u32 { 3 }
fn default_max_budget() -> i64 { 20 }
fn default_cost_per_sub_question() -> u32 { 1 }
fn default_max_refined_questions() -> usize { 3 }
fn default_max_insufficient_signals() -> u32 { 2 }
fn default_fast_timeout() -> u64 { 25 }
fn default_search_call_timeout() -> u64 { 15 }
fn default_persistence_timeout() -> u64 { 5 }
fn default_answer_timeout() -> u64 { 60 }
fn default_synthesis_timeout() -> u64 { 120 }
fn default_log_level() -> String { "info".to_string() }
fn default_service_name() -> String { "citeforge".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__AGENT__MAX_ROUNDS=2
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl TimeoutConfig {
    pub fn decomposition(&self) -> Duration { Duration::from_secs(self.decomposition_secs) }
    pub fn expansion(&self) -> Duration { Duration::from_secs(self.expansion_secs) }
    pub fn search(&self) -> Duration { Duration::from_secs(self.search_secs) }
    pub fn verification(&self) -> Duration { Duration::from_secs(self.verification_secs) }
    pub fn rerank(&self) -> Duration { Duration::from_secs(self.rerank_secs) }
    pub fn answer(&self) -> Duration { Duration::from_secs(self.answer_secs) }
    pub fn sufficiency(&self) -> Duration { Duration::from_secs(self.sufficiency_secs) }
    pub fn refinement(&self) -> Duration { Duration::from_secs(self.refinement_secs) }
    pub fn synthesis(&self) -> Duration { Duration::from_secs(self.synthesis_secs) }
    pub fn contradiction(&self) -> Duration { Duration::from_secs(self.contradiction_secs) }
    pub fn persistence(&self) -> Duration { Duration::from_secs(self.persistence_secs) }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            search: SearchConfig::default(),
            reranker: RerankerConfig::default(),
            agent: AgentConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            endpoint: default_llm_endpoint(),
            api_key: None,
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
            max_retries: default_llm_retries(),
            requests_per_second: 0,
            temperature: default_temperature(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            provider: default_search_provider(),
            endpoint: None,
            api_key: None,
            limit: default_search_limit(),
            timeout_secs: default_search_timeout(),
        }
    }
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            provider: default_reranker_provider(),
            endpoint: None,
            api_key: None,
            model: None,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            decomposition_enabled: true,
            direct_retrieval_enabled: true,
            max_sub_questions: default_max_sub_questions(),
            max_query_variants: default_max_query_variants(),
            max_sections_per_answer: default_max_sections_per_answer(),
            verification_enabled: true,
            max_rounds: default_max_rounds(),
            max_budget: default_max_budget(),
            cost_per_sub_question: default_cost_per_sub_question(),
            max_refined_questions: default_max_refined_questions(),
            max_insufficient_signals: default_max_insufficient_signals(),
            contradiction_detection_enabled: true,
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            decomposition_secs: default_fast_timeout(),
            expansion_secs: default_fast_timeout(),
            search_secs: default_search_call_timeout(),
            verification_secs: default_fast_timeout(),
            rerank_secs: default_search_call_timeout(),
            answer_secs: default_answer_timeout(),
            sufficiency_secs: default_fast_timeout(),
            refinement_secs: default_fast_timeout(),
            synthesis_secs: default_synthesis_timeout(),
            contradiction_secs: default_answer_timeout(),
            persistence_secs: default_persistence_timeout(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: true,
            metrics_port: 0,
            service_name: default_service_name(),
        }
    }
}
