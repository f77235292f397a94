//! CiteForge Common Library
//!
//! Shared code for the CiteForge orchestration core including:
//! - Data model (questions, sections, sub-answers, run results)
//! - Interfaces to external collaborators (LLM, search, reranker, persistence)
//!   with HTTP adapters
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod errors;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod persistence;
pub mod rerank;
pub mod search;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use llm::{LlmClient, LlmPurpose, LlmRequest};
pub use persistence::{MessageRole, MessageSink};
pub use rerank::Reranker;
pub use search::SearchClient;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
