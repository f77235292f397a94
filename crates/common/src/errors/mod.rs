//! Error types for CiteForge
//!
//! Provides a single error enum for the orchestration core with:
//! - Distinct variants for each failure mode of the consumed interfaces
//! - Machine-readable error codes
//! - A recoverability classification used to decide whether a failure
//!   degrades one step or ends the run

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors (1xxx)
    ValidationError,
    MissingField,

    // Authentication errors (2xxx)
    Unauthorized,

    // External service errors (8xxx)
    UpstreamError,
    LlmError,
    SearchError,
    RerankError,
    Timeout,
    InvalidResponse,
    PersistenceError,

    // Internal errors (9xxx)
    InternalError,
    ConfigurationError,
    SerializationError,

    // Run control
    Cancelled,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Validation (1xxx)
            ErrorCode::ValidationError => 1001,
            ErrorCode::MissingField => 1002,

            // Auth (2xxx)
            ErrorCode::Unauthorized => 2001,

            // External (8xxx)
            ErrorCode::UpstreamError => 8001,
            ErrorCode::LlmError => 8002,
            ErrorCode::SearchError => 8003,
            ErrorCode::RerankError => 8004,
            ErrorCode::Timeout => 8005,
            ErrorCode::InvalidResponse => 8006,
            ErrorCode::PersistenceError => 8007,

            // Internal (9xxx)
            ErrorCode::InternalError => 9001,
            ErrorCode::ConfigurationError => 9002,
            ErrorCode::SerializationError => 9003,

            ErrorCode::Cancelled => 9900,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("Required field missing: {field}")]
    MissingField { field: String },

    // Authentication errors
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    // External service errors
    #[error("LLM error: {message}")]
    Llm { message: String },

    #[error("Search error: {message}")]
    Search { message: String },

    #[error("Rerank error: {message}")]
    Rerank { message: String },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Invalid response from {source_name}: {message}")]
    InvalidResponse { source_name: String, message: String },

    #[error("Persistence error: {message}")]
    Persistence { message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Run cancelled")]
    Cancelled,

    // Generic
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::MissingField { .. } => ErrorCode::MissingField,
            AppError::Unauthorized { .. } => ErrorCode::Unauthorized,
            AppError::Llm { .. } => ErrorCode::LlmError,
            AppError::Search { .. } => ErrorCode::SearchError,
            AppError::Rerank { .. } => ErrorCode::RerankError,
            AppError::Timeout { .. } => ErrorCode::Timeout,
            AppError::InvalidResponse { .. } => ErrorCode::InvalidResponse,
            AppError::Persistence { .. } => ErrorCode::PersistenceError,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::Internal { .. } => ErrorCode::InternalError,
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Cancelled => ErrorCode::Cancelled,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Whether a step may swallow this error and continue with an empty or
    /// neutral output.
    ///
    /// Call failures, timeouts and unparseable responses are recoverable.
    /// Configuration problems, rejected credentials and cancellation are not.
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Llm { .. }
            | AppError::Search { .. }
            | AppError::Rerank { .. }
            | AppError::Timeout { .. }
            | AppError::InvalidResponse { .. }
            | AppError::Persistence { .. }
            | AppError::HttpClient(_)
            | AppError::Serialization(_)
            | AppError::Internal { .. }
            | AppError::Other(_) => true,

            AppError::Validation { .. }
            | AppError::MissingField { .. }
            | AppError::Unauthorized { .. }
            | AppError::Configuration { .. }
            | AppError::Cancelled => false,
        }
    }

    /// Whether this error was caused by an unusable setup rather than a
    /// failing call
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AppError::Configuration { .. } | AppError::Validation { .. } | AppError::MissingField { .. }
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, AppError::Cancelled)
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration {
            message: err.to_string(),
        }
    }
}
