//! Timeout wrapper for external calls

use citeforge_common::errors::{AppError, Result};
use std::future::Future;
use std::time::Duration;

/// Run an external call with a deadline. Elapsing maps to `AppError::Timeout`.
pub async fn bounded<T, F>(operation: &str, limit: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout {
            operation: operation.to_string(),
            timeout_ms: limit.as_millis() as u64,
        }),
    }
}
