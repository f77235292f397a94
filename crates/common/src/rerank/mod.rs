//! Reranking abstraction
//!
//! Provides:
//! - `ScoreReranker`: keeps the retrieval scores (no model call)
//! - `HttpReranker`: cross-encoder style endpoint returning relevance scores

use crate::config::RerankerConfig;
use crate::errors::{AppError, Result};
use crate::models::RetrievedSection;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Trait for rescoring sections against a query.
///
/// Implementations return the sections with updated scores; ordering is
/// applied by the caller.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, sections: Vec<RetrievedSection>) -> Result<Vec<RetrievedSection>>;

    fn name(&self) -> &str;
}

/// Keeps retrieval scores untouched
pub struct ScoreReranker;

#[async_trait]
impl Reranker for ScoreReranker {
    async fn rerank(&self, _query: &str, sections: Vec<RetrievedSection>) -> Result<Vec<RetrievedSection>> {
        Ok(sections)
    }

    fn name(&self) -> &str {
        "score"
    }
}

/// HTTP rerank client
pub struct HttpReranker {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: Option<String>,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    documents: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankScore>,
}

#[derive(Deserialize)]
struct RerankScore {
    index: usize,
    relevance_score: f32,
}

impl HttpReranker {
    pub fn new(config: &RerankerConfig) -> Result<Self> {
        let endpoint = config.endpoint.clone().ok_or_else(|| AppError::Configuration {
            message: "reranker.endpoint is required for the http provider".to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(&self, query: &str, mut sections: Vec<RetrievedSection>) -> Result<Vec<RetrievedSection>> {
        let request = RerankRequest {
            query,
            documents: sections.iter().map(|s| s.content.as_str()).collect(),
            model: self.model.as_deref(),
        };

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await.map_err(|e| AppError::Rerank {
            message: format!("Request failed: {}", e),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Rerank {
                message: format!("API error {}: {}", status, body),
            });
        }

        let scores: RerankResponse = response.json().await.map_err(|e| AppError::InvalidResponse {
            source_name: "reranker".to_string(),
            message: format!("Failed to parse response: {}", e),
        })?;

        apply_scores(&mut sections, &scores.results);
        Ok(sections)
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Overwrite section scores by index; indices out of range are ignored
fn apply_scores(sections: &mut [RetrievedSection], scores: &[RerankScore]) {
    for score in scores {
        if let Some(section) = sections.get_mut(score.index) {
            section.score = score.relevance_score;
        }
    }
}

/// Create a reranker based on configuration
pub fn create_reranker(config: &RerankerConfig) -> Result<Arc<dyn Reranker>> {
    match config.provider.as_str() {
        "score" => Ok(Arc::new(ScoreReranker)),
        "http" => Ok(Arc::new(HttpReranker::new(config)?)),
        other => Err(AppError::Configuration {
            message: format!("Unknown reranker provider: {}", other),
        }),
    }
}
