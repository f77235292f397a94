//! Corpus search abstraction
//!
//! The document index is an external collaborator. This module defines the
//! interface the orchestration core consumes plus an HTTP adapter for a
//! search service exposing `POST {endpoint}/search`.

use crate::config::SearchConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::models::{RetrievedSection, SearchFilters};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// Common trait for search backends.
///
/// "No results" is `Ok(vec![])`; errors are reserved for interface faults.
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn retrieve(&self, query: &str, filters: &SearchFilters) -> Result<Vec<RetrievedSection>>;
}

/// HTTP search client
pub struct HttpSearchClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    limit: usize,
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    limit: usize,
    filters: &'a SearchFilters,
}

#[derive(Deserialize)]
struct SearchResponse {
    results: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    document_id: String,
    chunk_id: u32,
    #[serde(default)]
    title: Option<String>,
    content: String,
    score: f32,
    #[serde(default)]
    link: Option<String>,
}

impl From<SearchHit> for RetrievedSection {
    fn from(hit: SearchHit) -> Self {
        let mut section = RetrievedSection::new(hit.document_id, hit.chunk_id, hit.content, hit.score);
        section.title = hit.title;
        section.source_link = hit.link;
        section
    }
}

impl HttpSearchClient {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let base_url = config.endpoint.clone().ok_or_else(|| AppError::Configuration {
            message: "search.endpoint is required for the http provider".to_string(),
        })?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            limit: config.limit,
        })
    }

    async fn make_request(&self, query: &str, filters: &SearchFilters) -> Result<Vec<RetrievedSection>> {
        let url = format!("{}/search", self.base_url);

        let mut builder = self.client.post(&url).json(&SearchRequest {
            query,
            limit: self.limit,
            filters,
        });
        if let Some(key) = &self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await.map_err(|e| AppError::Search {
            message: format!("Request failed: {}", e),
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(AppError::Unauthorized {
                message: format!("Search service rejected credentials ({})", status),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Search {
                message: format!("API error {}: {}", status, body),
            });
        }

        let result: SearchResponse = response.json().await.map_err(|e| AppError::InvalidResponse {
            source_name: "search".to_string(),
            message: format!("Failed to parse response: {}", e),
        })?;

        Ok(result.results.into_iter().map(RetrievedSection::from).collect())
    }
}

#[async_trait]
impl SearchClient for HttpSearchClient {
    async fn retrieve(&self, query: &str, filters: &SearchFilters) -> Result<Vec<RetrievedSection>> {
        let start = Instant::now();
        let result = self.make_request(query, filters).await;

        metrics::record_search(
            start.elapsed().as_secs_f64(),
            result.as_ref().map(|r| r.len()).unwrap_or(0),
            result.is_ok(),
        );

        result
    }
}

/// Create a search client based on configuration.
///
/// Returns `Ok(None)` when no endpoint is configured; the engine reports the
/// missing client when a run starts.
pub fn create_search_client(config: &SearchConfig) -> Result<Option<Arc<dyn SearchClient>>> {
    match config.provider.as_str() {
        "http" if config.endpoint.is_none() => Ok(None),
        "http" => Ok(Some(Arc::new(HttpSearchClient::new(config)?))),
        other => Err(AppError::Configuration {
            message: format!("Unknown search provider: {}", other),
        }),
    }
}
