//! Run API: start, observe and cancel orchestration runs

use crate::cycle::CycleContext;
use crate::events::ProgressEvent;
use crate::planner::Orchestrator;
use crate::run_config::RunConfig;
use citeforge_common::config::AppConfig;
use citeforge_common::errors::{AppError, Result};
use citeforge_common::llm::create_llm_client;
use citeforge_common::metrics;
use citeforge_common::models::RunResult;
use citeforge_common::persistence::TracingMessageSink;
use citeforge_common::rerank::create_reranker;
use citeforge_common::search::create_search_client;
use citeforge_common::{LlmClient, MessageSink, Reranker, SearchClient};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use validator::Validate;

const EVENT_BUFFER: usize = 256;

#[derive(Debug, Validate)]
struct QuestionInput {
    #[validate(length(min = 1, max = 2000))]
    text: String,
}

/// A started run.
///
/// `events` must be drained: the run waits when the buffer is full. The
/// stream ends with `Finished`, `Cancelled` or `Failed`.
pub struct RunHandle {
    pub run_id: Uuid,
    pub events: ReceiverStream<ProgressEvent>,
    pub task: JoinHandle<Result<RunResult>>,
}

/// Orchestration engine shared by all runs of a process
pub struct Engine {
    llm: Arc<dyn LlmClient>,
    search: Option<Arc<dyn SearchClient>>,
    reranker: Option<Arc<dyn Reranker>>,
    sink: Arc<dyn MessageSink>,
    defaults: RunConfig,
    runs: Arc<Mutex<HashMap<Uuid, CancellationToken>>>,
}

impl Engine {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        search: Option<Arc<dyn SearchClient>>,
        reranker: Option<Arc<dyn Reranker>>,
        sink: Arc<dyn MessageSink>,
    ) -> Self {
        Self {
            llm,
            search,
            reranker,
            sink,
            defaults: RunConfig::default(),
            runs: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Build the engine and its adapters from application configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let llm = create_llm_client(&config.llm)?;
        let search = create_search_client(&config.search)?;
        let reranker = create_reranker(&config.reranker)?;

        Ok(Self::new(llm, search, Some(reranker), Arc::new(TracingMessageSink))
            .with_defaults(RunConfig::from(&config.agent)))
    }

    pub fn with_defaults(mut self, defaults: RunConfig) -> Self {
        self.defaults = defaults;
        self
    }

    /// Run settings used when the caller has no overrides
    pub fn defaults(&self) -> &RunConfig {
        &self.defaults
    }

    /// Validate inputs and spawn a run.
    ///
    /// Fails before any external call when the question or settings are
    /// invalid, or when no search client is configured.
    pub fn start_run(&self, question: &str, config: RunConfig) -> Result<RunHandle> {
        let input = QuestionInput {
            text: question.trim().to_string(),
        };
        input
            .validate()
            .map_err(|e| AppError::Validation {
                message: e.to_string(),
                field: Some("question".to_string()),
            })?;
        config.check()?;

        let search = self.search.clone().ok_or_else(|| AppError::Configuration {
            message: "no search client configured; set search.endpoint".to_string(),
        })?;

        let run_id = Uuid::now_v7();
        let token = CancellationToken::new();
        lock(&self.runs).insert(run_id, token.clone());

        let ctx = Arc::new(CycleContext {
            run_id,
            llm: Arc::clone(&self.llm),
            search,
            reranker: self.reranker.clone(),
            config,
        });

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let mut orchestrator = Orchestrator::new(ctx, Arc::clone(&self.sink), tx.clone(), token);
        let runs = Arc::clone(&self.runs);
        let question = input.text;

        tracing::info!(run_id = %run_id, "Run started");

        let task = tokio::spawn(async move {
            let start = Instant::now();
            let result = orchestrator.run(&question).await;
            lock(&runs).remove(&run_id);

            let elapsed = start.elapsed().as_secs_f64();
            match &result {
                Ok(run) => {
                    let rounds = run.sub_answers.iter().map(|a| a.round).max().unwrap_or(0);
                    metrics::record_run(elapsed, "completed", rounds);
                    tracing::info!(run_id = %run_id, termination = ?run.termination, "Run finished");
                    let _ = tx.send(ProgressEvent::Finished(Box::new(run.clone()))).await;
                }
                Err(e) if e.is_cancelled() => {
                    metrics::record_run(elapsed, "cancelled", 0);
                    tracing::info!(run_id = %run_id, "Run cancelled");
                    let _ = tx.send(ProgressEvent::Cancelled).await;
                }
                Err(e) => {
                    metrics::record_run(elapsed, "failed", 0);
                    tracing::error!(run_id = %run_id, error = %e, "Run failed");
                    let _ = tx
                        .send(ProgressEvent::Failed {
                            message: e.to_string(),
                        })
                        .await;
                }
            }
            result
        });

        Ok(RunHandle {
            run_id,
            events: ReceiverStream::new(rx),
            task,
        })
    }

    /// Request cancellation of a running run. Returns false for unknown or
    /// already finished runs.
    pub fn cancel(&self, run_id: Uuid) -> bool {
        match lock(&self.runs).get(&run_id) {
            Some(token) => {
                tracing::info!(run_id = %run_id, "Cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Runs currently in flight
    pub fn active_runs(&self) -> usize {
        lock(&self.runs).len()
    }

    /// Start a run and wait for its result, discarding progress events
    pub async fn run_to_completion(&self, question: &str, config: RunConfig) -> Result<RunResult> {
        let RunHandle { mut events, task, .. } = self.start_run(question, config)?;
        while events.next().await.is_some() {}

        task.await.map_err(|e| AppError::Internal {
            message: format!("run task failed: {}", e),
        })?
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
