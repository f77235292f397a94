//! Scripted fakes for the external interfaces (test-only)

use crate::cycle::CycleContext;
use crate::run_config::RunConfig;
use async_trait::async_trait;
use citeforge_common::errors::{AppError, Result};
use citeforge_common::models::{RetrievedSection, SearchFilters};
use citeforge_common::{LlmClient, LlmPurpose, LlmRequest, MessageRole, MessageSink, Reranker, SearchClient};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub fn section(doc: &str, chunk: u32, score: f32) -> RetrievedSection {
    RetrievedSection::new(doc, chunk, format!("Content of {} chunk {}", doc, chunk), score)
}

pub fn context(llm: ScriptedLlm) -> CycleContext {
    context_with(llm, FakeSearch::new())
}

pub fn context_with(llm: ScriptedLlm, search: FakeSearch) -> CycleContext {
    CycleContext {
        run_id: Uuid::now_v7(),
        llm: Arc::new(llm),
        search: Arc::new(search),
        reranker: None,
        config: RunConfig::default(),
    }
}

#[derive(Clone)]
enum Reply {
    Text(String),
    Fail,
}

#[derive(Clone)]
struct Rule {
    purpose: LlmPurpose,
    needle: Option<String>,
    reply: Reply,
}

/// LLM answering from per-purpose scripts.
///
/// Prompt-specific rules are tried first in insertion order; otherwise the
/// most recently added rule for the purpose wins. Unscripted purposes fail
/// with a recoverable error.
#[derive(Clone, Default)]
pub struct ScriptedLlm {
    rules: Vec<Rule>,
    delays: Vec<(Option<LlmPurpose>, Option<String>, Duration)>,
    reject: bool,
    calls: Arc<Mutex<Vec<(LlmPurpose, String)>>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, purpose: LlmPurpose, reply: &str) -> Self {
        self.rules.push(Rule {
            purpose,
            needle: None,
            reply: Reply::Text(reply.to_string()),
        });
        self
    }

    /// Reply only when the prompt contains `needle`
    pub fn on_prompt(mut self, purpose: LlmPurpose, needle: &str, reply: &str) -> Self {
        self.rules.push(Rule {
            purpose,
            needle: Some(needle.to_string()),
            reply: Reply::Text(reply.to_string()),
        });
        self
    }

    pub fn fail(mut self, purpose: LlmPurpose) -> Self {
        self.rules.push(Rule {
            purpose,
            needle: None,
            reply: Reply::Fail,
        });
        self
    }

    /// Every call fails with rejected credentials
    pub fn reject_credentials(mut self) -> Self {
        self.reject = true;
        self
    }

    pub fn delay(mut self, purpose: LlmPurpose, by: Duration) -> Self {
        self.delays.push((Some(purpose), None, by));
        self
    }

    /// Delay any call whose prompt contains `needle`
    pub fn delay_prompt(mut self, needle: &str, by: Duration) -> Self {
        self.delays.push((None, Some(needle.to_string()), by));
        self
    }

    /// Delay calls of one purpose whose prompt contains `needle`
    pub fn delay_prompt_for(mut self, purpose: LlmPurpose, needle: &str, by: Duration) -> Self {
        self.delays.push((Some(purpose), Some(needle.to_string()), by));
        self
    }

    pub fn calls(&self, purpose: LlmPurpose) -> usize {
        self.prompts(purpose).len()
    }

    pub fn prompts(&self, purpose: LlmPurpose) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| *p == purpose)
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }

    fn reply_for(&self, request: &LlmRequest) -> Option<&Reply> {
        let of_purpose = || self.rules.iter().filter(|r| r.purpose == request.purpose);
        of_purpose()
            .find(|r| r.needle.as_ref().is_some_and(|n| request.prompt.contains(n.as_str())))
            .or_else(|| of_purpose().filter(|r| r.needle.is_none()).last())
            .map(|r| &r.reply)
    }

    fn delay_for(&self, request: &LlmRequest) -> Option<Duration> {
        self.delays
            .iter()
            .find(|(purpose, needle, _)| {
                purpose.map_or(true, |p| p == request.purpose)
                    && needle.as_ref().map_or(true, |n| request.prompt.contains(n.as_str()))
            })
            .map(|(_, _, by)| *by)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn invoke(&self, request: &LlmRequest) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((request.purpose, request.prompt.clone()));

        if let Some(by) = self.delay_for(request) {
            tokio::time::sleep(by).await;
        }

        if self.reject {
            return Err(AppError::Unauthorized {
                message: "invalid api key".to_string(),
            });
        }

        match self.reply_for(request) {
            Some(Reply::Text(text)) => Ok(text.clone()),
            Some(Reply::Fail) | None => Err(AppError::Llm {
                message: format!("no scripted reply for {}", request.purpose.as_str()),
            }),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

#[derive(Clone)]
enum Route {
    Results(Vec<RetrievedSection>),
    Fail,
    Delay(Duration),
}

/// Search answering by case-insensitive substring match on the query.
/// Unmatched queries return no results.
#[derive(Clone, Default)]
pub struct FakeSearch {
    routes: Vec<(String, Route)>,
    fail_all: bool,
    queries: Arc<Mutex<Vec<String>>>,
    filters: Arc<Mutex<Vec<SearchFilters>>>,
}

impl FakeSearch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, needle: &str, sections: Vec<RetrievedSection>) -> Self {
        self.routes.push((needle.to_lowercase(), Route::Results(sections)));
        self
    }

    pub fn fail_on(mut self, needle: &str) -> Self {
        self.routes.push((needle.to_lowercase(), Route::Fail));
        self
    }

    pub fn delay_on(mut self, needle: &str, by: Duration) -> Self {
        self.routes.push((needle.to_lowercase(), Route::Delay(by)));
        self
    }

    pub fn fail_all(mut self) -> Self {
        self.fail_all = true;
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }

    /// Filters received, one entry per call
    pub fn filters(&self) -> Vec<SearchFilters> {
        self.filters.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchClient for FakeSearch {
    async fn retrieve(&self, query: &str, filters: &SearchFilters) -> Result<Vec<RetrievedSection>> {
        self.queries.lock().unwrap().push(query.to_string());
        self.filters.lock().unwrap().push(filters.clone());

        if self.fail_all {
            return Err(AppError::Search {
                message: "index unavailable".to_string(),
            });
        }

        let lower = query.to_lowercase();
        let route = self
            .routes
            .iter()
            .find(|(needle, _)| lower.contains(needle.as_str()))
            .map(|(_, route)| route.clone());

        match route {
            Some(Route::Results(sections)) => Ok(sections),
            Some(Route::Fail) => Err(AppError::Search {
                message: format!("search failed for '{}'", query),
            }),
            Some(Route::Delay(by)) => {
                tokio::time::sleep(by).await;
                Ok(Vec::new())
            }
            None => Ok(Vec::new()),
        }
    }
}

/// Reranker assigning fixed scores per document id
pub struct FakeReranker {
    scores: HashMap<String, f32>,
    fail: bool,
}

impl FakeReranker {
    pub fn scores(scores: &[(&str, f32)]) -> Self {
        Self {
            scores: scores.iter().map(|(d, s)| (d.to_string(), *s)).collect(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            scores: HashMap::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl Reranker for FakeReranker {
    async fn rerank(&self, _query: &str, mut sections: Vec<RetrievedSection>) -> Result<Vec<RetrievedSection>> {
        if self.fail {
            return Err(AppError::Rerank {
                message: "reranker unavailable".to_string(),
            });
        }
        for section in &mut sections {
            if let Some(score) = self.scores.get(&section.doc_id) {
                section.score = *score;
            }
        }
        Ok(sections)
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Sink recording every appended message
#[derive(Clone, Default)]
pub struct RecordingSink {
    messages: Arc<Mutex<Vec<(MessageRole, String)>>>,
    fail: bool,
    hang: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Every append blocks forever
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<(MessageRole, String)> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn append_message(&self, _run_id: Uuid, role: MessageRole, content: &str) -> Result<()> {
        if self.hang {
            std::future::pending::<()>().await;
        }
        if self.fail {
            return Err(AppError::Persistence {
                message: "store unavailable".to_string(),
            });
        }
        self.messages.lock().unwrap().push((role, content.to_string()));
        Ok(())
    }
}
