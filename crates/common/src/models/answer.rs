//! Sub-answers, citations and the terminal run result

use super::question::{Question, QuestionId};
use super::section::{RetrievedSection, SectionIdentity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Whether a generated answer fully addresses its question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SufficiencyVerdict {
    Answered,
    PartiallyAnswered,
    Unanswered,
}

impl SufficiencyVerdict {
    pub fn is_answered(&self) -> bool {
        matches!(self, SufficiencyVerdict::Answered)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SufficiencyVerdict::Answered => "ANSWERED",
            SufficiencyVerdict::PartiallyAnswered => "PARTIALLY_ANSWERED",
            SufficiencyVerdict::Unanswered => "UNANSWERED",
        }
    }
}

/// Result of one retrieval-answer cycle for one sub-question.
///
/// `answer_text` carries local `[D<k>]` markers pointing into `sections`;
/// run-scoped citation numbers are applied when rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubQuestionAnswer {
    pub question: Question,

    /// Answering round that produced this answer (1-based)
    pub round: u32,

    pub answer_text: String,

    /// Reranked context the answer was generated from
    pub sections: Vec<RetrievedSection>,

    /// Sections the answer cites, in section-rank order
    pub cited_section_ids: Vec<SectionIdentity>,

    /// Atomic claims made by the answer
    pub claims: Vec<String>,

    pub sufficiency: SufficiencyVerdict,

    /// What is still missing, when the answer is not sufficient
    pub gap: Option<String>,

    /// Budget units consumed
    pub cost: u32,

    /// Produced after a recoverable failure
    pub degraded: bool,
}

impl SubQuestionAnswer {
    /// Answer recorded when a cycle could not produce anything usable
    pub fn degraded(question: Question, round: u32, cost: u32, gap: impl Into<String>) -> Self {
        Self {
            question,
            round,
            answer_text: String::new(),
            sections: Vec::new(),
            cited_section_ids: Vec::new(),
            claims: Vec::new(),
            sufficiency: SufficiencyVerdict::Unanswered,
            gap: Some(gap.into()),
            cost,
            degraded: true,
        }
    }

    pub fn question_id(&self) -> QuestionId {
        self.question.id()
    }

    /// Section behind a local `[D<k>]` marker (1-based)
    pub fn local_section(&self, marker: usize) -> Option<&RetrievedSection> {
        marker.checked_sub(1).and_then(|i| self.sections.get(i))
    }

    /// Cited sections in rank order
    pub fn cited_sections(&self) -> impl Iterator<Item = &RetrievedSection> {
        self.sections
            .iter()
            .filter(|s| self.cited_section_ids.contains(&s.identity()))
    }
}

/// Run-scoped citation number bound to one unique passage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub number: u32,
    pub section_identity: SectionIdentity,
}

/// A cited passage together with its citation number
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CitedSection {
    pub citation: Citation,
    pub section: RetrievedSection,
}

/// A claim made by one sub-answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimRef {
    pub question_id: QuestionId,
    pub text: String,
}

/// A group of claims that cannot all be true
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contradiction {
    pub claims: Vec<ClaimRef>,
    pub explanation: String,
}

/// A claim that needs clarification before it can be relied on
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clarification {
    pub claim: ClaimRef,
    pub reason: String,
}

/// Why the planner stopped refining
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// No open gaps remained
    Sufficient,
    /// Round limit or loop-prevention threshold reached
    RoundLimit,
    BudgetExhausted,
    /// The refinement generator had nothing new to ask
    NoFurtherRefinement,
    /// Decomposition produced zero sub-questions
    EmptyDecomposition,
    /// An interface failed in a way that cannot be retried
    InterfaceFailure { message: String },
}

impl Termination {
    /// Terminations after which the answer may be missing information
    pub fn is_early(&self) -> bool {
        matches!(
            self,
            Termination::BudgetExhausted
                | Termination::InterfaceFailure { .. }
                | Termination::EmptyDecomposition
        )
    }
}

/// Timing record for one orchestration step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub started_at: DateTime<Utc>,
    pub component: String,
    pub step: String,
    pub duration_ms: u64,
    pub detail: Option<String>,
}

impl LogEntry {
    /// Close a step that started at `started_at`
    pub fn finish(
        component: &str,
        step: &str,
        started_at: DateTime<Utc>,
        detail: Option<String>,
    ) -> Self {
        let duration_ms = (Utc::now() - started_at).num_milliseconds().max(0) as u64;
        Self {
            started_at,
            component: component.to_string(),
            step: step.to_string(),
            duration_ms,
            detail,
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -- {} - {} -- Time taken: {}ms",
            self.started_at.to_rfc3339(),
            self.component,
            self.step,
            self.duration_ms
        )?;
        if let Some(detail) = &self.detail {
            write!(f, " -- Result: {}", detail)?;
        }
        Ok(())
    }
}

/// Terminal result of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub question: String,
    pub final_answer_text: String,

    /// Every cited passage, ordered by citation number
    pub all_cited_sections: Vec<CitedSection>,

    pub contradictions: Vec<Contradiction>,
    pub clarifications: Vec<Clarification>,

    /// All sub-answers in round, then dispatch order
    pub sub_answers: Vec<SubQuestionAnswer>,

    pub termination: Termination,

    /// Set when the run stopped early or no sub-answer succeeded
    pub possibly_incomplete: bool,

    pub log: Vec<LogEntry>,
}

impl RunResult {
    pub fn citation_numbers(&self) -> Vec<u32> {
        self.all_cited_sections
            .iter()
            .map(|c| c.citation.number)
            .collect()
    }
}
