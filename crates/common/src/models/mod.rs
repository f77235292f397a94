//! Data model shared by the orchestration core
//!
//! Records are created once and then only read: questions are immutable,
//! sub-answers are appended to accumulators, run results are terminal.

mod answer;
mod question;
mod section;

pub use answer::{
    Citation, CitedSection, ClaimRef, Clarification, Contradiction, LogEntry, RunResult,
    SubQuestionAnswer, SufficiencyVerdict, Termination,
};
pub use question::{Question, QuestionId, QuestionKind};
pub use section::{RetrievedSection, SearchFilters, SectionIdentity, VerificationVerdict};
