//! Progress events streamed to the caller of a run

use crate::budget::BudgetState;
use crate::planner::PlannerState;
use citeforge_common::models::{QuestionId, RunResult, SufficiencyVerdict};
use serde::Serialize;

/// One completed sub-answer, rendered with run-scoped citation numbers
#[derive(Debug, Clone, Serialize)]
pub struct SubAnswerUpdate {
    pub question_id: QuestionId,
    pub question: String,
    pub answer: String,
    pub sufficiency: SufficiencyVerdict,
    pub degraded: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    StateChanged {
        from: PlannerState,
        to: PlannerState,
    },
    /// Questions about to be dispatched in `round`
    QuestionsPlanned {
        round: u32,
        questions: Vec<(QuestionId, String)>,
    },
    SubAnswer(SubAnswerUpdate),
    BudgetUpdated(BudgetState),
    Finished(Box<RunResult>),
    /// The run was cancelled; nothing after the last completed round was kept
    Cancelled,
    Failed {
        message: String,
    },
}

impl ProgressEvent {
    /// Whether this event ends the stream
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressEvent::Finished(_) | ProgressEvent::Cancelled | ProgressEvent::Failed { .. }
        )
    }
}
