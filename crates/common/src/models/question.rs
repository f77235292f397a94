//! Questions asked during a run

use serde::{Deserialize, Serialize};
use std::fmt;

/// Hierarchical question id rendered as `round.index`.
///
/// The original question is `0.0`. Questions dispatched in answering round
/// `r` are numbered `r.1 ..= r.N` in dispatch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QuestionId {
    pub round: u32,
    pub index: u32,
}

impl QuestionId {
    pub const ORIGINAL: QuestionId = QuestionId { round: 0, index: 0 };

    pub fn new(round: u32, index: u32) -> Self {
        Self { round, index }
    }

    /// Parse the `round.index` form
    pub fn parse(value: &str) -> Option<Self> {
        let (round, index) = value.trim().split_once('.')?;
        Some(Self {
            round: round.parse().ok()?,
            index: index.parse().ok()?,
        })
    }
}

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.round, self.index)
    }
}

/// How a question came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionKind {
    /// The user's question
    Original,
    /// Produced by decomposing the original question
    Decomposed,
    /// Produced by the refinement generator to close a gap
    Refined,
}

/// A question driving one retrieval-answer cycle. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    id: QuestionId,
    text: String,
    parent_id: Option<QuestionId>,
    kind: QuestionKind,
}

impl Question {
    pub fn original(text: impl Into<String>) -> Self {
        Self {
            id: QuestionId::ORIGINAL,
            text: text.into(),
            parent_id: None,
            kind: QuestionKind::Original,
        }
    }

    pub fn decomposed(id: QuestionId, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
            parent_id: Some(QuestionId::ORIGINAL),
            kind: QuestionKind::Decomposed,
        }
    }

    pub fn refined(id: QuestionId, text: impl Into<String>, parent_id: QuestionId) -> Self {
        Self {
            id,
            text: text.into(),
            parent_id: Some(parent_id),
            kind: QuestionKind::Refined,
        }
    }

    pub fn id(&self) -> QuestionId {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn parent_id(&self) -> Option<QuestionId> {
        self.parent_id
    }

    pub fn kind(&self) -> QuestionKind {
        self.kind
    }
}
