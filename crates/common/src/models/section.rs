//! Retrieved passages

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Identity of a unique passage: document plus chunk
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SectionIdentity {
    pub doc_id: String,
    pub chunk_id: u32,
}

impl SectionIdentity {
    pub fn new(doc_id: impl Into<String>, chunk_id: u32) -> Self {
        Self {
            doc_id: doc_id.into(),
            chunk_id,
        }
    }
}

impl fmt::Display for SectionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.doc_id, self.chunk_id)
    }
}

/// Relevance judgment for a section against its sub-question
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationVerdict {
    /// Not judged (verification disabled or the judgment call failed)
    Unverified,
    Relevant,
    NotRelevant,
}

/// A passage returned by the search interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedSection {
    pub doc_id: String,
    pub chunk_id: u32,

    /// Document title, when the index has one
    #[serde(default)]
    pub title: Option<String>,

    pub content: String,

    /// Relevance score (higher is better)
    pub score: f32,

    #[serde(default = "default_verdict")]
    pub verification: VerificationVerdict,

    #[serde(default)]
    pub source_link: Option<String>,
}

fn default_verdict() -> VerificationVerdict {
    VerificationVerdict::Unverified
}

impl RetrievedSection {
    pub fn new(doc_id: impl Into<String>, chunk_id: u32, content: impl Into<String>, score: f32) -> Self {
        Self {
            doc_id: doc_id.into(),
            chunk_id,
            title: None,
            content: content.into(),
            score,
            verification: VerificationVerdict::Unverified,
            source_link: None,
        }
    }

    pub fn identity(&self) -> SectionIdentity {
        SectionIdentity::new(self.doc_id.clone(), self.chunk_id)
    }

    pub fn with_verdict(mut self, verdict: VerificationVerdict) -> Self {
        self.verification = verdict;
        self
    }

    /// Display name used in prompts and source lists
    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.doc_id)
    }
}

/// Filters forwarded untouched to the search interface
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilters {
    /// Restrict to these document sources (connector names, collections)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,

    /// Restrict to these document ids
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub document_ids: Vec<String>,

    /// Free-form tag filters
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, String>,
}
