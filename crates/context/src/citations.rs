//! Citation Assignment - run-scoped citation numbering
//!
//! Cycles write local `[D<k>]` markers that index into their own reranked
//! sections. The coordinating planner task turns those into run-scoped
//! numbers at round fan-in, so numbering never depends on which cycle
//! finished first.

use citeforge_common::metrics;
use citeforge_common::models::{
    Citation, CitedSection, RetrievedSection, SectionIdentity, SubQuestionAnswer,
};
use regex_lite::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

static LOCAL_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[D\s*(\d+)\]").expect("valid marker pattern"));

static CITATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+)\]").expect("valid citation pattern"));

/// Local `[D<k>]` markers in order of appearance, de-duplicated
pub fn local_markers(text: &str) -> Vec<usize> {
    let mut markers = Vec::new();
    for caps in LOCAL_MARKER.captures_iter(text) {
        if let Ok(k) = caps[1].parse::<usize>() {
            if !markers.contains(&k) {
                markers.push(k);
            }
        }
    }
    markers
}

/// Remove every local marker from a text
pub fn strip_markers(text: &str) -> String {
    tidy(&LOCAL_MARKER.replace_all(text, ""))
}

/// Run-scoped citation counter
#[derive(Debug, Default)]
pub struct CitationRegistry {
    numbers: HashMap<SectionIdentity, u32>,
    cited: Vec<CitedSection>,
}

impl CitationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number for a section, assigning the next one on first sight
    pub fn assign(&mut self, section: &RetrievedSection) -> u32 {
        let identity = section.identity();
        if let Some(&number) = self.numbers.get(&identity) {
            return number;
        }

        let number = self.cited.len() as u32 + 1;
        self.numbers.insert(identity.clone(), number);
        self.cited.push(CitedSection {
            citation: Citation {
                number,
                section_identity: identity,
            },
            section: section.clone(),
        });
        number
    }

    /// Assign numbers for one completed round.
    ///
    /// `answers` must be in dispatch order; sections are visited in rank
    /// order within each answer. Returns how many new numbers were issued.
    pub fn assign_round(&mut self, answers: &[SubQuestionAnswer]) -> usize {
        let before = self.cited.len();
        for answer in answers {
            for section in answer.cited_sections() {
                self.assign(section);
            }
        }

        let assigned = self.cited.len() - before;
        metrics::record_citations(assigned);
        assigned
    }

    /// Number a ranked section list in order; idempotent like `assign`
    pub fn assign_all(&mut self, sections: &[RetrievedSection]) -> usize {
        let before = self.cited.len();
        for section in sections {
            self.assign(section);
        }
        self.cited.len() - before
    }

    pub fn number_of(&self, identity: &SectionIdentity) -> Option<u32> {
        self.numbers.get(identity).copied()
    }

    /// Answer text with local markers rewritten to run-scoped numbers.
    /// Markers without a number are dropped.
    pub fn render(&self, answer: &SubQuestionAnswer) -> String {
        let rendered = LOCAL_MARKER.replace_all(&answer.answer_text, |caps: &Captures| {
            caps[1]
                .parse::<usize>()
                .ok()
                .and_then(|k| answer.local_section(k))
                .and_then(|s| self.number_of(&s.identity()))
                .map(|n| format!("[{}]", n))
                .unwrap_or_default()
        });
        tidy(&rendered)
    }

    /// Drop `[n]` citations that were never assigned
    pub fn retain_known(&self, text: &str) -> String {
        let cleaned = CITATION.replace_all(text, |caps: &Captures| {
            match caps[1].parse::<usize>() {
                Ok(n) if n >= 1 && n <= self.cited.len() => caps[0].to_string(),
                _ => String::new(),
            }
        });
        tidy(&cleaned)
    }

    /// Cited sections ordered by citation number
    pub fn sections(&self) -> &[CitedSection] {
        &self.cited
    }

    pub fn into_sections(self) -> Vec<CitedSection> {
        self.cited
    }

    pub fn len(&self) -> usize {
        self.cited.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cited.is_empty()
    }
}

fn tidy(text: &str) -> String {
    text.replace("  ", " ").replace(" .", ".").replace(" ,", ",").trim().to_string()
}
