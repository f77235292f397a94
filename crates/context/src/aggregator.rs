//! Aggregator - append-only accumulation of sub-answers across rounds

use crate::budget::SufficiencySignal;
use citeforge_common::models::{ClaimRef, QuestionId, SubQuestionAnswer};

/// All sub-answers of a run, in round then dispatch order
#[derive(Debug, Clone, Default)]
pub struct Accumulator {
    answers: Vec<SubQuestionAnswer>,
    rounds: u32,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one completed round. Existing entries are never touched.
    pub fn merge(mut self, round_results: Vec<SubQuestionAnswer>) -> Self {
        self.rounds += 1;
        self.answers.extend(round_results);
        self
    }

    pub fn answers(&self) -> &[SubQuestionAnswer] {
        &self.answers
    }

    pub fn into_answers(self) -> Vec<SubQuestionAnswer> {
        self.answers
    }

    /// Rounds merged so far
    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    /// Answers of the most recent round
    pub fn latest_round(&self) -> &[SubQuestionAnswer] {
        let Some(last) = self.answers.last() else {
            return &[];
        };
        let start = self
            .answers
            .iter()
            .position(|a| a.round == last.round)
            .unwrap_or(0);
        &self.answers[start..]
    }

    /// Latest-round answers that are not fully answered
    pub fn open_gaps(&self) -> Vec<&SubQuestionAnswer> {
        self.latest_round()
            .iter()
            .filter(|a| !a.sufficiency.is_answered())
            .collect()
    }

    pub fn signal(&self) -> SufficiencySignal {
        SufficiencySignal {
            open_gaps: self.open_gaps().len(),
        }
    }

    /// Texts of every question answered so far
    pub fn asked_texts(&self) -> Vec<&str> {
        self.answers.iter().map(|a| a.question.text()).collect()
    }

    pub fn contains_question(&self, id: QuestionId) -> bool {
        self.answers.iter().any(|a| a.question_id() == id)
    }

    /// Claims of every non-degraded answer
    pub fn claims(&self) -> Vec<ClaimRef> {
        self.answers
            .iter()
            .filter(|a| !a.degraded)
            .flat_map(|a| {
                a.claims.iter().map(|c| ClaimRef {
                    question_id: a.question_id(),
                    text: c.clone(),
                })
            })
            .collect()
    }

    /// Whether at least one answer was produced without degrading
    pub fn has_successful_answer(&self) -> bool {
        self.answers.iter().any(|a| !a.degraded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use citeforge_common::models::{Question, SufficiencyVerdict};

    fn answer(round: u32, index: u32, verdict: SufficiencyVerdict) -> SubQuestionAnswer {
        let mut a = SubQuestionAnswer::degraded(
            Question::decomposed(QuestionId::new(round, index), format!("q{}.{}", round, index)),
            round,
            1,
            "gap",
        );
        a.degraded = false;
        a.sufficiency = verdict;
        a.claims = vec![format!("claim {}.{}", round, index)];
        a
    }

    #[test]
    fn test_merge_is_append_only() {
        let acc = Accumulator::new().merge(vec![answer(1, 1, SufficiencyVerdict::Answered)]);
        let first = acc.answers()[0].question_id();

        let acc = acc.merge(vec![
            answer(2, 1, SufficiencyVerdict::Answered),
            answer(2, 2, SufficiencyVerdict::Unanswered),
        ]);

        assert_eq!(acc.answers().len(), 3);
        assert_eq!(acc.answers()[0].question_id(), first);
        assert_eq!(acc.rounds(), 2);
    }

    #[test]
    fn test_open_gaps_only_from_latest_round() {
        let acc = Accumulator::new()
            .merge(vec![
                answer(1, 1, SufficiencyVerdict::Unanswered),
                answer(1, 2, SufficiencyVerdict::Answered),
            ])
            .merge(vec![
                answer(2, 1, SufficiencyVerdict::PartiallyAnswered),
                answer(2, 2, SufficiencyVerdict::Answered),
            ]);

        assert_eq!(acc.latest_round().len(), 2);
        let gaps: Vec<String> = acc.open_gaps().iter().map(|a| a.question_id().to_string()).collect();
        assert_eq!(gaps, vec!["2.1"]);
        assert_eq!(acc.signal().open_gaps, 1);
    }

    #[test]
    fn test_claims_skip_degraded() {
        let mut failed = answer(1, 2, SufficiencyVerdict::Unanswered);
        failed.degraded = true;
        let acc = Accumulator::new().merge(vec![answer(1, 1, SufficiencyVerdict::Answered), failed]);

        let claims = acc.claims();
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].question_id, QuestionId::new(1, 1));
        assert!(acc.has_successful_answer());
    }

    #[test]
    fn test_empty_accumulator() {
        let acc = Accumulator::new();
        assert!(acc.latest_round().is_empty());
        assert!(!acc.signal().has_gaps());
        assert!(!acc.has_successful_answer());
    }
}
