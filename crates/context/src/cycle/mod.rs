//! Retrieval-Answer Cycle
//!
//! One cycle per sub-question:
//! expansion -> parallel retrieval -> verification -> rerank -> answer ->
//! sufficiency -> format.
//!
//! Recoverable failures degrade the step (or the whole cycle) instead of
//! failing it; only unrecoverable errors such as rejected credentials are
//! returned.

pub mod answer;
pub mod evidence;
pub mod expansion;
pub mod rerank;
pub mod retrieval;
pub mod sufficiency;
pub mod verification;

use crate::run_config::RunConfig;
use citeforge_common::errors::Result;
use citeforge_common::metrics;
use citeforge_common::models::{Question, RetrievedSection, SubQuestionAnswer};
use citeforge_common::{LlmClient, Reranker, SearchClient};
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Read-only context shared by every cycle of a run
pub struct CycleContext {
    pub run_id: Uuid,
    pub llm: Arc<dyn LlmClient>,
    pub search: Arc<dyn SearchClient>,
    pub reranker: Option<Arc<dyn Reranker>>,
    pub config: RunConfig,
}

/// Swallow a recoverable error, returning `fallback`
pub(crate) fn recover<T>(step: &str, result: Result<T>, fallback: T) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(e) if e.is_recoverable() => {
            tracing::warn!(step = step, error = %e, "Step failed, continuing with fallback");
            Ok(fallback)
        }
        Err(e) => Err(e),
    }
}

/// Run one full cycle for `question` in answering round `round`
pub async fn run_cycle(ctx: &CycleContext, question: Question, round: u32) -> Result<SubQuestionAnswer> {
    let span = tracing::info_span!(
        "cycle",
        run_id = %ctx.run_id,
        question_id = %question.id(),
        round = round
    );

    let start = Instant::now();
    let result = execute(ctx, question, round).instrument(span).await;

    if let Ok(answer) = &result {
        metrics::record_cycle(
            start.elapsed().as_secs_f64(),
            answer.sufficiency.as_str(),
            answer.degraded,
        );
    }

    result
}

async fn execute(ctx: &CycleContext, question: Question, round: u32) -> Result<SubQuestionAnswer> {
    let cost = ctx.config.cost_per_sub_question;
    let text = question.text().to_string();

    let variants = expansion::expand(ctx, &text).await?;
    let retrieved = retrieval::retrieve(ctx, &variants).await?;

    let verified = if ctx.config.verification_enabled {
        verification::verify(ctx, &text, retrieved).await?
    } else {
        retrieved
    };

    if verified.is_empty() {
        tracing::info!("No relevant passages, degrading sub-question");
        return Ok(SubQuestionAnswer::degraded(
            question,
            round,
            cost,
            "No relevant passages were found",
        ));
    }

    let ranked = rerank::rank(ctx, &text, verified).await?;

    let generated = match answer::generate(ctx, &text, &ranked).await {
        Ok(generated) => generated,
        Err(e) if e.is_recoverable() => {
            tracing::warn!(error = %e, "Answer generation failed, degrading sub-question");
            return Ok(SubQuestionAnswer::degraded(
                question,
                round,
                cost,
                "Answer generation failed",
            ));
        }
        Err(e) => return Err(e),
    };

    let assessment = sufficiency::check(ctx, &text, &generated.text).await?;

    tracing::info!(
        sections = ranked.len(),
        cited = generated.cited.len(),
        verdict = assessment.verdict.as_str(),
        "Cycle complete"
    );

    Ok(format(question, round, cost, ranked, generated, assessment))
}

/// Package the cycle output; cited ids follow section rank
fn format(
    question: Question,
    round: u32,
    cost: u32,
    sections: Vec<RetrievedSection>,
    generated: answer::GeneratedAnswer,
    assessment: sufficiency::Assessment,
) -> SubQuestionAnswer {
    let cited_section_ids = generated
        .cited
        .iter()
        .filter_map(|&k| sections.get(k - 1))
        .map(RetrievedSection::identity)
        .collect();

    SubQuestionAnswer {
        question,
        round,
        answer_text: generated.text,
        sections,
        cited_section_ids,
        claims: generated.claims,
        sufficiency: assessment.verdict,
        gap: assessment.gap,
        cost,
        degraded: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context_with, section, FakeSearch, ScriptedLlm};
    use citeforge_common::models::{QuestionId, SectionIdentity, SufficiencyVerdict};
    use citeforge_common::{AppError, LlmPurpose};

    fn answering_llm() -> ScriptedLlm {
        ScriptedLlm::new()
            .on(LlmPurpose::QueryExpansion, r#"{"queries": ["refund policy"]}"#)
            .on(LlmPurpose::Verification, r#"{"relevant": true}"#)
            .on(
                LlmPurpose::AnswerGeneration,
                r#"{"answer": "Refunds within 30 days [D1], as store credit [D3].", "cited": [3, 1], "claims": ["Refunds within 30 days"]}"#,
            )
            .on(LlmPurpose::Sufficiency, r#"{"verdict": "ANSWERED"}"#)
    }

    fn refund_search() -> FakeSearch {
        FakeSearch::new().on(
            "refund",
            vec![section("a", 0, 0.9), section("b", 0, 0.7), section("c", 0, 0.5)],
        )
    }

    #[tokio::test]
    async fn test_full_cycle() {
        let ctx = context_with(answering_llm(), refund_search());
        let question = Question::decomposed(QuestionId::new(1, 1), "What is the refund policy?");

        let answer = run_cycle(&ctx, question, 1).await.unwrap();
        assert!(!answer.degraded);
        assert_eq!(answer.sufficiency, SufficiencyVerdict::Answered);
        assert_eq!(answer.sections.len(), 3);
        assert_eq!(
            answer.cited_section_ids,
            vec![SectionIdentity::new("a", 0), SectionIdentity::new("c", 0)]
        );
        assert_eq!(answer.cost, 1);
    }

    #[tokio::test]
    async fn test_no_sections_degrades() {
        let ctx = context_with(answering_llm(), FakeSearch::new().fail_all());
        let answer = run_cycle(&ctx, Question::original("q"), 1).await.unwrap();

        assert!(answer.degraded);
        assert_eq!(answer.sufficiency, SufficiencyVerdict::Unanswered);
        assert!(answer.cited_section_ids.is_empty());
        assert!(answer.gap.is_some());
    }

    #[tokio::test]
    async fn test_answer_failure_degrades() {
        let llm = answering_llm().fail(LlmPurpose::AnswerGeneration);
        let ctx = context_with(llm, refund_search());
        let answer = run_cycle(&ctx, Question::original("refund?"), 1).await.unwrap();

        assert!(answer.degraded);
        assert!(answer.cited_section_ids.is_empty());
    }

    #[tokio::test]
    async fn test_verification_disabled_skips_llm() {
        let llm = answering_llm();
        let mut ctx = context_with(llm.clone(), refund_search());
        ctx.config.verification_enabled = false;

        let answer = run_cycle(&ctx, Question::original("refund?"), 1).await.unwrap();
        assert_eq!(llm.calls(LlmPurpose::Verification), 0);
        assert!(answer
            .sections
            .iter()
            .all(|s| s.verification == citeforge_common::models::VerificationVerdict::Unverified));
    }

    #[tokio::test]
    async fn test_unauthorized_is_returned() {
        let ctx = context_with(ScriptedLlm::new().reject_credentials(), refund_search());
        let err = run_cycle(&ctx, Question::original("refund?"), 1).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized { .. }));
    }
}
