//! Sub-Question Runner - fan-out / fan-in of one answering round

use crate::cycle::{run_cycle, CycleContext};
use citeforge_common::errors::{AppError, Result};
use citeforge_common::models::{Question, SubQuestionAnswer};
use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Results of one answering round, in dispatch order
#[derive(Debug)]
pub struct RoundOutcome {
    pub round: u32,
    pub answers: Vec<SubQuestionAnswer>,

    /// First unrecoverable failure of the round, if any. The failing cycle
    /// still has a degraded answer in `answers`.
    pub interface_failure: Option<AppError>,
}

impl RoundOutcome {
    pub fn cost(&self) -> u32 {
        self.answers.iter().map(|a| a.cost).sum()
    }
}

/// Dispatch one cycle per question and wait for all of them.
///
/// Returns only after every cycle produced a result (the fan-in barrier).
/// On cancellation the in-flight cycles are dropped and
/// `AppError::Cancelled` is returned; nothing of the round survives.
pub async fn dispatch_round(
    ctx: Arc<CycleContext>,
    questions: Vec<Question>,
    round: u32,
    token: &CancellationToken,
) -> Result<RoundOutcome> {
    tracing::info!(round = round, sub_questions = questions.len(), "Dispatching round");

    let cycles = questions.iter().cloned().map(|question| {
        let ctx = Arc::clone(&ctx);
        async move { run_cycle(&ctx, question, round).await }
    });

    let results = tokio::select! {
        biased;
        _ = token.cancelled() => {
            tracing::info!(round = round, "Round cancelled, discarding partial results");
            return Err(AppError::Cancelled);
        }
        results = join_all(cycles) => results,
    };

    let mut answers = Vec::with_capacity(results.len());
    let mut interface_failure = None;

    for (question, result) in questions.into_iter().zip(results) {
        match result {
            Ok(answer) => answers.push(answer),
            Err(e) => {
                tracing::error!(question_id = %question.id(), error = %e, "Cycle failed unrecoverably");
                let gap = format!("Interface failure: {}", e);
                answers.push(SubQuestionAnswer::degraded(
                    question,
                    round,
                    ctx.config.cost_per_sub_question,
                    gap,
                ));
                interface_failure.get_or_insert(e);
            }
        }
    }

    Ok(RoundOutcome {
        round,
        answers,
        interface_failure,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context_with, section, FakeSearch, ScriptedLlm};
    use citeforge_common::models::QuestionId;
    use citeforge_common::LlmPurpose;
    use std::time::Duration;

    fn questions(texts: &[&str]) -> Vec<Question> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Question::decomposed(QuestionId::new(1, i as u32 + 1), *t))
            .collect()
    }

    fn llm() -> ScriptedLlm {
        ScriptedLlm::new()
            .on(LlmPurpose::Verification, r#"{"relevant": true}"#)
            .on(LlmPurpose::AnswerGeneration, r#"{"answer": "It is so [D1].", "cited": [1]}"#)
            .on(LlmPurpose::Sufficiency, r#"{"verdict": "ANSWERED"}"#)
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_in_dispatch_order_not_completion_order() {
        // The first question's answer is slowest
        let llm = llm()
            .delay_prompt_for(LlmPurpose::AnswerGeneration, "slow topic", Duration::from_secs(5))
            .delay_prompt_for(LlmPurpose::AnswerGeneration, "fast topic", Duration::from_secs(2))
            .delay_prompt_for(LlmPurpose::AnswerGeneration, "fast again", Duration::from_secs(1));
        let search = FakeSearch::new()
            .on("slow", vec![section("s", 0, 0.9)])
            .on("fast", vec![section("f", 0, 0.9)]);
        let ctx = Arc::new(context_with(llm, search));
        let started = tokio::time::Instant::now();

        let outcome = dispatch_round(
            ctx,
            questions(&["slow topic", "fast topic", "fast again"]),
            1,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        // Cycles overlap: the round lasts as long as its slowest cycle
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_secs(8));

        let ids: Vec<String> = outcome.answers.iter().map(|a| a.question_id().to_string()).collect();
        assert_eq!(ids, vec!["1.1", "1.2", "1.3"]);
        assert!(outcome.answers.iter().all(|a| !a.degraded));
        assert_eq!(outcome.cost(), 3);
    }

    #[tokio::test]
    async fn test_failed_cycles_still_produce_results() {
        let ctx = Arc::new(context_with(llm(), FakeSearch::new().fail_all()));
        let outcome = dispatch_round(ctx, questions(&["a", "b"]), 1, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.answers.len(), 2);
        assert!(outcome.answers.iter().all(|a| a.degraded));
        assert!(outcome.interface_failure.is_none());
    }

    #[tokio::test]
    async fn test_unrecoverable_failure_reported() {
        let search = FakeSearch::new().on("a", vec![section("x", 0, 0.5)]);
        let ctx = Arc::new(context_with(ScriptedLlm::new().reject_credentials(), search));
        let outcome = dispatch_round(ctx, questions(&["a"]), 1, &CancellationToken::new())
            .await
            .unwrap();

        assert!(outcome.answers[0].degraded);
        assert!(matches!(outcome.interface_failure, Some(AppError::Unauthorized { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_discards_round() {
        let llm = llm().delay(LlmPurpose::QueryExpansion, Duration::from_secs(60));
        let ctx = Arc::new(context_with(llm, FakeSearch::new()));
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            canceller.cancel();
        });

        let err = dispatch_round(ctx, questions(&["a", "b"]), 1, &token).await.unwrap_err();
        assert!(err.is_cancelled());
    }
}
