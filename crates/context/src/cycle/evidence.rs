//! Direct evidence: one retrieval pass over the original question, run
//! alongside decomposition. Its sections only reach final synthesis.

use super::{rerank, retrieval, verification, CycleContext};
use citeforge_common::errors::Result;
use citeforge_common::models::RetrievedSection;
use tracing::Instrument;

/// Verified, ranked sections for the question as asked.
///
/// Never fails: any error, recoverable or not, leaves the run without
/// direct evidence. Unrecoverable interface failures surface through the
/// sub-question path instead.
pub async fn gather(ctx: &CycleContext, question: &str) -> Vec<RetrievedSection> {
    let span = tracing::info_span!("direct_retrieval", run_id = %ctx.run_id);

    match collect(ctx, question).instrument(span).await {
        Ok(sections) => {
            tracing::info!(run_id = %ctx.run_id, sections = sections.len(), "Direct evidence gathered");
            sections
        }
        Err(e) => {
            tracing::warn!(run_id = %ctx.run_id, error = %e, "Direct retrieval failed, continuing without it");
            Vec::new()
        }
    }
}

async fn collect(ctx: &CycleContext, question: &str) -> Result<Vec<RetrievedSection>> {
    let retrieved = retrieval::retrieve(ctx, &[question.to_string()]).await?;

    let verified = if ctx.config.verification_enabled && !retrieved.is_empty() {
        verification::verify(ctx, question, retrieved).await?
    } else {
        retrieved
    };

    if verified.is_empty() {
        return Ok(verified);
    }
    rerank::rank(ctx, question, verified).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{context_with, section, FakeSearch, ScriptedLlm};
    use citeforge_common::LlmPurpose;

    #[tokio::test]
    async fn test_gathers_verified_sections_in_rank_order() {
        let llm = ScriptedLlm::new()
            .on(LlmPurpose::Verification, r#"{"relevant": true}"#)
            .on_prompt(LlmPurpose::Verification, "Content of blog", r#"{"relevant": false}"#);
        let search = FakeSearch::new().on(
            "refund",
            vec![section("faq", 0, 0.4), section("blog", 0, 0.8), section("policy", 2, 0.9)],
        );
        let ctx = context_with(llm, search.clone());

        let evidence = gather(&ctx, "What is the refund policy?").await;

        let docs: Vec<&str> = evidence.iter().map(|s| s.doc_id.as_str()).collect();
        assert_eq!(docs, vec!["policy", "faq"]);
        assert_eq!(search.queries(), vec!["What is the refund policy?"]);
    }

    #[tokio::test]
    async fn test_search_failure_yields_no_evidence() {
        let ctx = context_with(ScriptedLlm::new(), FakeSearch::new().fail_all());
        assert!(gather(&ctx, "What is the refund policy?").await.is_empty());
    }

    #[tokio::test]
    async fn test_rejected_credentials_yield_no_evidence() {
        let search = FakeSearch::new().on("refund", vec![section("policy", 0, 0.9)]);
        let ctx = context_with(ScriptedLlm::new().reject_credentials(), search);
        assert!(gather(&ctx, "What is the refund policy?").await.is_empty());
    }
}
