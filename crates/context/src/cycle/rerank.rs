//! Reranking and truncation

use super::CycleContext;
use crate::calls::bounded;
use citeforge_common::errors::Result;
use citeforge_common::models::RetrievedSection;

/// Rerank, stable-sort by descending score and keep the top sections.
///
/// The reranker is skipped for fewer than two sections. A recoverable
/// reranker failure keeps the retrieval scores.
pub async fn rank(
    ctx: &CycleContext,
    question: &str,
    sections: Vec<RetrievedSection>,
) -> Result<Vec<RetrievedSection>> {
    let mut ranked = match &ctx.reranker {
        Some(reranker) if sections.len() >= 2 => {
            let fallback = sections.clone();
            match bounded(
                "rerank",
                ctx.config.timeouts.rerank(),
                reranker.rerank(question, sections),
            )
            .await
            {
                Ok(reranked) => reranked,
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(reranker = reranker.name(), error = %e, "Rerank failed, keeping retrieval scores");
                    fallback
                }
                Err(e) => return Err(e),
            }
        }
        _ => sections,
    };

    sort_by_score(&mut ranked);
    ranked.truncate(ctx.config.max_sections_per_answer);
    Ok(ranked)
}

/// Stable sort, descending score; ties keep their current order
pub fn sort_by_score(sections: &mut [RetrievedSection]) {
    sections.sort_by(|a, b| b.score.total_cmp(&a.score));
}
