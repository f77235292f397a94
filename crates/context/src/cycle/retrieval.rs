//! Parallel retrieval over all query variants

use super::CycleContext;
use crate::calls::bounded;
use citeforge_common::errors::Result;
use citeforge_common::models::RetrievedSection;
use futures::future::join_all;
use std::collections::HashSet;

/// Issue every variant concurrently and merge the results.
///
/// Results are merged in variant order, then retrieval order; the first
/// occurrence of a section identity wins. A failing variant contributes
/// nothing. Only an unrecoverable failure is returned as an error.
pub async fn retrieve(ctx: &CycleContext, variants: &[String]) -> Result<Vec<RetrievedSection>> {
    let timeout = ctx.config.timeouts.search();
    let searches = variants.iter().map(|query| {
        bounded(
            "search",
            timeout,
            ctx.search.retrieve(query, &ctx.config.filters),
        )
    });

    let results = join_all(searches).await;

    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    let mut failed = 0usize;

    for (query, result) in variants.iter().zip(results) {
        match result {
            Ok(sections) => {
                for section in sections {
                    if seen.insert(section.identity()) {
                        merged.push(section);
                    }
                }
            }
            Err(e) if e.is_recoverable() => {
                failed += 1;
                tracing::warn!(query = %query, error = %e, "Search variant failed");
            }
            Err(e) => return Err(e),
        }
    }

    tracing::debug!(
        variants = variants.len(),
        failed = failed,
        sections = merged.len(),
        "Retrieval merged"
    );

    Ok(merged)
}
