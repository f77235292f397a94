//! Query expansion

use super::{recover, CycleContext};
use crate::calls::bounded;
use crate::parsing::{dedup_texts, list_items};
use crate::prompts;
use citeforge_common::errors::Result;
use citeforge_common::llm::parse_json_response;
use citeforge_common::{LlmPurpose, LlmRequest};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ExpansionResponse {
    #[serde(default)]
    queries: Vec<String>,
}

/// Search variants for a sub-question. Falls back to the question text.
pub async fn expand(ctx: &CycleContext, question: &str) -> Result<Vec<String>> {
    let max_variants = ctx.config.max_query_variants;
    let request = LlmRequest::new(LlmPurpose::QueryExpansion, prompts::expansion(question, max_variants))
        .with_system_prompt(prompts::SYSTEM_PROMPT)
        .json();

    let raw = bounded(
        "query expansion",
        ctx.config.timeouts.expansion(),
        ctx.llm.invoke(&request),
    )
    .await;

    let variants = recover("query expansion", raw.map(|raw| parse_variants(&raw)), Vec::new())?;
    let mut variants = dedup_texts(variants);
    variants.truncate(max_variants);

    if variants.is_empty() {
        return Ok(vec![question.to_string()]);
    }
    Ok(variants)
}

fn parse_variants(raw: &str) -> Vec<String> {
    match parse_json_response::<ExpansionResponse>(raw, "query expansion") {
        Ok(response) => response.queries,
        Err(_) => list_items(raw),
    }
}
