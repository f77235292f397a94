//! Answer generation over the reranked sections

use super::CycleContext;
use crate::calls::bounded;
use crate::citations::local_markers;
use crate::parsing::sentence_claims;
use crate::prompts;
use citeforge_common::errors::Result;
use citeforge_common::llm::parse_json_response;
use citeforge_common::models::RetrievedSection;
use citeforge_common::{LlmPurpose, LlmRequest};
use serde::Deserialize;

/// Answer with local `[D<k>]` markers
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAnswer {
    pub text: String,

    /// Cited markers (1-based), ascending, all within the section list
    pub cited: Vec<usize>,

    pub claims: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AnswerResponse {
    answer: String,
    #[serde(default)]
    cited: Vec<usize>,
    #[serde(default)]
    claims: Vec<String>,
}

/// Generate the answer. Any failure is returned to the caller, which
/// degrades the cycle.
pub async fn generate(ctx: &CycleContext, question: &str, sections: &[RetrievedSection]) -> Result<GeneratedAnswer> {
    let request = LlmRequest::new(LlmPurpose::AnswerGeneration, prompts::answer(question, sections))
        .with_system_prompt(prompts::SYSTEM_PROMPT)
        .json();

    let raw = bounded(
        "answer generation",
        ctx.config.timeouts.answer(),
        ctx.llm.invoke(&request),
    )
    .await?;

    Ok(parse_answer(&raw, sections.len()))
}

fn parse_answer(raw: &str, section_count: usize) -> GeneratedAnswer {
    let (text, mut cited, claims) = match parse_json_response::<AnswerResponse>(raw, "answer generation") {
        Ok(response) => (response.answer, response.cited, response.claims),
        Err(_) => (raw.trim().to_string(), Vec::new(), Vec::new()),
    };

    cited.extend(local_markers(&text));
    cited.retain(|&k| k >= 1 && k <= section_count);
    cited.sort_unstable();
    cited.dedup();

    let claims = if claims.is_empty() {
        sentence_claims(&text)
    } else {
        claims.into_iter().map(|c| c.trim().to_string()).filter(|c| !c.is_empty()).collect()
    };

    GeneratedAnswer { text, cited, claims }
}
