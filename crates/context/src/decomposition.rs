//! Decomposer - original question into sub-questions

use crate::calls::bounded;
use crate::parsing::{dedup_texts, list_items};
use crate::prompts;
use crate::run_config::RunConfig;
use citeforge_common::errors::Result;
use citeforge_common::llm::parse_json_response;
use citeforge_common::models::{Question, QuestionId};
use citeforge_common::{LlmClient, LlmPurpose, LlmRequest};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct DecompositionResponse {
    #[serde(default)]
    questions: Vec<String>,
}

/// Decompose `original` into first-round sub-questions `1.1 ..= 1.N`.
///
/// A recoverable failure falls back to the original question itself.
/// An empty list means the model found nothing to ask.
pub async fn decompose(llm: &dyn LlmClient, original: &Question, config: &RunConfig) -> Result<Vec<Question>> {
    let request = LlmRequest::new(
        LlmPurpose::Decomposition,
        prompts::decomposition(original.text(), config.max_sub_questions),
    )
    .with_system_prompt(prompts::SYSTEM_PROMPT)
    .json();

    let raw = match bounded("decomposition", config.timeouts.decomposition(), llm.invoke(&request)).await {
        Ok(raw) => raw,
        Err(e) if e.is_recoverable() => {
            tracing::warn!(error = %e, "Decomposition failed, answering the original question directly");
            return Ok(vec![original.clone()]);
        }
        Err(e) => return Err(e),
    };

    let mut texts = dedup_texts(parse_questions(&raw));
    texts.truncate(config.max_sub_questions);

    let questions: Vec<Question> = texts
        .into_iter()
        .enumerate()
        .map(|(i, text)| Question::decomposed(QuestionId::new(1, i as u32 + 1), text))
        .collect();

    tracing::info!(sub_questions = questions.len(), "Question decomposed");
    Ok(questions)
}

fn parse_questions(raw: &str) -> Vec<String> {
    match parse_json_response::<DecompositionResponse>(raw, "decomposition") {
        Ok(response) => response.questions,
        Err(_) => list_items(raw),
    }
}
