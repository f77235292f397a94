//! Refinement Generator - follow-up questions for unresolved gaps

use crate::aggregator::Accumulator;
use crate::calls::bounded;
use crate::parsing::list_items;
use crate::prompts::{self, GapLine};
use crate::run_config::RunConfig;
use citeforge_common::errors::Result;
use citeforge_common::llm::parse_json_response;
use citeforge_common::models::{Question, QuestionId};
use citeforge_common::{LlmClient, LlmPurpose, LlmRequest};
use serde::Deserialize;
use std::collections::HashSet;

#[derive(Debug, Deserialize)]
struct RefinementResponse {
    #[serde(default)]
    questions: Vec<RefinedItem>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RefinedItem {
    Detailed {
        question: String,
        #[serde(default)]
        addresses: Option<String>,
    },
    Plain(String),
}

/// Refined questions for the open gaps of the latest round.
///
/// Questions are numbered `round.1 ..` and never repeat a question already
/// asked in the run. A recoverable failure yields no questions.
pub async fn refine(
    llm: &dyn LlmClient,
    original: &Question,
    accumulator: &Accumulator,
    round: u32,
    config: &RunConfig,
) -> Result<Vec<Question>> {
    let open = accumulator.open_gaps();
    if open.is_empty() || config.max_refined_questions == 0 {
        return Ok(Vec::new());
    }

    let gaps: Vec<GapLine<'_>> = open
        .iter()
        .map(|a| GapLine {
            question_id: a.question_id().to_string(),
            question: a.question.text(),
            gap: a.gap.as_deref().unwrap_or("the answer may be incomplete"),
        })
        .collect();

    let mut asked = vec![original.text()];
    asked.extend(accumulator.asked_texts());

    let request = LlmRequest::new(
        LlmPurpose::Refinement,
        prompts::refinement(original.text(), &gaps, &asked, config.max_refined_questions),
    )
    .with_system_prompt(prompts::SYSTEM_PROMPT)
    .json();

    let raw = match bounded("refinement", config.timeouts.refinement(), llm.invoke(&request)).await {
        Ok(raw) => raw,
        Err(e) if e.is_recoverable() => {
            tracing::warn!(error = %e, "Refinement failed, no follow-up questions");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    let mut seen: HashSet<String> = asked.iter().map(|t| t.trim().to_string()).collect();
    let mut questions = Vec::new();

    for (text, addresses) in parse_items(&raw) {
        if questions.len() >= config.max_refined_questions {
            break;
        }
        let text = text.trim().to_string();
        if text.is_empty() || !seen.insert(text.clone()) {
            continue;
        }

        let parent = addresses
            .as_deref()
            .and_then(parse_reference)
            .filter(|id| accumulator.contains_question(*id))
            .unwrap_or(QuestionId::ORIGINAL);

        let id = QuestionId::new(round, questions.len() as u32 + 1);
        questions.push(Question::refined(id, text, parent));
    }

    tracing::info!(round = round, refined = questions.len(), "Refined questions generated");
    Ok(questions)
}

fn parse_items(raw: &str) -> Vec<(String, Option<String>)> {
    match parse_json_response::<RefinementResponse>(raw, "refinement") {
        Ok(response) => response
            .questions
            .into_iter()
            .map(|item| match item {
                RefinedItem::Detailed { question, addresses } => (question, addresses),
                RefinedItem::Plain(question) => (question, None),
            })
            .collect(),
        Err(_) => list_items(raw).into_iter().map(|q| (q, None)).collect(),
    }
}

/// Accepts `1.2`, `[1.2]` or `Q1.2`
fn parse_reference(value: &str) -> Option<QuestionId> {
    let cleaned = value.trim().trim_matches(['[', ']']).trim_start_matches(['Q', 'q']);
    QuestionId::parse(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use citeforge_common::models::{QuestionKind, SubQuestionAnswer, SufficiencyVerdict};
    use crate::testing::ScriptedLlm;

    fn accumulator() -> Accumulator {
        let mut partial = SubQuestionAnswer::degraded(
            Question::decomposed(QuestionId::new(1, 2), "Who approves refunds?"),
            1,
            1,
            "approver role not named",
        );
        partial.degraded = false;
        partial.sufficiency = SufficiencyVerdict::PartiallyAnswered;

        let mut answered = partial.clone();
        answered.question = Question::decomposed(QuestionId::new(1, 1), "Refund window?");
        answered.sufficiency = SufficiencyVerdict::Answered;
        answered.gap = None;

        Accumulator::new().merge(vec![answered, partial])
    }

    #[tokio::test]
    async fn test_refined_questions_with_parents() {
        let llm = ScriptedLlm::new().on(
            LlmPurpose::Refinement,
            r#"{"questions": [
                {"question": "Which role signs off refunds?", "addresses": "1.2"},
                {"question": "Refund window?", "addresses": "1.1"},
                {"question": "Are refunds audited?", "addresses": "9.9"},
                {"question": "Which role signs off refunds?"}
            ]}"#,
        );
        let original = Question::original("What is the refund policy?");

        let refined = refine(&llm, &original, &accumulator(), 2, &RunConfig::default()).await.unwrap();

        let texts: Vec<&str> = refined.iter().map(|q| q.text()).collect();
        assert_eq!(texts, vec!["Which role signs off refunds?", "Are refunds audited?"]);
        assert_eq!(refined[0].id(), QuestionId::new(2, 1));
        assert_eq!(refined[0].parent_id(), Some(QuestionId::new(1, 2)));
        assert_eq!(refined[1].id(), QuestionId::new(2, 2));
        assert_eq!(refined[1].parent_id(), Some(QuestionId::ORIGINAL));
        assert!(refined.iter().all(|q| q.kind() == QuestionKind::Refined));
    }

    #[tokio::test]
    async fn test_prompt_carries_gap() {
        let llm = ScriptedLlm::new().on(LlmPurpose::Refinement, r#"{"questions": []}"#);
        let refined = refine(&llm, &Question::original("q"), &accumulator(), 2, &RunConfig::default())
            .await
            .unwrap();

        assert!(refined.is_empty());
        assert!(llm.prompts(LlmPurpose::Refinement)[0].contains("approver role not named"));
    }

    #[tokio::test]
    async fn test_capped_and_list_fallback() {
        let llm = ScriptedLlm::new().on(LlmPurpose::Refinement, "- a?\n- b?\n- c?");
        let config = RunConfig {
            max_refined_questions: 2,
            ..RunConfig::default()
        };
        let refined = refine(&llm, &Question::original("q"), &accumulator(), 2, &config).await.unwrap();
        assert_eq!(refined.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_yields_nothing() {
        let llm = ScriptedLlm::new().fail(LlmPurpose::Refinement);
        let refined = refine(&llm, &Question::original("q"), &accumulator(), 2, &RunConfig::default())
            .await
            .unwrap();
        assert!(refined.is_empty());
    }

    #[test]
    fn test_parse_reference() {
        assert_eq!(parse_reference("[1.2]"), Some(QuestionId::new(1, 2)));
        assert_eq!(parse_reference("Q2.1"), Some(QuestionId::new(2, 1)));
        assert_eq!(parse_reference("gap one"), None);
    }
}
