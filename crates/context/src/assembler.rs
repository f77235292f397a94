//! Final Assembler - synthesis, contradiction detection and the run result

use crate::aggregator::Accumulator;
use crate::calls::bounded;
use crate::citations::CitationRegistry;
use crate::prompts;
use crate::run_config::RunConfig;
use chrono::Utc;
use citeforge_common::llm::invoke_json;
use citeforge_common::models::{
    Clarification, ClaimRef, Contradiction, LogEntry, Question, QuestionId, RetrievedSection,
    RunResult, SubQuestionAnswer, Termination,
};
use citeforge_common::{LlmClient, LlmPurpose, LlmRequest};
use serde::Deserialize;
use std::collections::HashSet;
use uuid::Uuid;

/// Text emitted when no sub-answer produced anything usable
pub const NO_ANSWER_NOTICE: &str =
    "No answer could be produced: none of the searched documents addressed the question.";

/// Everything the assembler consumes, handed over by the planner
pub struct AssemblyInput {
    pub run_id: Uuid,
    pub question: Question,
    pub accumulator: Accumulator,
    pub registry: CitationRegistry,
    /// Sections retrieved for the original question; must already be
    /// numbered in `registry`
    pub evidence: Vec<RetrievedSection>,
    pub termination: Termination,
    pub log: Vec<LogEntry>,
}

/// Build the terminal `RunResult`. Never fails: synthesis falls back to a
/// deterministic rendering and contradiction detection to empty lists.
pub async fn assemble(llm: &dyn LlmClient, config: &RunConfig, input: AssemblyInput) -> RunResult {
    let AssemblyInput {
        run_id,
        question,
        accumulator,
        registry,
        evidence,
        termination,
        mut log,
    } = input;

    let started = Utc::now();
    let (final_answer_text, synthesized) =
        synthesize(llm, config, &question, &accumulator, &registry, &evidence).await;
    log.push(LogEntry::finish(
        "assembler",
        "synthesis",
        started,
        Some(if synthesized { "llm" } else { "fallback" }.to_string()),
    ));

    let started = Utc::now();
    let claims = accumulator.claims();
    let (contradictions, clarifications) = if config.contradiction_detection_enabled && claims.len() >= 2 {
        detect_contradictions(llm, config, &claims).await
    } else {
        (Vec::new(), Vec::new())
    };
    log.push(LogEntry::finish(
        "assembler",
        "contradiction detection",
        started,
        Some(format!("{} contradictions, {} clarifications", contradictions.len(), clarifications.len())),
    ));

    let possibly_incomplete = termination.is_early() || !accumulator.has_successful_answer();

    tracing::info!(
        run_id = %run_id,
        citations = registry.len(),
        sub_answers = accumulator.answers().len(),
        contradictions = contradictions.len(),
        possibly_incomplete = possibly_incomplete,
        "Run assembled"
    );

    RunResult {
        run_id,
        question: question.text().to_string(),
        final_answer_text,
        all_cited_sections: registry.into_sections(),
        contradictions,
        clarifications,
        sub_answers: accumulator.into_answers(),
        termination,
        possibly_incomplete,
        log,
    }
}

/// Split usable answers into primary findings and supporting detail.
///
/// An answer is supporting when a later, non-degraded answer refines it.
/// Primary answers are listed latest round first.
fn rank_answers(answers: &[SubQuestionAnswer]) -> (Vec<&SubQuestionAnswer>, Vec<&SubQuestionAnswer>) {
    let refined_parents: HashSet<QuestionId> = answers
        .iter()
        .filter(|a| !a.degraded)
        .filter_map(|a| a.question.parent_id().filter(|p| p.round < a.round))
        .collect();

    let usable = answers.iter().filter(|a| !a.degraded && !a.answer_text.is_empty());
    let (supporting, mut primary): (Vec<_>, Vec<_>) =
        usable.partition(|a| refined_parents.contains(&a.question_id()));

    primary.sort_by(|a, b| b.round.cmp(&a.round).then(a.question_id().cmp(&b.question_id())));
    (primary, supporting)
}

fn finding(registry: &CitationRegistry, answer: &SubQuestionAnswer) -> String {
    format!("{}: {}", answer.question.text(), registry.render(answer))
}

/// Final text and whether the LLM produced it
async fn synthesize(
    llm: &dyn LlmClient,
    config: &RunConfig,
    question: &Question,
    accumulator: &Accumulator,
    registry: &CitationRegistry,
    evidence: &[RetrievedSection],
) -> (String, bool) {
    let (primary, supporting) = rank_answers(accumulator.answers());
    let evidence: Vec<(u32, &RetrievedSection)> = evidence
        .iter()
        .filter_map(|s| registry.number_of(&s.identity()).map(|n| (n, s)))
        .collect();

    if primary.is_empty() && evidence.is_empty() {
        return (NO_ANSWER_NOTICE.to_string(), false);
    }

    let primary: Vec<String> = primary.iter().map(|a| finding(registry, a)).collect();
    let supporting: Vec<String> = supporting.iter().map(|a| finding(registry, a)).collect();
    let unresolved: Vec<&str> = accumulator
        .answers()
        .iter()
        .filter(|a| a.degraded)
        .map(|a| a.question.text())
        .collect();
    let sources: Vec<(u32, &_)> = registry
        .sections()
        .iter()
        .map(|c| (c.citation.number, &c.section))
        .collect();

    let request = LlmRequest::new(
        LlmPurpose::Synthesis,
        prompts::synthesis(question.text(), &primary, &supporting, &unresolved, &evidence, &sources),
    )
    .with_system_prompt(prompts::SYSTEM_PROMPT);

    match bounded("synthesis", config.timeouts.synthesis(), llm.invoke(&request)).await {
        Ok(text) if !text.trim().is_empty() => (registry.retain_known(text.trim()), true),
        Ok(_) => {
            tracing::warn!("Synthesis returned no text, using fallback");
            (fallback_text(&primary, &supporting), false)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Synthesis failed, using fallback");
            (fallback_text(&primary, &supporting), false)
        }
    }
}

/// Primary findings, then supporting detail
fn fallback_text(primary: &[String], supporting: &[String]) -> String {
    if primary.is_empty() {
        return NO_ANSWER_NOTICE.to_string();
    }

    let mut text = primary.join("\n\n");
    if !supporting.is_empty() {
        text.push_str("\n\nSupporting detail:\n\n");
        text.push_str(&supporting.join("\n\n"));
    }
    text
}

#[derive(Debug, Default, Deserialize)]
struct ContradictionResponse {
    #[serde(default)]
    contradictions: Vec<ContradictionItem>,
    #[serde(default)]
    clarifications: Vec<ClarificationItem>,
}

#[derive(Debug, Deserialize)]
struct ContradictionItem {
    claims: Vec<usize>,
    #[serde(default)]
    explanation: String,
}

#[derive(Debug, Deserialize)]
struct ClarificationItem {
    claim: usize,
    #[serde(default)]
    reason: String,
}

async fn detect_contradictions(
    llm: &dyn LlmClient,
    config: &RunConfig,
    claims: &[ClaimRef],
) -> (Vec<Contradiction>, Vec<Clarification>) {
    let texts: Vec<String> = claims.iter().map(|c| c.text.clone()).collect();
    let request = LlmRequest::new(LlmPurpose::ContradictionDetection, prompts::contradiction(&texts))
        .with_system_prompt(prompts::SYSTEM_PROMPT)
        .json();

    let parsed = bounded(
        "contradiction detection",
        config.timeouts.contradiction(),
        invoke_json::<ContradictionResponse>(llm, &request),
    )
    .await;

    let response = match parsed {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(error = %e, "Contradiction detection failed, reporting none");
            return (Vec::new(), Vec::new());
        }
    };

    let claim = |n: usize| n.checked_sub(1).and_then(|i| claims.get(i)).cloned();

    let contradictions = response
        .contradictions
        .into_iter()
        .filter_map(|item| {
            let mut numbers = item.claims;
            numbers.sort_unstable();
            numbers.dedup();
            let refs: Vec<ClaimRef> = numbers.into_iter().filter_map(claim).collect();
            (refs.len() >= 2).then(|| Contradiction {
                claims: refs,
                explanation: item.explanation,
            })
        })
        .collect();

    let clarifications = response
        .clarifications
        .into_iter()
        .filter_map(|item| {
            claim(item.claim).map(|c| Clarification {
                claim: c,
                reason: item.reason,
            })
        })
        .collect();

    (contradictions, clarifications)
}
