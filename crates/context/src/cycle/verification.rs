//! Relevance verification of retrieved sections

use super::CycleContext;
use crate::calls::bounded;
use crate::prompts;
use citeforge_common::errors::Result;
use citeforge_common::llm::parse_json_response;
use citeforge_common::models::{RetrievedSection, VerificationVerdict};
use citeforge_common::{LlmPurpose, LlmRequest};
use futures::future::join_all;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct VerificationResponse {
    relevant: bool,
}

/// Judge every section concurrently and drop the irrelevant ones.
///
/// A failed judgment is neutral: the section stays, marked `Unverified`.
pub async fn verify(
    ctx: &CycleContext,
    question: &str,
    sections: Vec<RetrievedSection>,
) -> Result<Vec<RetrievedSection>> {
    let judgments = sections.iter().map(|section| judge(ctx, question, section));
    let verdicts = join_all(judgments).await;

    let mut kept = Vec::with_capacity(sections.len());
    let mut dropped = 0usize;

    for (section, verdict) in sections.into_iter().zip(verdicts) {
        match verdict {
            Ok(VerificationVerdict::NotRelevant) => dropped += 1,
            Ok(verdict) => kept.push(section.with_verdict(verdict)),
            Err(e) if e.is_recoverable() => {
                tracing::warn!(section = %section.identity(), error = %e, "Verification failed, keeping section");
                kept.push(section.with_verdict(VerificationVerdict::Unverified));
            }
            Err(e) => return Err(e),
        }
    }

    tracing::debug!(kept = kept.len(), dropped = dropped, "Sections verified");
    Ok(kept)
}

async fn judge(ctx: &CycleContext, question: &str, section: &RetrievedSection) -> Result<VerificationVerdict> {
    let request = LlmRequest::new(LlmPurpose::Verification, prompts::verification(question, section))
        .with_system_prompt(prompts::SYSTEM_PROMPT)
        .with_max_tokens(50)
        .json();

    let raw = bounded(
        "verification",
        ctx.config.timeouts.verification(),
        ctx.llm.invoke(&request),
    )
    .await?;

    Ok(parse_verdict(&raw))
}

fn parse_verdict(raw: &str) -> VerificationVerdict {
    let relevant = match parse_json_response::<VerificationResponse>(raw, "verification") {
        Ok(response) => Some(response.relevant),
        Err(_) => keyword_verdict(raw),
    };

    match relevant {
        Some(true) => VerificationVerdict::Relevant,
        Some(false) => VerificationVerdict::NotRelevant,
        None => VerificationVerdict::Unverified,
    }
}

fn keyword_verdict(raw: &str) -> Option<bool> {
    let lower = raw.trim().to_lowercase();
    if lower.contains("not relevant") || lower.contains("irrelevant") || lower.starts_with("no") || lower.contains("false") {
        Some(false)
    } else if lower.contains("relevant") || lower.starts_with("yes") || lower.contains("true") {
        Some(true)
    } else {
        None
    }
}
