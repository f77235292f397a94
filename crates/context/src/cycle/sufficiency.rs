//! Sufficiency check of a generated answer

use super::{recover, CycleContext};
use crate::calls::bounded;
use crate::prompts;
use citeforge_common::errors::Result;
use citeforge_common::llm::parse_json_response;
use citeforge_common::models::SufficiencyVerdict;
use citeforge_common::{LlmPurpose, LlmRequest};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub verdict: SufficiencyVerdict,
    pub gap: Option<String>,
}

impl Assessment {
    /// Used when the check itself fails
    fn unknown() -> Self {
        Self {
            verdict: SufficiencyVerdict::PartiallyAnswered,
            gap: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SufficiencyResponse {
    verdict: SufficiencyVerdict,
    #[serde(default)]
    gap: Option<String>,
}

pub async fn check(ctx: &CycleContext, question: &str, answer_text: &str) -> Result<Assessment> {
    let request = LlmRequest::new(LlmPurpose::Sufficiency, prompts::sufficiency(question, answer_text))
        .with_system_prompt(prompts::SYSTEM_PROMPT)
        .with_max_tokens(200)
        .json();

    let raw = bounded(
        "sufficiency check",
        ctx.config.timeouts.sufficiency(),
        ctx.llm.invoke(&request),
    )
    .await;

    recover(
        "sufficiency check",
        raw.map(|raw| parse_assessment(&raw)),
        Assessment::unknown(),
    )
}

fn parse_assessment(raw: &str) -> Assessment {
    let (verdict, gap) = match parse_json_response::<SufficiencyResponse>(raw, "sufficiency check") {
        Ok(response) => (Some(response.verdict), response.gap),
        Err(_) => (keyword_verdict(raw), None),
    };

    let Some(verdict) = verdict else {
        return Assessment::unknown();
    };

    let gap = if verdict.is_answered() {
        None
    } else {
        gap.map(|g| g.trim().to_string()).filter(|g| !g.is_empty())
    };

    Assessment { verdict, gap }
}

fn keyword_verdict(raw: &str) -> Option<SufficiencyVerdict> {
    let upper = raw.to_uppercase();
    if upper.contains("PARTIALLY_ANSWERED") || upper.contains("PARTIALLY ANSWERED") {
        Some(SufficiencyVerdict::PartiallyAnswered)
    } else if upper.contains("UNANSWERED") || upper.contains("NOT ANSWERED") {
        Some(SufficiencyVerdict::Unanswered)
    } else if upper.contains("ANSWERED") {
        Some(SufficiencyVerdict::Answered)
    } else {
        None
    }
}
