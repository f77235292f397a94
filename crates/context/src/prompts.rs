//! Prompt builders for every LLM step
//!
//! Each structured prompt names the JSON shape it expects; the matching
//! step module keeps a plain-text fallback for models that ignore it.

use citeforge_common::models::RetrievedSection;
use std::fmt::Write;

pub const SYSTEM_PROMPT: &str = "You are a careful research assistant. \
    You only state what the provided material supports and you say so when it does not.";

/// Break the original question into narrower sub-questions
pub fn decomposition(question: &str, max_questions: usize) -> String {
    format!(
        "Break the question below into at most {} self-contained sub-questions that can each be \
        answered by searching a document collection. Skip sub-questions that merely restate the \
        question. If the question is already atomic, return it as the only sub-question.\n\n\
        Question: {}\n\n\
        Respond with JSON: {{\"questions\": [\"...\"]}}",
        max_questions, question
    )
}

/// Search query variants for one sub-question
pub fn expansion(question: &str, max_variants: usize) -> String {
    format!(
        "Write up to {} short search queries that would find passages answering the question. \
        Vary the wording and the keywords; do not add facts.\n\n\
        Question: {}\n\n\
        Respond with JSON: {{\"queries\": [\"...\"]}}",
        max_variants, question
    )
}

/// Relevance judgment of one passage
pub fn verification(question: &str, section: &RetrievedSection) -> String {
    format!(
        "Decide whether the passage contains information that helps answer the question.\n\n\
        Question: {}\n\n\
        Passage ({}):\n{}\n\n\
        Respond with JSON: {{\"relevant\": true|false}}",
        question,
        section.display_title(),
        section.content
    )
}

/// Cited answer over locally labelled passages
pub fn answer(question: &str, sections: &[RetrievedSection]) -> String {
    let mut prompt = format!(
        "Answer the question using ONLY the passages below. Cite every statement with the \
        label of the passage it comes from, e.g. [D1]. If the passages do not answer the \
        question, say what is missing.\n\n\
        Question: {}\n\nPassages:\n",
        question
    );

    for (i, section) in sections.iter().enumerate() {
        let _ = write!(
            prompt,
            "\n[D{}] {}\n{}\n",
            i + 1,
            section.display_title(),
            section.content
        );
    }

    prompt.push_str(
        "\nRespond with JSON: {\"answer\": \"text with [D<k>] citations\", \
        \"cited\": [k, ...], \"claims\": [\"one atomic statement per entry\"]}",
    );
    prompt
}

/// Whether an answer fully addresses its question
pub fn sufficiency(question: &str, answer_text: &str) -> String {
    format!(
        "Judge whether the answer fully addresses the question. ANSWERED means nothing \
        important is missing, PARTIALLY_ANSWERED means some aspect is missing, UNANSWERED \
        means the answer does not address the question. When something is missing, describe \
        the gap in one sentence.\n\n\
        Question: {}\n\nAnswer:\n{}\n\n\
        Respond with JSON: {{\"verdict\": \"ANSWERED|PARTIALLY_ANSWERED|UNANSWERED\", \"gap\": \"...\"}}",
        question, answer_text
    )
}

/// An open gap fed into refinement
pub struct GapLine<'a> {
    pub question_id: String,
    pub question: &'a str,
    pub gap: &'a str,
}

/// Follow-up questions for unresolved gaps
pub fn refinement(original: &str, gaps: &[GapLine<'_>], asked: &[&str], max_questions: usize) -> String {
    let mut prompt = format!(
        "The original question has not been fully answered. Write at most {} new, specific \
        questions that would close the gaps below. Do not repeat questions already asked.\n\n\
        Original question: {}\n\nOpen gaps:\n",
        max_questions, original
    );

    for gap in gaps {
        let _ = writeln!(prompt, "- [{}] {}: {}", gap.question_id, gap.question, gap.gap);
    }

    prompt.push_str("\nAlready asked:\n");
    for question in asked {
        let _ = writeln!(prompt, "- {}", question);
    }

    prompt.push_str(
        "\nRespond with JSON: {\"questions\": [{\"question\": \"...\", \"addresses\": \"<gap id>\"}]}",
    );
    prompt
}

/// Final answer from numbered sub-answers and sources
pub fn synthesis(
    original: &str,
    primary: &[String],
    supporting: &[String],
    unresolved: &[&str],
    evidence: &[(u32, &RetrievedSection)],
    sources: &[(u32, &RetrievedSection)],
) -> String {
    let mut prompt = format!(
        "Write the final answer to the question from the findings below. Keep the numeric \
        citations exactly as given, e.g. [3]; do not invent new ones. Prefer the primary \
        findings and use the supporting detail only where it adds something. State clearly \
        what remains unknown.\n\n\
        Question: {}\n\nPrimary findings:\n",
        original
    );

    for finding in primary {
        let _ = writeln!(prompt, "- {}", finding);
    }

    if !supporting.is_empty() {
        prompt.push_str("\nSupporting detail:\n");
        for finding in supporting {
            let _ = writeln!(prompt, "- {}", finding);
        }
    }

    if !unresolved.is_empty() {
        prompt.push_str("\nCould not be answered from the documents:\n");
        for question in unresolved {
            let _ = writeln!(prompt, "- {}", question);
        }
    }

    if !evidence.is_empty() {
        prompt.push_str("\nPassages found for the question itself:\n");
        for (number, section) in evidence {
            let _ = writeln!(prompt, "[{}] {}: {}", number, section.display_title(), section.content.trim());
        }
    }

    prompt.push_str("\nSources:\n");
    for (number, section) in sources {
        let _ = writeln!(prompt, "[{}] {}", number, section.display_title());
    }

    prompt.push_str("\nFinal answer:");
    prompt
}

/// Contradictions among numbered claims
pub fn contradiction(claims: &[String]) -> String {
    let mut prompt = String::from(
        "Below are numbered claims gathered while answering one question. Find groups of \
        claims that cannot all be true, and single claims that are ambiguous and need \
        clarification. Return empty lists when there are none.\n\nClaims:\n",
    );

    for (i, claim) in claims.iter().enumerate() {
        let _ = writeln!(prompt, "{}. {}", i + 1, claim);
    }

    prompt.push_str(
        "\nRespond with JSON: {\"contradictions\": [{\"claims\": [1, 2], \"explanation\": \"...\"}], \
        \"clarifications\": [{\"claim\": 3, \"reason\": \"...\"}]}",
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_prompt_labels_sections() {
        let sections = vec![
            RetrievedSection::new("refunds.md", 0, "Refunds within 30 days.", 0.9),
            RetrievedSection::new("terms.md", 4, "Store credit only.", 0.7),
        ];
        let prompt = answer("What is the refund policy?", &sections);
        assert!(prompt.contains("[D1] refunds.md\nRefunds within 30 days."));
        assert!(prompt.contains("[D2] terms.md"));
        assert!(prompt.contains("Question: What is the refund policy?"));
    }

    #[test]
    fn test_contradiction_prompt_numbers_claims() {
        let prompt = contradiction(&["A is 30 days".into(), "A is 14 days".into()]);
        assert!(prompt.contains("1. A is 30 days\n2. A is 14 days"));
    }

    #[test]
    fn test_synthesis_prompt_lists_direct_passages() {
        let handbook = RetrievedSection::new("handbook.md", 2, "Refunds need a receipt.", 0.8);
        let prompt = synthesis(
            "What is the refund policy?",
            &["Refund window?: 30 days [1].".into()],
            &[],
            &[],
            &[(2, &handbook)],
            &[(2, &handbook)],
        );
        assert!(prompt.contains("Passages found for the question itself:\n[2] handbook.md: Refunds need a receipt."));
        assert!(!prompt.contains("Supporting detail"));

        let without = synthesis("q", &["a".into()], &[], &[], &[], &[]);
        assert!(!without.contains("Passages found"));
    }

    #[test]
    fn test_refinement_prompt_lists_gaps_and_asked() {
        let gaps = [GapLine {
            question_id: "1.2".into(),
            question: "Who approves refunds?",
            gap: "approver role not named",
        }];
        let prompt = refinement("Refund policy?", &gaps, &["Refund policy?"], 2);
        assert!(prompt.contains("- [1.2] Who approves refunds?: approver role not named"));
        assert!(prompt.contains("Already asked:\n- Refund policy?"));
    }
}
