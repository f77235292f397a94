//! Plain-text fallbacks for LLM responses that are not valid JSON

use crate::citations::strip_markers;

/// Items of a bulleted or numbered list, one per line.
///
/// Leading bullets (`-`, `*`, `•`), numbering (`1.`, `2)`) and wrapping
/// quotes are stripped. Lines ending with `:` are treated as headings.
pub fn list_items(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| {
            let line = line.trim();
            let line = line.trim_start_matches(['-', '*', '•']).trim_start();
            let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
            let line = if digits > 0 {
                line[digits..]
                    .strip_prefix(['.', ')'])
                    .map(str::trim_start)
                    .unwrap_or(line)
            } else {
                line
            };
            line.trim_matches(['"', '\'', '`']).trim().to_string()
        })
        .filter(|line| !line.is_empty() && !line.ends_with(':') && !line.starts_with('{'))
        .collect()
}

/// Split text into sentences on `.`, `?` and `!`
pub fn split_sentences(text: &str) -> Vec<String> {
    let delimiters = ['.', '?', '!'];
    let mut sentences = Vec::new();
    let mut current = String::new();

    for ch in text.chars() {
        current.push(ch);
        if delimiters.contains(&ch) {
            let trimmed = current.trim().to_string();
            if !trimmed.is_empty() {
                sentences.push(trimmed);
            }
            current.clear();
        }
    }

    let trimmed = current.trim().to_string();
    if !trimmed.is_empty() {
        sentences.push(trimmed);
    }

    sentences
}

/// Atomic claims of an answer, one per sentence without citation markers
pub fn sentence_claims(answer_text: &str) -> Vec<String> {
    split_sentences(answer_text)
        .into_iter()
        .map(|s| strip_markers(&s))
        .filter(|s| s.len() >= 12)
        .collect()
}

/// De-duplicate by trimmed, case-insensitive text; first occurrence wins
pub fn dedup_texts(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty() && seen.insert(s.to_lowercase()))
        .collect()
}
