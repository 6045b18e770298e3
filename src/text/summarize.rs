//! Extractive summarization
//!
//! Summaries are composed entirely of full sentences drawn from the source,
//! scored by normalized word frequency and re-emitted in document order.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use super::tokens::count_tokens;

static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("word regex"));

/// Common English words plus Japanese particles, dropped from frequency
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "shall",
    "の", "は", "が", "を", "に", "で", "と", "も", "や", "から",
];

/// Split text on sentence boundaries (ASCII and CJK terminators)
pub fn split_sentences(text: &str) -> Vec<String> {
    let terminators = ['.', '!', '?', '。', '！', '？'];

    let mut sentences = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        current.push(c);
        if terminators.contains(&c) {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }

    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }

    sentences
}

/// Normalized word frequency over the whole text
fn word_frequency(text: &str) -> HashMap<String, f64> {
    let lowered = text.to_lowercase();

    let mut counts: HashMap<String, f64> = HashMap::new();
    for m in WORD_RE.find_iter(&lowered) {
        let word = m.as_str();
        if word.chars().count() <= 1 || STOP_WORDS.contains(&word) {
            continue;
        }
        *counts.entry(word.to_string()).or_insert(0.0) += 1.0;
    }

    let max_freq = counts.values().cloned().fold(0.0_f64, f64::max).max(1.0);
    counts
        .into_iter()
        .map(|(w, c)| (w, c / max_freq))
        .collect()
}

/// Score a sentence: sum of word frequencies normalized by word count
fn score_sentence(sentence: &str, freq: &HashMap<String, f64>) -> f64 {
    let lowered = sentence.to_lowercase();
    let words: Vec<&str> = WORD_RE.find_iter(&lowered).map(|m| m.as_str()).collect();
    if words.is_empty() {
        return 0.0;
    }

    let total: f64 = words.iter().map(|w| freq.get(*w).copied().unwrap_or(0.0)).sum();
    total / words.len() as f64
}

/// Extractive summary bounded by a character budget
pub fn extractive_summary(text: &str, max_length: usize) -> String {
    if text.len() <= max_length {
        return text.to_string();
    }

    let sentences = split_sentences(text);
    if sentences.is_empty() {
        return text.chars().take(max_length).collect();
    }

    let freq = word_frequency(text);
    let mut scored: Vec<(usize, f64)> = sentences
        .iter()
        .enumerate()
        .map(|(i, s)| (i, score_sentence(s, &freq)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut selected: Vec<usize> = Vec::new();
    let mut current_length = 0;
    for (idx, _) in scored {
        let len = sentences[idx].len() + 2;
        if current_length + len <= max_length {
            selected.push(idx);
            current_length += len;
        }
    }

    // Re-emit in original order
    selected.sort_unstable();
    selected
        .into_iter()
        .map(|i| sentences[i].as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extractive summary bounded by a token budget
///
/// Returns (summary, original_tokens, summary_tokens). Falls back to
/// character-ratio truncation when the text does not split into sentences,
/// and guarantees at least 10% of the original tokens by forcing the
/// top-scored sentence if selection underflows.
pub fn extractive_summary_by_tokens(text: &str, target_tokens: usize) -> (String, usize, usize) {
    if text.is_empty() {
        return (String::new(), 0, 0);
    }

    let original_tokens = count_tokens(text);
    if original_tokens <= target_tokens {
        return (text.to_string(), original_tokens, original_tokens);
    }

    let sentences = split_sentences(text);
    if sentences.is_empty() {
        let char_ratio = target_tokens as f64 / original_tokens as f64;
        let take = (text.chars().count() as f64 * char_ratio) as usize;
        let truncated: String = text.chars().take(take).collect();
        let truncated_tokens = count_tokens(&truncated);
        return (truncated, original_tokens, truncated_tokens);
    }

    let freq = word_frequency(text);
    let mut scored: Vec<(usize, f64)> = sentences
        .iter()
        .enumerate()
        .map(|(i, s)| (i, score_sentence(s, &freq)))
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut selected: Vec<usize> = Vec::new();
    let mut cumulative = 0;
    for &(idx, _) in &scored {
        let sentence_tokens = count_tokens(&sentences[idx]);
        if cumulative + sentence_tokens <= target_tokens {
            selected.push(idx);
            cumulative += sentence_tokens;
        } else if selected.is_empty() {
            // First sentence alone exceeds the budget; take it and stop
            selected.push(idx);
            cumulative += sentence_tokens;
            break;
        }
    }

    // Minimum retention: 10% of the original token count. Force further
    // top-scored sentences while selection underflows the floor.
    let min_tokens = (original_tokens / 10).max(1);
    if cumulative < min_tokens {
        for &(idx, _) in &scored {
            if cumulative >= min_tokens {
                break;
            }
            if !selected.contains(&idx) {
                selected.push(idx);
                cumulative += count_tokens(&sentences[idx]);
            }
        }
    }

    selected.sort_unstable();
    let summary = selected
        .into_iter()
        .map(|i| sentences[i].as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let summary_tokens = count_tokens(&summary);

    (summary, original_tokens, summary_tokens)
}
