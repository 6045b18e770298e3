//! Token counting with tiktoken and a character-based fallback

use once_cell::sync::OnceCell;
use tiktoken_rs::CoreBPE;

static BPE: OnceCell<Option<CoreBPE>> = OnceCell::new();

fn bpe() -> &'static Option<CoreBPE> {
    BPE.get_or_init(|| match tiktoken_rs::cl100k_base() {
        Ok(bpe) => Some(bpe),
        Err(e) => {
            tracing::warn!(error = %e, "tiktoken unavailable, using estimator");
            None
        }
    })
}

/// Count tokens: exact when the encoder loads, estimated otherwise
pub fn count_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    match bpe() {
        Some(bpe) => bpe.encode_with_special_tokens(text).len(),
        None => estimate_tokens(text),
    }
}

/// Count tokens with a model-specific encoding, falling back to the
/// default encoder and then the estimator
pub fn count_tokens_for_model(text: &str, model: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    match tiktoken_rs::get_bpe_from_model(model) {
        Ok(bpe) => bpe.encode_with_special_tokens(text).len(),
        Err(_) => count_tokens(text),
    }
}

/// Estimate tokens without an encoder
///
/// CJK codepoints count at 0.7 tokens each, remaining characters at 1/4.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    let cjk_count = text.chars().filter(|&c| is_cjk(c)).count();
    let total_chars = text.chars().count();

    let cjk_tokens = (cjk_count as f64 * 0.7) as usize;
    let remaining = total_chars.saturating_sub(cjk_count);
    let other_tokens = remaining / 4;

    cjk_tokens + other_tokens
}

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4e00}'..='\u{9fff}'   // CJK Unified Ideographs
        | '\u{3040}'..='\u{309f}' // Hiragana
        | '\u{30a0}'..='\u{30ff}' // Katakana
        | '\u{ac00}'..='\u{d7af}' // Hangul
    )
}
