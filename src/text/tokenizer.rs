//! Tokenizer provider for FTS storage and queries
//!
//! A CJK-segmenting implementation can be installed once at startup via
//! `set_tokenizer`; the default passthrough defers to the FTS unicode61
//! tokenizer. `tokenize_query` always produces an FTS-safe phrase literal:
//! embedded quotes are doubled and the whole string is wrapped in quotes,
//! which disables BOOLEAN / NEAR / * operators.

use std::sync::Arc;

use once_cell::sync::OnceCell;

/// Trait for text tokenization
pub trait Tokenizer: Send + Sync {
    /// Tokenize text for FTS storage (whitespace-separated token string)
    fn tokenize(&self, text: &str) -> String;

    /// Tokenize a search query into an FTS-safe phrase literal
    fn tokenize_query(&self, query: &str) -> String {
        let tokenized = self.tokenize(query);
        let escaped = tokenized.replace('"', "\"\"");
        format!("\"{}\"", escaped)
    }
}

/// No-op tokenizer deferring to the FTS default tokenizer
pub struct PassthroughTokenizer;

impl Tokenizer for PassthroughTokenizer {
    fn tokenize(&self, text: &str) -> String {
        text.to_string()
    }
}

static TOKENIZER: OnceCell<Arc<dyn Tokenizer>> = OnceCell::new();

/// Install the process-wide tokenizer. Fails if one is already installed.
pub fn set_tokenizer(tokenizer: Arc<dyn Tokenizer>) -> bool {
    TOKENIZER.set(tokenizer).is_ok()
}

/// Process-wide tokenizer, initialized once
pub fn tokenizer() -> Arc<dyn Tokenizer> {
    TOKENIZER
        .get_or_init(|| Arc::new(PassthroughTokenizer))
        .clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough() {
        let t = PassthroughTokenizer;
        assert_eq!(t.tokenize("hello world"), "hello world");
    }

    #[test]
    fn test_query_escaping() {
        let t = PassthroughTokenizer;
        assert_eq!(t.tokenize_query("banana"), "\"banana\"");
        assert_eq!(
            t.tokenize_query("say \"hi\" NEAR me"),
            "\"say \"\"hi\"\" NEAR me\""
        );
        // Operators end up inside the phrase, inert
        assert_eq!(t.tokenize_query("a OR b*"), "\"a OR b*\"");
    }
}
