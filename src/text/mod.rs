//! Text support utilities: FTS tokenization, token counting, extractive
//! summarization

mod summarize;
mod tokenizer;
mod tokens;

pub use summarize::{extractive_summary, extractive_summary_by_tokens, split_sentences};
pub use tokenizer::{set_tokenizer, tokenizer, PassthroughTokenizer, Tokenizer};
pub use tokens::{count_tokens, count_tokens_for_model, estimate_tokens};
