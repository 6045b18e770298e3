//! Embedding provider contract and the built-in fallback
//!
//! The engine consumes embeddings through the `Embedder` trait. The
//! `is_query` flag lets models that distinguish query vs passage encoding
//! (E5-family prefixes) apply the right one; providers that do not
//! distinguish ignore it.

mod tfidf;

pub use tfidf::TfIdfEmbedder;

use crate::error::{MnemoError, Result};

/// Trait for embedding generators
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text
    ///
    /// `is_query` marks search-query encoding for models that require a
    /// query/passage distinction. Empty input fails with Validation.
    fn embed(&self, text: &str, is_query: bool) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts
    fn embed_batch(&self, texts: &[&str], is_query: bool) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t, is_query)).collect()
    }

    /// Embedding dimensions
    fn dimensions(&self) -> usize;

    /// Model name
    fn model_name(&self) -> &str;
}

/// Validate non-empty embedding input
pub(crate) fn check_input(text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Err(MnemoError::Validation(
            "cannot embed empty text".to_string(),
        ));
    }
    Ok(())
}

/// Cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_empty_input_rejected() {
        let embedder = TfIdfEmbedder::new(64);
        assert!(embedder.embed("", false).is_err());
        assert!(embedder.embed("   ", true).is_err());
    }
}
