//! TF-IDF based embedding fallback
//!
//! Deterministic, no external model. Suitable for tests and environments
//! without an embedding service. Ignores the query/passage flag since the
//! same projection serves both sides.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use crate::embedding::{check_input, Embedder};
use crate::error::Result;

/// TF-IDF based embedder using the hashing trick
pub struct TfIdfEmbedder {
    dimensions: usize,
}

impl TfIdfEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// Tokenize text into lowercase words
    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    /// Hash a token to a dimension index
    fn hash_token(token: &str, dimensions: usize) -> usize {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        token.hash(&mut hasher);
        (hasher.finish() as usize) % dimensions
    }

    /// Sign for feature hashing (reduces collision impact)
    fn hash_sign(token: &str) -> f32 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        format!("{}_sign", token).hash(&mut hasher);
        if hasher.finish() % 2 == 0 {
            1.0
        } else {
            -1.0
        }
    }
}

impl Embedder for TfIdfEmbedder {
    fn embed(&self, text: &str, _is_query: bool) -> Result<Vec<f32>> {
        check_input(text)?;

        let tokens = Self::tokenize(text);
        let mut embedding = vec![0.0_f32; self.dimensions];

        if tokens.is_empty() {
            return Ok(embedding);
        }

        let mut tf: HashMap<String, f32> = HashMap::new();
        for token in &tokens {
            *tf.entry(token.clone()).or_insert(0.0) += 1.0;
        }

        let doc_len = tokens.len() as f32;
        for (token, count) in tf {
            // TF: log(1 + count/doc_len); IDF approximated by token length
            let tf_score = (1.0 + count / doc_len).ln();
            let idf_score = 1.0 + (token.len() as f32 * 0.1);

            let weight = tf_score * idf_score;
            let idx = Self::hash_token(&token, self.dimensions);
            let sign = Self::hash_sign(&token);

            embedding[idx] += weight * sign;
        }

        // Bigrams for better locality, weighted less
        for window in tokens.windows(2) {
            let bigram = format!("{}_{}", window[0], window[1]);
            let idx = Self::hash_token(&bigram, self.dimensions);
            let sign = Self::hash_sign(&bigram);
            embedding[idx] += 0.5 * sign;
        }

        // L2 normalize
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        }

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "tfidf"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn test_deterministic() {
        let embedder = TfIdfEmbedder::new(128);

        let e1 = embedder.embed("hello world", false).unwrap();
        let e2 = embedder.embed("hello world", false).unwrap();
        assert_eq!(e1, e2);
    }

    #[test]
    fn test_similarity_ordering() {
        let embedder = TfIdfEmbedder::new(128);

        let e1 = embedder
            .embed("the quick brown fox jumps over the lazy dog", false)
            .unwrap();
        let e2 = embedder
            .embed("a fast brown fox leaps over a sleepy dog", false)
            .unwrap();
        let e3 = embedder
            .embed("quantum physics and thermodynamics", false)
            .unwrap();

        assert!(cosine_similarity(&e1, &e2) > cosine_similarity(&e1, &e3));
    }

    #[test]
    fn test_normalized() {
        let embedder = TfIdfEmbedder::new(128);
        let e = embedder
            .embed("this is a test sentence with multiple words", false)
            .unwrap();

        let norm: f32 = e.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_query_flag_ignored() {
        let embedder = TfIdfEmbedder::new(128);
        let doc = embedder.embed("banana bread recipe", false).unwrap();
        let query = embedder.embed("banana bread recipe", true).unwrap();
        assert_eq!(doc, query);
    }
}
