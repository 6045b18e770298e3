//! Random-hyperplane LSH index
//!
//! Approximate candidate selection for the semantic cache and dedup scans.
//! Each table hashes a vector to a signature of sign bits against random
//! hyperplanes; near vectors collide in at least one table with high
//! probability. Exact cosine similarity re-ranks the candidates.

use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::embedding::cosine_similarity;

/// Multi-table random hyperplane LSH index
pub struct LshIndex {
    num_tables: usize,
    hash_size: usize,
    dimensions: usize,
    /// Per table: hash_size hyperplanes of `dimensions` components
    hyperplanes: Vec<Vec<Vec<f32>>>,
    /// Per table: signature -> keys
    tables: Vec<HashMap<u64, HashSet<String>>>,
    /// Stored vectors for exact re-ranking
    vectors: HashMap<String, Vec<f32>>,
}

impl LshIndex {
    /// Build an index with the given table count and signature width
    pub fn new(num_tables: usize, hash_size: usize, dimensions: usize) -> Self {
        // Deterministic planes keep candidate sets reproducible across runs
        let mut rng = StdRng::seed_from_u64(0x6d6e_656d_6f5f_6c73);

        let hyperplanes = (0..num_tables)
            .map(|_| {
                (0..hash_size)
                    .map(|_| (0..dimensions).map(|_| rng.gen_range(-1.0..1.0)).collect())
                    .collect()
            })
            .collect();

        Self {
            num_tables,
            hash_size,
            dimensions,
            hyperplanes,
            tables: vec![HashMap::new(); num_tables],
            vectors: HashMap::new(),
        }
    }

    /// Default shape used by the cache and dedup paths
    pub fn with_dimensions(dimensions: usize) -> Self {
        Self::new(10, 16, dimensions)
    }

    fn signature(&self, table: usize, vector: &[f32]) -> u64 {
        let mut sig = 0_u64;
        for (bit, plane) in self.hyperplanes[table].iter().enumerate().take(self.hash_size) {
            let dot: f32 = plane.iter().zip(vector.iter()).map(|(p, v)| p * v).sum();
            if dot >= 0.0 {
                sig |= 1 << bit;
            }
        }
        sig
    }

    /// Add or replace a vector
    pub fn add(&mut self, key: &str, vector: &[f32]) {
        if vector.len() != self.dimensions {
            return;
        }
        if self.vectors.contains_key(key) {
            self.remove(key);
        }

        for table in 0..self.num_tables {
            let sig = self.signature(table, vector);
            self.tables[table].entry(sig).or_default().insert(key.to_string());
        }
        self.vectors.insert(key.to_string(), vector.to_vec());
    }

    /// Remove a key
    pub fn remove(&mut self, key: &str) {
        let Some(vector) = self.vectors.remove(key) else {
            return;
        };
        for table in 0..self.num_tables {
            let sig = self.signature(table, &vector);
            if let Some(bucket) = self.tables[table].get_mut(&sig) {
                bucket.remove(key);
                if bucket.is_empty() {
                    self.tables[table].remove(&sig);
                }
            }
        }
    }

    /// Union of bucket members colliding with the query in any table
    pub fn query_candidates(&self, vector: &[f32], max_candidates: usize) -> HashSet<String> {
        let mut candidates = HashSet::new();
        if vector.len() != self.dimensions {
            return candidates;
        }

        for table in 0..self.num_tables {
            let sig = self.signature(table, vector);
            if let Some(bucket) = self.tables[table].get(&sig) {
                for key in bucket {
                    candidates.insert(key.clone());
                    if candidates.len() >= max_candidates {
                        return candidates;
                    }
                }
            }
        }
        candidates
    }

    /// Candidates re-ranked by exact cosine similarity
    pub fn find_similar(
        &self,
        vector: &[f32],
        top_k: usize,
        min_similarity: f32,
    ) -> Vec<(String, f32)> {
        let candidates = self.query_candidates(vector, 256);

        let mut scored: Vec<(String, f32)> = candidates
            .into_iter()
            .filter_map(|key| {
                let stored = self.vectors.get(&key)?;
                let sim = cosine_similarity(vector, stored);
                (sim >= min_similarity).then_some((key, sim))
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        scored
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Drop everything, keeping the hyperplanes
    pub fn clear(&mut self) {
        for table in &mut self.tables {
            table.clear();
        }
        self.vectors.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(components: &[f32]) -> Vec<f32> {
        let norm: f32 = components.iter().map(|x| x * x).sum::<f32>().sqrt();
        components.iter().map(|x| x / norm).collect()
    }

    #[test]
    fn test_identical_vector_found() {
        let mut index = LshIndex::new(8, 12, 4);
        let v = unit(&[0.3, -0.2, 0.8, 0.1]);

        index.add("a", &v);
        let results = index.find_similar(&v, 5, 0.99);

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "a");
        assert!(results[0].1 > 0.999);
    }

    #[test]
    fn test_remove() {
        let mut index = LshIndex::new(4, 8, 3);
        let v = unit(&[1.0, 0.0, 0.0]);

        index.add("x", &v);
        assert_eq!(index.len(), 1);

        index.remove("x");
        assert!(index.is_empty());
        assert!(index.find_similar(&v, 5, 0.0).is_empty());
    }

    #[test]
    fn test_near_vectors_collide() {
        let mut index = LshIndex::new(12, 10, 8);
        let base = unit(&[0.5, 0.5, 0.1, -0.3, 0.2, 0.0, 0.7, -0.1]);
        let near = unit(&[0.52, 0.48, 0.11, -0.29, 0.21, 0.01, 0.69, -0.12]);

        index.add("base", &base);
        let results = index.find_similar(&near, 5, 0.9);

        assert!(!results.is_empty(), "near vector should collide in some table");
        assert_eq!(results[0].0, "base");
    }

    #[test]
    fn test_dimension_mismatch_ignored() {
        let mut index = LshIndex::new(4, 8, 3);
        index.add("bad", &[1.0, 0.0]);
        assert!(index.is_empty());
    }
}
