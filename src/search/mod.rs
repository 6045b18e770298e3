//! Search support: rank fusion, LSH indexing, semantic result cache

mod cache;
mod lsh;

pub use cache::{CacheSweeper, SemanticCache};
pub use lsh::LshIndex;

use std::collections::HashMap;

/// Reciprocal Rank Fusion over independent ranked lists
///
/// Each list is ordered best-first; an item scores sum(1 / (k + rank_i))
/// over the lists it appears in (rank is 1-based). Symmetric over the
/// inputs. Ties break on id for deterministic output.
pub fn reciprocal_rank_fusion(lists: &[Vec<(String, f32)>], k: f32) -> Vec<(String, f32)> {
    let mut scores: HashMap<String, f32> = HashMap::new();

    for list in lists {
        for (rank, (id, _)) in list.iter().enumerate() {
            *scores.entry(id.clone()).or_insert(0.0) += 1.0 / (k + (rank + 1) as f32);
        }
    }

    let mut fused: Vec<(String, f32)> = scores.into_iter().collect();
    fused.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(ids: &[&str]) -> Vec<(String, f32)> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| (id.to_string(), 1.0 - i as f32 * 0.1))
            .collect()
    }

    #[test]
    fn test_rrf_formula() {
        let a = list(&["x", "y"]);
        let b = list(&["y", "z"]);

        let fused = reciprocal_rank_fusion(&[a, b], 60.0);
        let scores: HashMap<_, _> = fused.iter().cloned().collect();

        // y appears at rank 2 and rank 1
        let expected_y = 1.0 / 62.0 + 1.0 / 61.0;
        assert!((scores["y"] - expected_y).abs() < 1e-6);
        // x and z each appear once
        assert!((scores["x"] - 1.0 / 61.0).abs() < 1e-6);
        assert!((scores["z"] - 1.0 / 62.0).abs() < 1e-6);

        // y is ranked first
        assert_eq!(fused[0].0, "y");
    }

    #[test]
    fn test_rrf_symmetric() {
        let a = list(&["m1", "m2", "m3"]);
        let b = list(&["m3", "m4"]);

        let forward = reciprocal_rank_fusion(&[a.clone(), b.clone()], 60.0);
        let backward = reciprocal_rank_fusion(&[b, a], 60.0);

        assert_eq!(forward, backward);
    }
}
