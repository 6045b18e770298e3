//! Context assembly: token-budgeted packing of relevant memories
//!
//! Direct candidates come from semantic search; related memories come from
//! a bounded graph walk around the direct hits. Items are scored by the
//! requested strategy, oversized items get extractive summaries when the
//! pack runs over budget, and packing stops at the first item that would
//! overflow the effective budget (budget minus the safety buffer).

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Settings;
use crate::error::{MnemoError, Result};
use crate::graph::GraphService;
use crate::memory::MemoryService;
use crate::search::SemanticCache;
use crate::text::{count_tokens, extractive_summary_by_tokens};
use crate::types::*;

/// Items above this token count are candidates for summarization
const SUMMARIZE_MIN_TOKENS: usize = 200;

/// Builds token-budgeted context packs
#[derive(Clone)]
pub struct ContextBuilder {
    memory: MemoryService,
    graph: GraphService,
    cache: Arc<SemanticCache>,
    settings: Arc<Settings>,
}

impl ContextBuilder {
    pub fn new(
        memory: MemoryService,
        graph: GraphService,
        cache: Arc<SemanticCache>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            memory,
            graph,
            cache,
            settings,
        }
    }

    /// Assemble a context pack for a query
    pub async fn build(&self, req: ContextRequest) -> Result<ContextResult> {
        if !(100..=128_000).contains(&req.token_budget) {
            return Err(MnemoError::Validation(
                "token_budget must be between 100 and 128000".to_string(),
            ));
        }
        if !(1..=100).contains(&req.top_k) {
            return Err(MnemoError::Validation(
                "top_k must be between 1 and 100".to_string(),
            ));
        }
        if !(1..=5).contains(&req.max_depth) {
            return Err(MnemoError::Validation(
                "max_depth must be between 1 and 5".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&req.min_similarity) {
            return Err(MnemoError::Validation(
                "min_similarity must be between 0.0 and 1.0".to_string(),
            ));
        }

        let effective_budget =
            (req.token_budget as f32 * (1.0 - self.settings.token_buffer_ratio)) as usize;

        let use_cache = req.use_cache && self.settings.cache_enabled;
        if use_cache {
            if let Some(mut cached) = self
                .cache
                .get(&req.query, req.namespace.as_deref())
                .await?
            {
                cached.cache_hit = true;
                return Ok(cached);
            }
        }

        // Direct candidates via semantic search
        let direct = self
            .memory
            .search(SearchRequest {
                query: req.query.clone(),
                top_k: req.top_k,
                mode: SearchMode::Semantic,
                filters: SearchFilters {
                    namespace: req.namespace.clone(),
                    ..Default::default()
                },
                min_similarity: req.min_similarity,
                sort_by: SortBy::Similarity,
                importance_weight: 0.3,
            })
            .await?;

        // Related memories via graph expansion around each direct hit,
        // keeping the shallowest depth when roots overlap
        let mut related: HashMap<String, (Memory, usize, Option<LinkType>)> = HashMap::new();
        if req.include_related && !direct.is_empty() {
            for result in &direct {
                let traversal = match self
                    .graph
                    .traverse(
                        &result.memory.id,
                        req.max_depth,
                        self.settings.graph_max_results,
                        req.link_types.as_deref(),
                    )
                    .await
                {
                    Ok(traversal) => traversal,
                    // A direct hit vanishing mid-build is not fatal
                    Err(MnemoError::Validation(_)) => continue,
                    Err(e) => return Err(e),
                };

                for (memory, node) in traversal {
                    if node.depth == 0 {
                        continue;
                    }
                    // Keep the shallowest depth when roots overlap
                    let shallower_known = related
                        .get(&memory.id)
                        .is_some_and(|(_, depth, _)| *depth <= node.depth);
                    if !shallower_known {
                        related.insert(memory.id.clone(), (memory, node.depth, node.link_type));
                    }
                }
            }

            for result in &direct {
                related.remove(&result.memory.id);
            }
        }

        // Merge into context items
        let mut items: Vec<ContextMemory> = Vec::new();
        for result in &direct {
            let tokens = count_tokens(&result.memory.content);
            items.push(ContextMemory {
                id: result.memory.id.clone(),
                content: result.memory.content.clone(),
                original_tokens: tokens,
                tokens,
                summarized: false,
                similarity: result.similarity,
                importance_score: result.memory.importance_score,
                created_at: result.memory.created_at,
                source: ContextSource::Direct,
                depth: 0,
                link_type: None,
            });
        }
        for (memory, depth, link_type) in related.into_values() {
            let tokens = count_tokens(&memory.content);
            items.push(ContextMemory {
                id: memory.id.clone(),
                content: memory.content.clone(),
                original_tokens: tokens,
                tokens,
                summarized: false,
                similarity: 0.0,
                importance_score: memory.importance_score,
                created_at: memory.created_at,
                source: ContextSource::Related,
                depth,
                link_type,
            });
        }

        let mut items = score_and_sort(items, req.strategy);

        if req.auto_summarize {
            summarize_over_budget(&mut items, effective_budget);
        }

        // Greedy packing in scored order; the first overflow stops the pack
        let mut packed: Vec<ContextMemory> = Vec::new();
        let mut total_tokens = 0usize;
        for item in items {
            if total_tokens + item.tokens > effective_budget {
                break;
            }
            total_tokens += item.tokens;
            packed.push(item);
        }

        let summarized_count = packed.iter().filter(|m| m.summarized).count();
        let related_count = packed
            .iter()
            .filter(|m| m.source == ContextSource::Related)
            .count();

        let result = ContextResult {
            memories_count: packed.len(),
            memories: packed,
            total_tokens,
            token_budget: req.token_budget,
            summarized_count,
            related_count,
            cache_hit: false,
        };

        if use_cache {
            self.cache
                .put(&req.query, req.namespace.as_deref(), result.clone())
                .await?;
        }

        Ok(result)
    }
}

/// Order items by the selected strategy
fn score_and_sort(mut items: Vec<ContextMemory>, strategy: ContextStrategy) -> Vec<ContextMemory> {
    match strategy {
        ContextStrategy::Relevance => {
            // Direct items rank by similarity, related by inverse depth
            items.sort_by(|a, b| {
                let score = |m: &ContextMemory| match m.source {
                    ContextSource::Direct => m.similarity,
                    ContextSource::Related => 1.0 / (m.depth as f32 + 1.0),
                };
                score(b)
                    .partial_cmp(&score(a))
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        ContextStrategy::Recency => {
            items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        }
        ContextStrategy::Importance => {
            items.sort_by(|a, b| {
                b.importance_score
                    .partial_cmp(&a.importance_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        ContextStrategy::Graph => {
            // Shallow first, similarity breaks ties
            items.sort_by(|a, b| {
                a.depth.cmp(&b.depth).then_with(|| {
                    b.similarity
                        .partial_cmp(&a.similarity)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
            });
        }
    }
    items
}

/// When the total runs over budget, summarize items in descending size.
/// Only items above the size floor shrink; the target is 60% of current
/// tokens, never below 10% of the original.
fn summarize_over_budget(items: &mut [ContextMemory], token_budget: usize) {
    let mut total: usize = items.iter().map(|m| m.tokens).sum();
    if total <= token_budget {
        return;
    }

    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by(|&a, &b| items[b].tokens.cmp(&items[a].tokens));

    for idx in order {
        if total <= token_budget {
            break;
        }

        let item = &mut items[idx];
        if item.tokens <= SUMMARIZE_MIN_TOKENS {
            continue;
        }

        let target = ((item.tokens as f32 * 0.6) as usize)
            .max(item.original_tokens / 10);

        let (summary, _, new_tokens) = extractive_summary_by_tokens(&item.content, target);
        if new_tokens == 0 || new_tokens >= item.tokens {
            continue;
        }

        total -= item.tokens - new_tokens;
        item.content = summary;
        item.tokens = new_tokens;
        item.summarized = true;
    }
}
