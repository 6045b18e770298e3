//! Importance scoring
//!
//! Access logging happens inline on get/search (rate-limited at the query
//! layer); this service recomputes scores from the logged statistics and
//! exposes manual overrides with an audited reason.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::Settings;
use crate::error::{MnemoError, Result};
use crate::storage::{queries, Storage};

/// Access statistics behind a score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreInfo {
    pub memory_id: String,
    pub importance_score: f32,
    pub access_count: i64,
    pub last_accessed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a manual score override
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreChange {
    pub memory_id: String,
    pub previous_score: f32,
    pub new_score: f32,
    pub reason: Option<String>,
}

/// Compute an importance score in [0, 1]
///
/// Combines log-normalized access frequency (saturating at max_accesses),
/// recency of last access, and age since creation. Half-lives: 7 days for
/// recency, 30 days for novelty.
pub fn compute_score(
    access_count: i64,
    last_accessed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    now: DateTime<Utc>,
    max_accesses: i64,
) -> f32 {
    let capped = access_count.clamp(0, max_accesses) as f64;
    let frequency = (1.0 + capped).ln() / (1.0 + max_accesses as f64).ln();

    let recency = match last_accessed_at {
        Some(last) => {
            let days = (now - last).num_seconds().max(0) as f64 / 86_400.0;
            (-days / 7.0).exp()
        }
        None => 0.0,
    };

    let age_days = (now - created_at).num_seconds().max(0) as f64 / 86_400.0;
    let novelty = (-age_days / 30.0).exp();

    let score = 0.45 * frequency + 0.35 * recency + 0.20 * novelty;
    score.clamp(0.0, 1.0) as f32
}

/// Service for importance scoring
#[derive(Clone)]
pub struct ImportanceService {
    storage: Storage,
    settings: Arc<Settings>,
}

impl ImportanceService {
    pub fn new(storage: Storage, settings: Arc<Settings>) -> Self {
        Self { storage, settings }
    }

    /// Score and access statistics for a memory
    pub async fn get_score(&self, memory_id: &str) -> Result<ScoreInfo> {
        self.storage.with_connection(|conn| {
            let row = conn
                .query_row(
                    "SELECT importance_score, access_count, last_accessed_at, created_at
                     FROM memories WHERE id = ?1",
                    params![memory_id],
                    |row| {
                        Ok((
                            row.get::<_, f32>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    },
                )
                .optional()?;

            let Some((score, access_count, last_accessed, created_at)) = row else {
                return Err(MnemoError::NotFound(format!("memory {}", memory_id)));
            };

            Ok(ScoreInfo {
                memory_id: memory_id.to_string(),
                importance_score: score,
                access_count,
                last_accessed_at: last_accessed.map(|s| queries::parse_dt(&s)),
                created_at: queries::parse_dt(&created_at),
            })
        })
    }

    /// Manually override the score
    pub async fn set_score(
        &self,
        memory_id: &str,
        score: f32,
        reason: Option<String>,
    ) -> Result<ScoreChange> {
        if !(0.0..=1.0).contains(&score) {
            return Err(MnemoError::Validation(
                "score must be between 0.0 and 1.0".to_string(),
            ));
        }

        let previous = self.get_score(memory_id).await?;

        self.storage.with_connection(|conn| {
            conn.execute(
                "UPDATE memories SET importance_score = ?1 WHERE id = ?2",
                params![score, memory_id],
            )?;
            Ok(())
        })?;

        tracing::info!(
            memory_id,
            previous = previous.importance_score,
            new = score,
            reason = reason.as_deref().unwrap_or(""),
            "importance score overridden"
        );

        Ok(ScoreChange {
            memory_id: memory_id.to_string(),
            previous_score: previous.importance_score,
            new_score: score,
            reason,
        })
    }

    /// Recompute the score from access statistics
    pub async fn recompute(&self, memory_id: &str) -> Result<ScoreInfo> {
        let info = self.get_score(memory_id).await?;

        let new_score = compute_score(
            info.access_count,
            info.last_accessed_at,
            info.created_at,
            Utc::now(),
            self.settings.importance_max_accesses,
        );

        self.storage.with_connection(|conn| {
            conn.execute(
                "UPDATE memories SET importance_score = ?1 WHERE id = ?2",
                params![new_score, memory_id],
            )?;
            Ok(())
        })?;

        Ok(ScoreInfo {
            importance_score: new_score,
            ..info
        })
    }

    /// Recompute scores for every memory in a namespace; returns the count
    pub async fn recompute_namespace(&self, namespace: &str) -> Result<usize> {
        let max_accesses = self.settings.importance_max_accesses;
        let now = Utc::now();

        self.storage.with_transaction(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, access_count, last_accessed_at, created_at
                 FROM memories WHERE namespace = ?1",
            )?;

            let rows: Vec<(String, i64, Option<String>, String)> = stmt
                .query_map(params![namespace], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                    ))
                })?
                .filter_map(|r| r.ok())
                .collect();
            drop(stmt);

            let count = rows.len();
            for (id, access_count, last_accessed, created_at) in rows {
                let score = compute_score(
                    access_count,
                    last_accessed.map(|s| queries::parse_dt(&s)),
                    queries::parse_dt(&created_at),
                    now,
                    max_accesses,
                );
                conn.execute(
                    "UPDATE memories SET importance_score = ?1 WHERE id = ?2",
                    params![score, id],
                )?;
            }

            Ok(count)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_bounds() {
        let now = Utc::now();
        let score = compute_score(1_000_000, Some(now), now, now, 100);
        assert!((0.0..=1.0).contains(&score));

        let zero = compute_score(0, None, now - chrono::Duration::days(365), now, 100);
        assert!((0.0..=1.0).contains(&zero));
        assert!(zero < 0.1);
    }

    #[test]
    fn test_frequency_saturates() {
        let now = Utc::now();
        let at_max = compute_score(100, Some(now), now, now, 100);
        let over_max = compute_score(10_000, Some(now), now, now, 100);
        assert!((at_max - over_max).abs() < 1e-6);
    }

    #[test]
    fn test_recent_access_scores_higher() {
        let now = Utc::now();
        let created = now - chrono::Duration::days(60);

        let recent = compute_score(10, Some(now), created, now, 100);
        let stale = compute_score(
            10,
            Some(now - chrono::Duration::days(30)),
            created,
            now,
            100,
        );
        assert!(recent > stale);
    }
}
