//! Importance-driven decay eviction
//!
//! A decay run deletes low-importance memories past their grace period.
//! Each candidate is deleted in its own transaction so one failure does not
//! roll back the other deletions; failures accumulate into the result.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{MnemoError, Result};
use crate::storage::{queries, Storage};
use crate::types::{new_id, BatchItemError, DecayConfig, DecayRunResult};

/// Overrides for a single decay run
#[derive(Debug, Clone, Default)]
pub struct DecayRunOptions {
    pub threshold: Option<f32>,
    pub grace_period_days: Option<i64>,
    pub max_delete: Option<i64>,
    pub dry_run: bool,
}

/// Decay status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecayStatus {
    pub config: DecayConfig,
    pub total_memories: i64,
    pub decay_candidates: i64,
    pub total_deleted: i64,
}

/// Service for memory decay
#[derive(Clone)]
pub struct DecayService {
    storage: Storage,
}

impl DecayService {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    fn validate(
        threshold: Option<f32>,
        grace_period_days: Option<i64>,
        max_delete: Option<i64>,
    ) -> Result<()> {
        if let Some(t) = threshold {
            if !(0.0..=1.0).contains(&t) {
                return Err(MnemoError::Validation(
                    "threshold must be between 0.0 and 1.0".to_string(),
                ));
            }
        }
        if let Some(g) = grace_period_days {
            if g < 1 {
                return Err(MnemoError::Validation(
                    "grace_period_days must be >= 1".to_string(),
                ));
            }
        }
        if let Some(m) = max_delete {
            if !(1..=10_000).contains(&m) {
                return Err(MnemoError::Validation(
                    "max_delete_per_run must be between 1 and 10000".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn load_config(conn: &Connection) -> Result<DecayConfig> {
        let row = conn
            .query_row(
                "SELECT enabled, threshold, grace_period_days, max_delete_per_run,
                        last_run_at, updated_at
                 FROM decay_config WHERE id = 1",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, f32>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()?;

        Ok(match row {
            Some((enabled, threshold, grace, max_delete, last_run, updated)) => DecayConfig {
                enabled: enabled != 0,
                threshold,
                grace_period_days: grace,
                max_delete_per_run: max_delete,
                last_run_at: last_run.map(|s| queries::parse_dt(&s)),
                updated_at: queries::parse_dt(&updated),
            },
            None => DecayConfig::default(),
        })
    }

    fn save_config(conn: &Connection, config: &DecayConfig) -> Result<()> {
        conn.execute(
            "INSERT INTO decay_config (
                id, enabled, threshold, grace_period_days, max_delete_per_run,
                last_run_at, updated_at
            ) VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                enabled = excluded.enabled,
                threshold = excluded.threshold,
                grace_period_days = excluded.grace_period_days,
                max_delete_per_run = excluded.max_delete_per_run,
                last_run_at = excluded.last_run_at,
                updated_at = excluded.updated_at",
            params![
                config.enabled as i64,
                config.threshold,
                config.grace_period_days,
                config.max_delete_per_run,
                config.last_run_at.map(|d| d.to_rfc3339()),
                config.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Read the current configuration
    pub async fn config(&self) -> Result<DecayConfig> {
        self.storage.with_connection(Self::load_config)
    }

    /// Update configuration fields, validating ranges
    pub async fn configure(
        &self,
        enabled: Option<bool>,
        threshold: Option<f32>,
        grace_period_days: Option<i64>,
        max_delete_per_run: Option<i64>,
    ) -> Result<DecayConfig> {
        Self::validate(threshold, grace_period_days, max_delete_per_run)?;

        self.storage.with_transaction(|conn| {
            let mut config = Self::load_config(conn)?;

            if let Some(enabled) = enabled {
                config.enabled = enabled;
            }
            if let Some(threshold) = threshold {
                config.threshold = threshold;
            }
            if let Some(grace) = grace_period_days {
                config.grace_period_days = grace;
            }
            if let Some(max_delete) = max_delete_per_run {
                config.max_delete_per_run = max_delete;
            }
            config.updated_at = Utc::now();

            Self::save_config(conn, &config)?;
            Ok(config)
        })
    }

    fn candidate_ids(
        conn: &Connection,
        threshold: f32,
        cutoff: DateTime<Utc>,
        max_delete: i64,
    ) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT id FROM memories
             WHERE importance_score <= ?1
               AND created_at < ?2
               AND expires_at IS NULL
             ORDER BY importance_score ASC
             LIMIT ?3",
        )?;

        let ids = stmt
            .query_map(
                params![threshold, cutoff.to_rfc3339(), max_delete],
                |row| row.get::<_, String>(0),
            )?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }

    fn write_log(
        conn: &Connection,
        run_at: DateTime<Utc>,
        deleted_ids: &[String],
        threshold: f32,
        dry_run: bool,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO decay_log (id, run_at, deleted_count, deleted_ids, threshold, dry_run)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                new_id(),
                run_at.to_rfc3339(),
                deleted_ids.len() as i64,
                serde_json::to_string(deleted_ids)?,
                threshold,
                dry_run as i64,
            ],
        )?;
        Ok(())
    }

    /// Run decay once
    pub async fn run(&self, options: DecayRunOptions) -> Result<DecayRunResult> {
        Self::validate(options.threshold, options.grace_period_days, options.max_delete)?;

        let config = self.config().await?;
        let threshold = options.threshold.unwrap_or(config.threshold);
        let grace_days = options.grace_period_days.unwrap_or(config.grace_period_days);
        let max_delete = options.max_delete.unwrap_or(config.max_delete_per_run);

        let cutoff = Utc::now() - chrono::Duration::days(grace_days);

        let candidates = self
            .storage
            .with_connection(|conn| Self::candidate_ids(conn, threshold, cutoff, max_delete))?;

        if options.dry_run {
            let run_at = Utc::now();
            self.storage
                .with_connection(|conn| Self::write_log(conn, run_at, &candidates, threshold, true))?;

            return Ok(DecayRunResult {
                deleted_count: candidates.len(),
                deleted_ids: candidates,
                failed_ids: vec![],
                errors: vec![],
                threshold,
                grace_period_days: grace_days,
                dry_run: true,
            });
        }

        // One transaction per candidate; a failure leaves the others alone
        let mut deleted_ids = Vec::new();
        let mut failed_ids = Vec::new();
        let mut errors = Vec::new();

        for id in candidates {
            let outcome = self
                .storage
                .with_transaction(|conn| queries::delete_memory(conn, &id));

            match outcome {
                Ok(true) => deleted_ids.push(id),
                Ok(false) => failed_ids.push(id),
                Err(e) => {
                    errors.push(BatchItemError {
                        item: id.clone(),
                        error: e.to_string(),
                    });
                    failed_ids.push(id);
                }
            }
        }

        let run_at = Utc::now();
        self.storage.with_transaction(|conn| {
            Self::write_log(conn, run_at, &deleted_ids, threshold, false)?;

            let mut config = Self::load_config(conn)?;
            config.last_run_at = Some(run_at);
            Self::save_config(conn, &config)
        })?;

        tracing::info!(
            deleted = deleted_ids.len(),
            failed = failed_ids.len(),
            threshold,
            "decay run complete"
        );

        Ok(DecayRunResult {
            deleted_count: deleted_ids.len(),
            deleted_ids,
            failed_ids,
            errors,
            threshold,
            grace_period_days: grace_days,
            dry_run: false,
        })
    }

    /// Configuration plus candidate statistics
    pub async fn status(&self) -> Result<DecayStatus> {
        self.storage.with_connection(|conn| {
            let config = Self::load_config(conn)?;

            let total_memories: i64 =
                conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0))?;

            let cutoff = Utc::now() - chrono::Duration::days(config.grace_period_days);
            let decay_candidates: i64 = conn.query_row(
                "SELECT COUNT(*) FROM memories
                 WHERE importance_score <= ?1 AND created_at < ?2 AND expires_at IS NULL",
                params![config.threshold, cutoff.to_rfc3339()],
                |r| r.get(0),
            )?;

            let total_deleted: i64 = conn.query_row(
                "SELECT COALESCE(SUM(deleted_count), 0) FROM decay_log WHERE dry_run = 0",
                [],
                |r| r.get(0),
            )?;

            Ok(DecayStatus {
                config,
                total_memories,
                decay_candidates,
                total_deleted,
            })
        })
    }
}
