//! Memory versioning
//!
//! Every mutating update snapshots the pre-image before applying the
//! change (see `storage::queries::update_memory`). This service exposes the
//! history, single-version fetch, rollback, diffing, and pruning on top of
//! those snapshots.

use std::collections::HashMap;
use std::sync::Arc;

use similar::TextDiff;

use crate::embedding::Embedder;
use crate::error::{MnemoError, Result};
use crate::storage::{queries, Storage};
use crate::types::{Memory, MemoryUpdate, MemoryVersion, VersionDiff, VersionHistory};

/// Maximum versions returned by a history call
const MAX_HISTORY_LIMIT: usize = 50;

/// Diff output cap in lines
const MAX_DIFF_LINES: usize = 2000;

/// Snapshots kept by default when pruning
const DEFAULT_MAX_KEEP: usize = 10;

/// Service for managing memory versions
#[derive(Clone)]
pub struct VersioningService {
    storage: Storage,
    embedder: Arc<dyn Embedder>,
}

impl VersioningService {
    pub fn new(storage: Storage, embedder: Arc<dyn Embedder>) -> Self {
        Self { storage, embedder }
    }

    /// Version history, newest snapshots first
    pub async fn get_history(&self, memory_id: &str, limit: usize) -> Result<VersionHistory> {
        if limit == 0 || limit > MAX_HISTORY_LIMIT {
            return Err(MnemoError::Validation(format!(
                "limit must be between 1 and {}",
                MAX_HISTORY_LIMIT
            )));
        }

        self.storage.with_connection(|conn| {
            let Some(memory) = queries::find_memory(conn, memory_id)? else {
                return Err(MnemoError::NotFound(format!("memory {}", memory_id)));
            };

            let versions = queries::get_versions(conn, memory_id, limit)?;
            let snapshot_count = queries::count_versions(conn, memory_id)?;

            Ok(VersionHistory {
                memory_id: memory_id.to_string(),
                current_version: memory.version,
                total_versions: snapshot_count + 1,
                versions,
            })
        })
    }

    /// A specific version snapshot
    pub async fn get_version(&self, memory_id: &str, version: i64) -> Result<MemoryVersion> {
        self.storage.with_connection(|conn| {
            if queries::find_memory(conn, memory_id)?.is_none() {
                return Err(MnemoError::NotFound(format!("memory {}", memory_id)));
            }

            queries::get_version(conn, memory_id, version)?.ok_or_else(|| {
                MnemoError::NotFound(format!(
                    "version {} of memory {}",
                    version, memory_id
                ))
            })
        })
    }

    /// Roll a memory back to a prior snapshot
    ///
    /// The rollback is itself a mutating update, so the current state is
    /// snapshotted first with the supplied reason, then overwritten with
    /// the target snapshot's content/tags/metadata.
    pub async fn rollback(
        &self,
        memory_id: &str,
        target_version: i64,
        reason: Option<String>,
    ) -> Result<Memory> {
        let (target, current_version) = self.storage.with_connection(|conn| {
            let Some(memory) = queries::find_memory(conn, memory_id)? else {
                return Err(MnemoError::NotFound(format!("memory {}", memory_id)));
            };

            let Some(target) = queries::get_version(conn, memory_id, target_version)? else {
                return Err(MnemoError::NotFound(format!(
                    "version {} of memory {}",
                    target_version, memory_id
                )));
            };

            Ok((target, memory.version))
        })?;

        if target_version == current_version {
            return Err(MnemoError::Validation(format!(
                "cannot rollback to current version {}",
                target_version
            )));
        }

        let rollback_reason =
            reason.unwrap_or_else(|| format!("Rollback to version {}", target_version));

        let new_embedding = self.embedder.embed(&target.content, false)?;

        let updated = self.storage.with_transaction(|conn| {
            let update = MemoryUpdate {
                content: Some(target.content.clone()),
                tags: Some(target.tags.clone()),
                metadata: Some(target.metadata.clone()),
                ..Default::default()
            };

            let updated = queries::update_memory(conn, memory_id, &update, Some(&rollback_reason))?;
            if updated.is_some() {
                queries::replace_embedding(conn, memory_id, &new_embedding)?;
            }
            Ok(updated)
        })?;

        updated.ok_or_else(|| MnemoError::NotFound(format!("memory {}", memory_id)))
    }

    /// Unified diff between two snapshots (old < new)
    pub async fn diff_versions(
        &self,
        memory_id: &str,
        old_version: i64,
        new_version: i64,
    ) -> Result<VersionDiff> {
        if old_version >= new_version {
            return Err(MnemoError::Validation(format!(
                "old_version ({}) must be less than new_version ({})",
                old_version, new_version
            )));
        }

        let (old, new) = self.storage.with_connection(|conn| {
            let old = queries::get_version(conn, memory_id, old_version)?.ok_or_else(|| {
                MnemoError::NotFound(format!(
                    "version {} of memory {}",
                    old_version, memory_id
                ))
            })?;
            let new = queries::get_version(conn, memory_id, new_version)?.ok_or_else(|| {
                MnemoError::NotFound(format!(
                    "version {} of memory {}",
                    new_version, memory_id
                ))
            })?;
            Ok((old, new))
        })?;

        let content_changed = old.content != new.content;
        let content_diff = if content_changed {
            let diff = TextDiff::from_lines(old.content.as_str(), new.content.as_str());
            let unified = diff
                .unified_diff()
                .header(&format!("v{}", old_version), &format!("v{}", new_version))
                .to_string();

            let trimmed: String = unified
                .lines()
                .take(MAX_DIFF_LINES)
                .collect::<Vec<_>>()
                .join("\n");
            Some(trimmed)
        } else {
            None
        };

        let old_tags: std::collections::HashSet<&String> = old.tags.iter().collect();
        let new_tags: std::collections::HashSet<&String> = new.tags.iter().collect();
        let tags_added = new_tags.difference(&old_tags).map(|s| (*s).clone()).collect();
        let tags_removed = old_tags.difference(&new_tags).map(|s| (*s).clone()).collect();

        let mut metadata_changed = HashMap::new();
        let all_keys: std::collections::HashSet<&String> =
            old.metadata.keys().chain(new.metadata.keys()).collect();
        for key in all_keys {
            let old_value = old.metadata.get(key);
            let new_value = new.metadata.get(key);
            if old_value != new_value {
                metadata_changed.insert(
                    key.clone(),
                    serde_json::json!({ "old": old_value, "new": new_value }),
                );
            }
        }

        Ok(VersionDiff {
            memory_id: memory_id.to_string(),
            old_version,
            new_version,
            content_changed,
            content_diff,
            tags_added,
            tags_removed,
            metadata_changed,
        })
    }

    /// Delete snapshots beyond the newest `max_keep`; returns deleted count
    pub async fn prune_old_versions(
        &self,
        memory_id: &str,
        max_keep: Option<usize>,
    ) -> Result<usize> {
        let max_keep = max_keep.unwrap_or(DEFAULT_MAX_KEEP);
        self.storage
            .with_transaction(|conn| queries::prune_versions(conn, memory_id, max_keep))
    }
}
