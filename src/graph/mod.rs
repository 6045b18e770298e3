//! Link graph: typed links between memories, BFS traversal, dependency
//! impact analysis with cycle detection, and change-notification fanout
//!
//! The graph is inherently cyclic; traversal carries an explicit visited
//! set, and dependency analysis additionally carries the current path stack
//! to tell a cycle apart from a plain revisit.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::Utc;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use crate::error::{MnemoError, Result};
use crate::storage::{queries, Storage};
use crate::types::*;

/// Which cascade flag an impact analysis follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CascadeKind {
    Update,
    Delete,
}

impl CascadeKind {
    fn column(&self) -> &'static str {
        match self {
            CascadeKind::Update => "cascade_on_update",
            CascadeKind::Delete => "cascade_on_delete",
        }
    }
}

/// Parameters for `GraphService::create_link`
#[derive(Debug, Clone)]
pub struct CreateLinkRequest {
    pub source_id: String,
    pub target_id: String,
    pub link_type: LinkType,
    pub bidirectional: bool,
    pub metadata: HashMap<String, serde_json::Value>,
    pub strength: f32,
    pub cascade_on_update: bool,
    pub cascade_on_delete: bool,
}

impl CreateLinkRequest {
    pub fn new(source_id: impl Into<String>, target_id: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            link_type: LinkType::Related,
            bidirectional: false,
            metadata: HashMap::new(),
            strength: 1.0,
            cascade_on_update: false,
            cascade_on_delete: false,
        }
    }
}

/// Result of `GraphService::propagate_update`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropagateResult {
    pub affected_count: usize,
    pub notifications_created: usize,
    pub affected_memory_ids: Vec<String>,
}

fn link_from_row(row: &Row) -> rusqlite::Result<MemoryLink> {
    let link_type_str: String = row.get("link_type")?;
    let metadata_str: String = row.get("metadata")?;
    let created_at: String = row.get("created_at")?;

    Ok(MemoryLink {
        id: row.get("id")?,
        source_id: row.get("source_id")?,
        target_id: row.get("target_id")?,
        link_type: link_type_str.parse().unwrap_or_default(),
        metadata: serde_json::from_str(&metadata_str).unwrap_or_default(),
        strength: row.get("strength")?,
        cascade_on_update: row.get::<_, i64>("cascade_on_update")? != 0,
        cascade_on_delete: row.get::<_, i64>("cascade_on_delete")? != 0,
        created_at: queries::parse_dt(&created_at),
    })
}

const LINK_COLUMNS: &str = "id, source_id, target_id, link_type, metadata, strength, \
     cascade_on_update, cascade_on_delete, created_at";

/// Canonical form of a cycle path (which ends with its repeated start):
/// the loop rotated so its smallest id comes first. Two discoveries of the
/// same simple cycle from different entry points compare equal.
fn canonical_cycle(cycle: &[String]) -> Vec<String> {
    if cycle.len() < 2 {
        return cycle.to_vec();
    }

    let nodes = &cycle[..cycle.len() - 1];
    let start = nodes
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.cmp(b.1))
        .map(|(i, _)| i)
        .unwrap_or(0);

    nodes[start..]
        .iter()
        .chain(nodes[..start].iter())
        .cloned()
        .collect()
}

/// Service for memory links and graph operations
#[derive(Clone)]
pub struct GraphService {
    storage: Storage,
}

impl GraphService {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    fn insert_link(conn: &Connection, link: &MemoryLink) -> Result<()> {
        let inserted = conn.execute(
            "INSERT INTO memory_links (
                id, source_id, target_id, link_type, metadata, strength,
                cascade_on_update, cascade_on_delete, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                link.id,
                link.source_id,
                link.target_id,
                link.link_type.as_str(),
                serde_json::to_string(&link.metadata)?,
                link.strength,
                link.cascade_on_update as i64,
                link.cascade_on_delete as i64,
                link.created_at.to_rfc3339(),
            ],
        );

        match inserted {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(MnemoError::Conflict(format!(
                    "link {} -> {} ({}) already exists",
                    link.source_id,
                    link.target_id,
                    link.link_type.as_str()
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Create a link; a bidirectional request also inserts the reverse edge
    /// with the mapped type (parent<->child, others map to themselves)
    pub async fn create_link(&self, req: CreateLinkRequest) -> Result<MemoryLink> {
        if req.source_id == req.target_id {
            return Err(MnemoError::Validation(
                "cannot create a link to self".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&req.strength) {
            return Err(MnemoError::Validation(
                "strength must be between 0.0 and 1.0".to_string(),
            ));
        }

        self.storage.with_transaction(|conn| {
            if queries::find_memory(conn, &req.source_id)?.is_none() {
                return Err(MnemoError::NotFound(format!(
                    "source memory {}",
                    req.source_id
                )));
            }
            if queries::find_memory(conn, &req.target_id)?.is_none() {
                return Err(MnemoError::NotFound(format!(
                    "target memory {}",
                    req.target_id
                )));
            }

            let now = Utc::now();
            let link = MemoryLink {
                id: new_id(),
                source_id: req.source_id.clone(),
                target_id: req.target_id.clone(),
                link_type: req.link_type,
                metadata: req.metadata.clone(),
                strength: req.strength,
                cascade_on_update: req.cascade_on_update,
                cascade_on_delete: req.cascade_on_delete,
                created_at: now,
            };
            Self::insert_link(conn, &link)?;

            if req.bidirectional {
                let reverse = MemoryLink {
                    id: new_id(),
                    source_id: req.target_id.clone(),
                    target_id: req.source_id.clone(),
                    link_type: req.link_type.reversed(),
                    metadata: req.metadata.clone(),
                    strength: req.strength,
                    cascade_on_update: req.cascade_on_update,
                    cascade_on_delete: req.cascade_on_delete,
                    created_at: now,
                };
                Self::insert_link(conn, &reverse)?;
            }

            Ok(link)
        })
    }

    /// Delete links between two memories in both directions; returns count
    pub async fn delete_link(
        &self,
        source_id: &str,
        target_id: &str,
        link_type: Option<LinkType>,
    ) -> Result<usize> {
        self.storage.with_transaction(|conn| {
            let deleted = match link_type {
                Some(lt) => conn.execute(
                    "DELETE FROM memory_links
                     WHERE (source_id = ?1 AND target_id = ?2 AND link_type = ?3)
                        OR (source_id = ?2 AND target_id = ?1 AND link_type = ?3)",
                    params![source_id, target_id, lt.as_str()],
                )?,
                None => conn.execute(
                    "DELETE FROM memory_links
                     WHERE (source_id = ?1 AND target_id = ?2)
                        OR (source_id = ?2 AND target_id = ?1)",
                    params![source_id, target_id],
                )?,
            };
            Ok(deleted)
        })
    }

    /// List links touching a memory
    pub async fn get_links(
        &self,
        memory_id: &str,
        direction: LinkDirection,
        link_type: Option<LinkType>,
    ) -> Result<Vec<MemoryLink>> {
        self.storage.with_connection(|conn| {
            let mut sql = format!("SELECT {LINK_COLUMNS} FROM memory_links WHERE ");
            let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            match direction {
                LinkDirection::Outgoing => {
                    sql.push_str("source_id = ?");
                    params.push(Box::new(memory_id.to_string()));
                }
                LinkDirection::Incoming => {
                    sql.push_str("target_id = ?");
                    params.push(Box::new(memory_id.to_string()));
                }
                LinkDirection::Both => {
                    sql.push_str("(source_id = ? OR target_id = ?)");
                    params.push(Box::new(memory_id.to_string()));
                    params.push(Box::new(memory_id.to_string()));
                }
            }

            if let Some(lt) = link_type {
                sql.push_str(" AND link_type = ?");
                params.push(Box::new(lt.as_str()));
            }
            sql.push_str(" ORDER BY created_at");

            let param_refs: Vec<&dyn rusqlite::ToSql> =
                params.iter().map(|b| b.as_ref()).collect();
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(param_refs.as_slice(), link_from_row)?;

            let mut links = Vec::new();
            for row in rows {
                links.push(row?);
            }
            Ok(links)
        })
    }

    /// BFS over the link graph, treating edges as undirected
    ///
    /// Results are sorted by depth ascending and capped at `max_results`.
    /// `max_depth == 0` yields nothing; a missing start is a Validation
    /// error since the argument itself is unusable.
    pub async fn traverse(
        &self,
        start_memory_id: &str,
        max_depth: usize,
        max_results: usize,
        link_types: Option<&[LinkType]>,
    ) -> Result<Vec<(Memory, TraversalNode)>> {
        self.storage.with_connection(|conn| {
            if queries::find_memory(conn, start_memory_id)?.is_none() {
                return Err(MnemoError::Validation(format!(
                    "start memory not found: {}",
                    start_memory_id
                )));
            }

            let mut queue: VecDeque<TraversalNode> = VecDeque::new();
            let mut visited: HashSet<String> = HashSet::new();
            let mut results: Vec<(Memory, TraversalNode)> = Vec::new();

            visited.insert(start_memory_id.to_string());
            queue.push_back(TraversalNode {
                memory_id: start_memory_id.to_string(),
                depth: 0,
                link_type: None,
                path: vec![start_memory_id.to_string()],
            });

            while let Some(current) = queue.pop_front() {
                if results.len() >= max_results {
                    break;
                }
                if current.depth >= max_depth {
                    continue;
                }

                for (neighbor_id, link_type) in
                    Self::neighbors(conn, &current.memory_id, link_types)?
                {
                    if visited.contains(&neighbor_id) {
                        continue;
                    }
                    visited.insert(neighbor_id.clone());

                    let mut path = current.path.clone();
                    path.push(neighbor_id.clone());
                    let node = TraversalNode {
                        memory_id: neighbor_id.clone(),
                        depth: current.depth + 1,
                        link_type: Some(link_type),
                        path,
                    };

                    if let Some(memory) = queries::find_memory(conn, &neighbor_id)? {
                        results.push((memory, node.clone()));
                        if current.depth + 1 < max_depth {
                            queue.push_back(node);
                        }
                    }

                    if results.len() >= max_results {
                        break;
                    }
                }
            }

            results.sort_by_key(|(_, node)| node.depth);
            Ok(results)
        })
    }

    /// Undirected neighbor list with optional link-type filter
    fn neighbors(
        conn: &Connection,
        memory_id: &str,
        link_types: Option<&[LinkType]>,
    ) -> Result<Vec<(String, LinkType)>> {
        let mut stmt = conn.prepare_cached(
            "SELECT source_id, target_id, link_type FROM memory_links
             WHERE source_id = ?1 OR target_id = ?1",
        )?;

        let rows = stmt.query_map(params![memory_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut neighbors = Vec::new();
        for row in rows {
            let (source, target, type_str) = row?;
            let link_type: LinkType = type_str.parse().unwrap_or_default();

            if let Some(allowed) = link_types {
                if !allowed.contains(&link_type) {
                    continue;
                }
            }

            let neighbor = if source == memory_id { target } else { source };
            neighbors.push((neighbor, link_type));
        }
        Ok(neighbors)
    }

    /// Directed walk over links carrying the selected cascade flag
    ///
    /// A node reappearing on the current path marks a cycle; the path
    /// suffix from its first occurrence is recorded and expansion stops
    /// there. Every simple cycle reachable within `max_depth` is reported
    /// once. Returned cycles are sorted longest first.
    pub async fn analyze_impact(
        &self,
        memory_id: &str,
        cascade: CascadeKind,
        max_depth: usize,
    ) -> Result<DependencyAnalysis> {
        if !(1..=10).contains(&max_depth) {
            return Err(MnemoError::Validation(
                "max_depth must be between 1 and 10".to_string(),
            ));
        }

        self.storage.with_connection(|conn| {
            if queries::find_memory(conn, memory_id)?.is_none() {
                return Err(MnemoError::NotFound(format!("memory {}", memory_id)));
            }

            let mut seen: HashSet<String> = HashSet::new();
            seen.insert(memory_id.to_string());
            let mut explored: HashSet<String> = HashSet::new();
            let mut affected: Vec<AffectedMemory> = Vec::new();
            let mut cycles: Vec<Vec<String>> = Vec::new();

            Self::walk_cascade(
                conn,
                memory_id,
                0,
                max_depth,
                cascade,
                &mut seen,
                &mut explored,
                &mut Vec::new(),
                &mut affected,
                &mut cycles,
            )?;

            affected.retain(|a| a.memory_id != memory_id);

            // The same loop can be entered from several branches; keep one
            // record per simple cycle
            let mut unique_cycles: HashSet<Vec<String>> = HashSet::new();
            cycles.retain(|cycle| unique_cycles.insert(canonical_cycle(cycle)));
            cycles.sort_by_key(|c| std::cmp::Reverse(c.len()));

            let max_depth_reached = affected.iter().map(|a| a.depth).max().unwrap_or(0);

            Ok(DependencyAnalysis {
                source_id: memory_id.to_string(),
                total_affected: affected.len(),
                max_depth_reached,
                has_cycles: !cycles.is_empty(),
                cycle_paths: cycles,
                affected,
            })
        })
    }

    /// Depth-first cascade walk. Returns (hit_path, truncated): whether any
    /// descendant reached back into the current path, and whether the walk
    /// was cut off by the depth cap. A branch is only memoized in `explored`
    /// when its whole subtree finished cycle-free and untruncated; anything
    /// else stays re-walkable from other branches, so distinct simple cycles
    /// through a shared node are all found. `seen` only dedupes `affected`.
    #[allow(clippy::too_many_arguments)]
    fn walk_cascade(
        conn: &Connection,
        current_id: &str,
        depth: usize,
        max_depth: usize,
        cascade: CascadeKind,
        seen: &mut HashSet<String>,
        explored: &mut HashSet<String>,
        path: &mut Vec<String>,
        affected: &mut Vec<AffectedMemory>,
        cycles: &mut Vec<Vec<String>>,
    ) -> Result<(bool, bool)> {
        if depth >= max_depth {
            return Ok((false, true));
        }

        // A node already on the path is a cycle, not a revisit
        if let Some(pos) = path.iter().position(|id| id == current_id) {
            let mut cycle: Vec<String> = path[pos..].to_vec();
            cycle.push(current_id.to_string());
            cycles.push(cycle);
            return Ok((true, false));
        }

        // Fully explored and cycle-free: nothing new down this subtree
        if explored.contains(current_id) {
            return Ok((false, false));
        }

        let links: Vec<(String, LinkType, f32)> = {
            let sql = format!(
                "SELECT target_id, link_type, strength FROM memory_links
                 WHERE source_id = ?1 AND {} = 1",
                cascade.column()
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![current_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f32>(2)?,
                ))
            })?;

            let mut links = Vec::new();
            for row in rows {
                let (target, type_str, strength) = row?;
                links.push((target, type_str.parse().unwrap_or_default(), strength));
            }
            links
        };

        path.push(current_id.to_string());

        let mut hit_path = false;
        let mut truncated = false;
        for (target_id, link_type, strength) in links {
            if seen.insert(target_id.clone()) {
                affected.push(AffectedMemory {
                    memory_id: target_id.clone(),
                    depth: depth + 1,
                    link_type,
                    strength,
                });
            }

            let (hit, trunc) = Self::walk_cascade(
                conn,
                &target_id,
                depth + 1,
                max_depth,
                cascade,
                seen,
                explored,
                path,
                affected,
                cycles,
            )?;
            hit_path |= hit;
            truncated |= trunc;
        }

        path.pop();

        if !hit_path && !truncated {
            explored.insert(current_id.to_string());
        }

        Ok((hit_path, truncated))
    }

    /// Run impact analysis and insert one notification per affected memory,
    /// all within a single transaction
    pub async fn propagate_update(
        &self,
        memory_id: &str,
        notification_type: NotificationType,
        metadata: Option<HashMap<String, serde_json::Value>>,
    ) -> Result<PropagateResult> {
        let cascade = match notification_type {
            NotificationType::Delete => CascadeKind::Delete,
            _ => CascadeKind::Update,
        };

        let analysis = self.analyze_impact(memory_id, cascade, 5).await?;

        let metadata_json = serde_json::to_string(&metadata.unwrap_or_default())?;
        let affected_ids: Vec<String> = analysis
            .affected
            .iter()
            .map(|a| a.memory_id.clone())
            .collect();

        self.storage.with_transaction(|conn| {
            for target_id in &affected_ids {
                conn.execute(
                    "INSERT INTO dependency_notifications (
                        id, source_id, target_id, notification_type, metadata,
                        created_at, processed_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)",
                    params![
                        new_id(),
                        memory_id,
                        target_id,
                        notification_type.as_str(),
                        metadata_json,
                        Utc::now().to_rfc3339(),
                    ],
                )?;
            }
            Ok(())
        })?;

        Ok(PropagateResult {
            affected_count: analysis.total_affected,
            notifications_created: affected_ids.len(),
            affected_memory_ids: affected_ids,
        })
    }

    /// Unprocessed notifications for a target, oldest first
    pub async fn get_pending_notifications(
        &self,
        target_memory_id: &str,
    ) -> Result<Vec<DependencyNotification>> {
        self.storage.with_connection(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, source_id, target_id, notification_type, metadata,
                        created_at, processed_at
                 FROM dependency_notifications
                 WHERE target_id = ?1 AND processed_at IS NULL
                 ORDER BY created_at ASC",
            )?;

            let rows = stmt.query_map(params![target_memory_id], |row| {
                let type_str: String = row.get("notification_type")?;
                let metadata_str: String = row.get("metadata")?;
                let created_at: String = row.get("created_at")?;
                let processed_at: Option<String> = row.get("processed_at")?;

                Ok(DependencyNotification {
                    id: row.get("id")?,
                    source_id: row.get("source_id")?,
                    target_id: row.get("target_id")?,
                    notification_type: type_str.parse().unwrap_or(NotificationType::Update),
                    metadata: serde_json::from_str(&metadata_str).unwrap_or_default(),
                    created_at: queries::parse_dt(&created_at),
                    processed_at: processed_at.map(|s| queries::parse_dt(&s)),
                })
            })?;

            let mut notifications = Vec::new();
            for row in rows {
                notifications.push(row?);
            }
            Ok(notifications)
        })
    }

    /// Stamp a notification as processed
    pub async fn mark_processed(&self, notification_id: &str) -> Result<()> {
        let updated = self.storage.with_connection(|conn| {
            Ok(conn.execute(
                "UPDATE dependency_notifications SET processed_at = ?1 WHERE id = ?2",
                params![Utc::now().to_rfc3339(), notification_id],
            )?)
        })?;

        if updated == 0 {
            return Err(MnemoError::NotFound(format!(
                "notification {}",
                notification_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::canonical_cycle;

    fn cycle(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_canonical_cycle_rotation() {
        // The same loop entered at different nodes canonicalizes equally
        let via_b = cycle(&["b", "d", "a", "b"]);
        let via_a = cycle(&["a", "b", "d", "a"]);
        assert_eq!(canonical_cycle(&via_b), canonical_cycle(&via_a));
        assert_eq!(canonical_cycle(&via_a), cycle(&["a", "b", "d"]));
    }

    #[test]
    fn test_canonical_cycle_distinct_loops_differ() {
        let left = cycle(&["a", "b", "d", "a"]);
        let right = cycle(&["a", "c", "d", "a"]);
        assert_ne!(canonical_cycle(&left), canonical_cycle(&right));
    }
}
