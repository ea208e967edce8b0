//! Tag taxonomy: path resolution, subtree scoping, reparenting and deletion.

use super::{placeholders, write_tx, Database};
use crate::error::{is_trigger_abort, is_unique_violation, Result, TrackerError};
use crate::types::{Tag, TagChanges, TagForestSummary, TagId, TagSummary, TagTreeNode};
use crate::validate::{normalize_tag_name, normalize_tag_path};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::{HashMap, HashSet, VecDeque};

pub(crate) fn parse_tag_row(row: &Row) -> rusqlite::Result<Tag> {
    Ok(Tag {
        id: row.get("id")?,
        name: row.get("name")?,
        parent_id: row.get("parent_id")?,
    })
}

pub(crate) fn get_tag_internal(conn: &Connection, tag_id: TagId) -> Result<Option<Tag>> {
    let tag = conn
        .query_row(
            "SELECT id, name, parent_id FROM tags WHERE id = ?1",
            params![tag_id],
            parse_tag_row,
        )
        .optional()?;
    Ok(tag)
}

pub(crate) fn require_tag(conn: &Connection, tag_id: TagId) -> Result<Tag> {
    get_tag_internal(conn, tag_id)?.ok_or(TrackerError::TagNotFound(tag_id))
}

/// Find the child named `name` under `parent_id` (root when `None`).
fn find_child(conn: &Connection, name: &str, parent_id: Option<TagId>) -> Result<Option<Tag>> {
    let tag = match parent_id {
        Some(pid) => conn
            .query_row(
                "SELECT id, name, parent_id FROM tags WHERE name = ?1 AND parent_id = ?2",
                params![name, pid],
                parse_tag_row,
            )
            .optional()?,
        None => conn
            .query_row(
                "SELECT id, name, parent_id FROM tags WHERE name = ?1 AND parent_id IS NULL",
                params![name],
                parse_tag_row,
            )
            .optional()?,
    };
    Ok(tag)
}

fn insert_tag(conn: &Connection, name: &str, parent_id: Option<TagId>) -> Result<Tag> {
    if find_child(conn, name, parent_id)?.is_some() {
        return Err(TrackerError::DuplicateTag {
            name: name.to_string(),
            parent: parent_id,
        });
    }

    conn.execute(
        "INSERT INTO tags (name, parent_id) VALUES (?1, ?2)",
        params![name, parent_id],
    )
    .map_err(|e| {
        if is_unique_violation(&e) {
            TrackerError::DuplicateTag {
                name: name.to_string(),
                parent: parent_id,
            }
        } else {
            e.into()
        }
    })?;

    Ok(Tag {
        id: conn.last_insert_rowid(),
        name: name.to_string(),
        parent_id,
    })
}

fn resolve_segments(conn: &Connection, segments: &[String]) -> Result<Option<Tag>> {
    let mut parent_id = None;
    let mut current = None;

    for segment in segments {
        match find_child(conn, segment, parent_id)? {
            Some(tag) => {
                parent_id = Some(tag.id);
                current = Some(tag);
            }
            None => return Ok(None),
        }
    }

    Ok(current)
}

pub(crate) fn resolve_path_internal(conn: &Connection, path: &str) -> Result<Option<Tag>> {
    let segments = normalize_tag_path(path)?;
    resolve_segments(conn, &segments)
}

/// Walk the path, creating missing segments under the right parent.
pub(crate) fn ensure_path_internal(conn: &Connection, path: &str) -> Result<Tag> {
    let segments = normalize_tag_path(path)?;
    let mut parent_id = None;
    let mut current = None;

    for segment in &segments {
        let tag = match find_child(conn, segment, parent_id)? {
            Some(existing) => existing,
            None => {
                // Another writer may have created it since the lookup.
                conn.execute(
                    "INSERT OR IGNORE INTO tags (name, parent_id) VALUES (?1, ?2)",
                    params![segment, parent_id],
                )?;
                find_child(conn, segment, parent_id)?.ok_or_else(|| {
                    TrackerError::internal(format!("failed to create tag segment '{}'", segment))
                })?
            }
        };
        parent_id = Some(tag.id);
        current = Some(tag);
    }

    current.ok_or_else(|| TrackerError::internal("failed to resolve tag path"))
}

/// The tag id plus every descendant id, breadth first.
pub(crate) fn subtree_ids_internal(conn: &Connection, tag_id: TagId) -> Result<Vec<TagId>> {
    let mut stmt = conn.prepare_cached("SELECT id FROM tags WHERE parent_id = ?1")?;
    let mut visited: HashSet<TagId> = HashSet::new();
    let mut order = Vec::new();
    let mut queue: VecDeque<TagId> = VecDeque::new();
    queue.push_back(tag_id);

    while let Some(current) = queue.pop_front() {
        if !visited.insert(current) {
            continue;
        }
        order.push(current);

        let children = stmt
            .query_map(params![current], |row| row.get::<_, TagId>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for child in children {
            if !visited.contains(&child) {
                queue.push_back(child);
            }
        }
    }

    Ok(order)
}

/// True if `new_parent` is `tag_id` or sits somewhere below it.
fn would_create_tag_cycle(conn: &Connection, tag_id: TagId, new_parent: TagId) -> Result<bool> {
    let mut seen = HashSet::new();
    let mut current = Some(new_parent);

    while let Some(id) = current {
        if id == tag_id {
            return Ok(true);
        }
        if !seen.insert(id) {
            // Existing data already loops; refuse to make it worse.
            return Ok(true);
        }
        current = conn
            .query_row(
                "SELECT parent_id FROM tags WHERE id = ?1",
                params![id],
                |row| row.get::<_, Option<TagId>>(0),
            )
            .optional()?
            .flatten();
    }

    Ok(false)
}

pub(crate) fn load_tags(conn: &Connection, ids: Option<&[TagId]>) -> Result<Vec<Tag>> {
    let tags = match ids {
        Some(ids) => {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let sql = format!(
                "SELECT id, name, parent_id FROM tags WHERE id IN ({})",
                placeholders(ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_map(rusqlite::params_from_iter(ids.iter()), parse_tag_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        }
        None => {
            let mut stmt = conn.prepare("SELECT id, name, parent_id FROM tags ORDER BY id")?;
            stmt.query_map([], parse_tag_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?
        }
    };
    Ok(tags)
}

fn sort_nodes(nodes: &mut [TagTreeNode]) {
    nodes.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
}

fn build_node(tag: &Tag, children: &HashMap<TagId, Vec<&Tag>>) -> TagTreeNode {
    let mut kids: Vec<TagTreeNode> = children
        .get(&tag.id)
        .map(|list| list.iter().map(|child| build_node(child, children)).collect())
        .unwrap_or_default();
    sort_nodes(&mut kids);

    TagTreeNode {
        id: tag.id,
        name: tag.name.clone(),
        parent_id: tag.parent_id,
        children: kids,
    }
}

/// Arrange tags into a forest sorted by name, then id. A tag whose parent is
/// not among `tags` becomes a root.
pub fn build_tag_forest(tags: &[Tag]) -> Vec<TagTreeNode> {
    let ids: HashSet<TagId> = tags.iter().map(|t| t.id).collect();
    let mut children: HashMap<TagId, Vec<&Tag>> = HashMap::new();
    let mut roots = Vec::new();

    for tag in tags {
        match tag.parent_id {
            Some(pid) if ids.contains(&pid) => children.entry(pid).or_default().push(tag),
            _ => roots.push(tag),
        }
    }

    let mut forest: Vec<TagTreeNode> = roots
        .into_iter()
        .map(|root| build_node(root, &children))
        .collect();
    sort_nodes(&mut forest);
    forest
}

fn count_todos_in(conn: &Connection, tag_ids: &[TagId]) -> Result<i64> {
    if tag_ids.is_empty() {
        return Ok(0);
    }
    let sql = format!(
        "SELECT count(*) FROM todos WHERE tag_id IN ({})",
        placeholders(tag_ids.len())
    );
    let count = conn.query_row(&sql, rusqlite::params_from_iter(tag_ids.iter()), |row| {
        row.get(0)
    })?;
    Ok(count)
}

impl Database {
    /// Create a single tag under `parent_id` (or at the root).
    pub fn create_tag(&self, name: &str, parent_id: Option<TagId>) -> Result<Tag> {
        let name = normalize_tag_name(name)?;

        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;
            if let Some(pid) = parent_id {
                require_tag(&tx, pid)?;
            }
            let tag = insert_tag(&tx, &name, parent_id)?;
            tx.commit()?;
            Ok(tag)
        })
    }

    pub fn get_tag(&self, tag_id: TagId) -> Result<Option<Tag>> {
        self.with_conn(|conn| get_tag_internal(conn, tag_id))
    }

    pub fn list_tags(&self) -> Result<Vec<Tag>> {
        self.with_conn(|conn| load_tags(conn, None))
    }

    /// Resolve a slash path to its deepest tag, or `None` if any segment is missing.
    pub fn resolve_tag_path(&self, path: &str) -> Result<Option<Tag>> {
        self.with_conn(|conn| resolve_path_internal(conn, path))
    }

    /// Resolve a slash path, creating missing segments. Idempotent.
    pub fn ensure_tag_path(&self, path: &str) -> Result<Tag> {
        // Validate before taking the write lock.
        normalize_tag_path(path)?;

        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;
            let tag = ensure_path_internal(&tx, path)?;
            tx.commit()?;
            Ok(tag)
        })
    }

    /// The tag id plus all descendant ids.
    pub fn tag_subtree_ids(&self, tag_id: TagId) -> Result<Vec<TagId>> {
        self.with_conn(|conn| {
            require_tag(conn, tag_id)?;
            subtree_ids_internal(conn, tag_id)
        })
    }

    /// Rename and/or reparent a tag. Cycles are rejected before any row changes.
    pub fn update_tag(&self, tag_id: TagId, changes: TagChanges) -> Result<Tag> {
        let new_name = changes.name.as_deref().map(normalize_tag_name).transpose()?;

        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;
            let existing = require_tag(&tx, tag_id)?;

            let name = new_name.unwrap_or(existing.name.clone());
            let parent_id = match changes.parent_id {
                Some(Some(pid)) => {
                    require_tag(&tx, pid)?;
                    if would_create_tag_cycle(&tx, tag_id, pid)? {
                        return Err(TrackerError::TagCycle {
                            tag: tag_id,
                            parent: pid,
                        });
                    }
                    Some(pid)
                }
                Some(None) => None,
                None => existing.parent_id,
            };

            if let Some(clash) = find_child(&tx, &name, parent_id)? {
                if clash.id != tag_id {
                    return Err(TrackerError::DuplicateTag {
                        name,
                        parent: parent_id,
                    });
                }
            }

            tx.execute(
                "UPDATE tags SET name = ?1, parent_id = ?2 WHERE id = ?3",
                params![name, parent_id, tag_id],
            )
            .map_err(|e| {
                if is_unique_violation(&e) {
                    TrackerError::DuplicateTag {
                        name: name.clone(),
                        parent: parent_id,
                    }
                } else if is_trigger_abort(&e, "own parent") {
                    TrackerError::TagCycle {
                        tag: tag_id,
                        parent: tag_id,
                    }
                } else {
                    e.into()
                }
            })?;

            tx.commit()?;

            Ok(Tag {
                id: tag_id,
                name,
                parent_id,
            })
        })
    }

    /// Delete a tag and its descendants. Todos tagged anywhere in the subtree
    /// keep existing with their tag cleared.
    pub fn delete_tag(&self, tag_id: TagId) -> Result<Tag> {
        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;
            let existing = require_tag(&tx, tag_id)?;
            let subtree = subtree_ids_internal(&tx, tag_id)?;
            let list = placeholders(subtree.len());

            tx.execute(
                &format!("UPDATE todos SET tag_id = NULL WHERE tag_id IN ({})", list),
                rusqlite::params_from_iter(subtree.iter()),
            )?;
            tx.execute(
                &format!("DELETE FROM tags WHERE id IN ({})", list),
                rusqlite::params_from_iter(subtree.iter()),
            )?;

            tx.commit()?;
            Ok(existing)
        })
    }

    /// A tag, its sorted subtree, and the number of todos in that subtree.
    pub fn tag_summary(&self, tag_id: TagId) -> Result<Option<TagSummary>> {
        self.with_conn(|conn| {
            let Some(tag) = get_tag_internal(conn, tag_id)? else {
                return Ok(None);
            };

            let subtree = subtree_ids_internal(conn, tag_id)?;
            let tags = load_tags(conn, Some(&subtree))?;
            let tag_tree = build_tag_forest(&tags)
                .into_iter()
                .find(|node| node.id == tag_id)
                .ok_or_else(|| TrackerError::internal("tag missing from its own subtree"))?;
            let todo_count = count_todos_in(conn, &subtree)?;

            Ok(Some(TagSummary {
                tag,
                tag_tree,
                todo_count,
            }))
        })
    }

    /// The whole tag forest and the number of tagged todos.
    pub fn all_tags_summary(&self) -> Result<TagForestSummary> {
        self.with_conn(|conn| {
            let tags = load_tags(conn, None)?;
            let todo_count: i64 = conn.query_row(
                "SELECT count(*) FROM todos WHERE tag_id IS NOT NULL",
                [],
                |row| row.get(0),
            )?;

            Ok(TagForestSummary {
                tag_tree: build_tag_forest(&tags),
                todo_count,
            })
        })
    }
}
