//! Dependency edges, blocked-state computation and cycle detection.

use super::todos::require_todo_exists;
use super::{write_tx, Database};
use crate::error::{Result, TrackerError};
use crate::types::{Dependency, TodoId};
use rusqlite::{params, Connection};
use std::collections::{HashSet, VecDeque};

/// SQL predicate that is true when the todo aliased `t` has an incomplete
/// predecessor. Evaluated on every read; nothing caches it.
pub(crate) const BLOCKED_PREDICATE: &str = "EXISTS (
    SELECT 1 FROM todo_dependencies d
    JOIN todos p ON p.id = d.predecessor_id
    WHERE d.successor_id = t.id AND p.status != 'completed'
)";

/// True if `predecessor` already (transitively) depends on `successor`, so
/// that adding `successor <- predecessor` would close a cycle.
pub(crate) fn would_create_cycle(
    conn: &Connection,
    successor: TodoId,
    predecessor: TodoId,
) -> Result<bool> {
    let mut stmt =
        conn.prepare_cached("SELECT successor_id FROM todo_dependencies WHERE predecessor_id = ?1")?;
    let mut visited: HashSet<TodoId> = HashSet::new();
    let mut queue: VecDeque<TodoId> = VecDeque::new();
    queue.push_back(successor);

    while let Some(current) = queue.pop_front() {
        if current == predecessor {
            return Ok(true);
        }
        if !visited.insert(current) {
            continue;
        }

        let next = stmt
            .query_map(params![current], |row| row.get::<_, TodoId>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        for id in next {
            if !visited.contains(&id) {
                queue.push_back(id);
            }
        }
    }

    Ok(false)
}

pub(crate) fn add_dependency_internal(
    conn: &Connection,
    successor: TodoId,
    predecessor: TodoId,
) -> Result<()> {
    if successor == predecessor {
        return Err(TrackerError::SelfDependency(successor));
    }
    require_todo_exists(conn, successor)?;
    require_todo_exists(conn, predecessor)?;

    if would_create_cycle(conn, successor, predecessor)? {
        return Err(TrackerError::DependencyCycle {
            successor,
            predecessor,
        });
    }

    conn.execute(
        "INSERT OR IGNORE INTO todo_dependencies (successor_id, predecessor_id) VALUES (?1, ?2)",
        params![successor, predecessor],
    )?;
    Ok(())
}

/// Drop every incoming edge of `successor` and link the deduplicated new set.
/// Runs inside the caller's transaction.
pub(crate) fn replace_predecessors_internal(
    conn: &Connection,
    successor: TodoId,
    predecessor_ids: &[TodoId],
) -> Result<Vec<TodoId>> {
    require_todo_exists(conn, successor)?;

    conn.execute(
        "DELETE FROM todo_dependencies WHERE successor_id = ?1",
        params![successor],
    )?;

    let mut seen = HashSet::new();
    let mut linked = Vec::new();
    for &predecessor in predecessor_ids {
        if !seen.insert(predecessor) {
            continue;
        }
        add_dependency_internal(conn, successor, predecessor)?;
        linked.push(predecessor);
    }

    Ok(linked)
}

pub(crate) fn predecessor_ids_internal(conn: &Connection, todo_id: TodoId) -> Result<Vec<TodoId>> {
    let mut stmt = conn.prepare_cached(
        "SELECT predecessor_id FROM todo_dependencies WHERE successor_id = ?1 ORDER BY predecessor_id",
    )?;
    let ids = stmt
        .query_map(params![todo_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

/// Predecessors of `todo_id` whose status is anything other than completed.
pub(crate) fn incomplete_predecessors_internal(
    conn: &Connection,
    todo_id: TodoId,
) -> Result<Vec<TodoId>> {
    let mut stmt = conn.prepare_cached(
        "SELECT d.predecessor_id
         FROM todo_dependencies d
         JOIN todos p ON p.id = d.predecessor_id
         WHERE d.successor_id = ?1 AND p.status != 'completed'
         ORDER BY d.predecessor_id",
    )?;
    let ids = stmt
        .query_map(params![todo_id], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(ids)
}

pub(crate) fn all_dependencies_internal(conn: &Connection) -> Result<Vec<Dependency>> {
    let mut stmt = conn.prepare(
        "SELECT successor_id, predecessor_id FROM todo_dependencies
         ORDER BY successor_id, predecessor_id",
    )?;
    let deps = stmt
        .query_map([], |row| {
            Ok(Dependency {
                successor_id: row.get(0)?,
                predecessor_id: row.get(1)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(deps)
}

impl Database {
    /// Record that `successor_id` cannot complete until `predecessor_id` does.
    /// Adding an edge that already exists is a no-op.
    pub fn add_dependency(&self, successor_id: TodoId, predecessor_id: TodoId) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;
            add_dependency_internal(&tx, successor_id, predecessor_id)?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Remove one edge. Returns whether it existed.
    pub fn remove_dependency(&self, successor_id: TodoId, predecessor_id: TodoId) -> Result<bool> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM todo_dependencies WHERE successor_id = ?1 AND predecessor_id = ?2",
                params![successor_id, predecessor_id],
            )?;
            Ok(removed > 0)
        })
    }

    /// Replace the full predecessor set of a todo atomically.
    pub fn replace_predecessors(
        &self,
        successor_id: TodoId,
        predecessor_ids: &[TodoId],
    ) -> Result<Vec<TodoId>> {
        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;
            let linked = replace_predecessors_internal(&tx, successor_id, predecessor_ids)?;
            tx.commit()?;
            Ok(linked)
        })
    }

    /// Whether the todo has any predecessor that is not completed.
    pub fn is_blocked(&self, todo_id: TodoId) -> Result<bool> {
        self.with_conn(|conn| {
            require_todo_exists(conn, todo_id)?;
            Ok(!incomplete_predecessors_internal(conn, todo_id)?.is_empty())
        })
    }

    pub fn predecessor_ids(&self, todo_id: TodoId) -> Result<Vec<TodoId>> {
        self.with_conn(|conn| predecessor_ids_internal(conn, todo_id))
    }

    pub fn successor_ids(&self, todo_id: TodoId) -> Result<Vec<TodoId>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT successor_id FROM todo_dependencies WHERE predecessor_id = ?1 ORDER BY successor_id",
            )?;
            let ids = stmt
                .query_map(params![todo_id], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(ids)
        })
    }

    pub fn incomplete_predecessors(&self, todo_id: TodoId) -> Result<Vec<TodoId>> {
        self.with_conn(|conn| incomplete_predecessors_internal(conn, todo_id))
    }

    /// Every edge, ordered by successor then predecessor.
    pub fn get_all_dependencies(&self) -> Result<Vec<Dependency>> {
        self.with_conn(all_dependencies_internal)
    }
}
