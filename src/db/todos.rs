//! Todo CRUD and the composite add/update operations used by callers.

use super::claim::CANDIDATE_ORDER;
use super::deps::{incomplete_predecessors_internal, replace_predecessors_internal, BLOCKED_PREDICATE};
use super::tags::{ensure_path_internal, require_tag, resolve_path_internal};
use super::{now_timestamp, write_tx, Database};
use crate::error::{is_trigger_abort, Result, TrackerError};
use crate::types::{AddTodo, NewTodo, TagRef, Todo, TodoChanges, TodoId, TodoStatus};
use crate::validate::{prepare_changes, prepare_new_todo};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::sync::LazyLock;

/// Column list shared by every todo read; `t` is the todos alias.
pub(crate) static TODO_SELECT: LazyLock<String> = LazyLock::new(|| {
    format!(
        "SELECT t.id, t.description, t.tag_id, t.status, t.assignee, t.assignee_lease,
                t.work_notes, t.priority, t.due_date, t.created_at, t.updated_at,
                CASE WHEN {} THEN 1 ELSE 0 END AS is_blocked
         FROM todos t",
        BLOCKED_PREDICATE
    )
});

pub(crate) fn parse_todo_row(row: &Row) -> rusqlite::Result<Todo> {
    Ok(Todo {
        id: row.get("id")?,
        description: row.get("description")?,
        tag_id: row.get("tag_id")?,
        status: row.get("status")?,
        assignee: row.get("assignee")?,
        assignee_lease: row.get("assignee_lease")?,
        work_notes: row.get("work_notes")?,
        priority: row.get("priority")?,
        due_date: row.get("due_date")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
        is_blocked: row.get("is_blocked")?,
    })
}

pub(crate) fn get_todo_internal(conn: &Connection, todo_id: TodoId) -> Result<Option<Todo>> {
    let sql = format!("{} WHERE t.id = ?1", *TODO_SELECT);
    let todo = conn
        .query_row(&sql, params![todo_id], parse_todo_row)
        .optional()?;
    Ok(todo)
}

pub(crate) fn require_todo(conn: &Connection, todo_id: TodoId) -> Result<Todo> {
    get_todo_internal(conn, todo_id)?.ok_or(TrackerError::TodoNotFound(todo_id))
}

pub(crate) fn require_todo_exists(conn: &Connection, todo_id: TodoId) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM todos WHERE id = ?1)",
        params![todo_id],
        |row| row.get(0),
    )?;
    if exists {
        Ok(())
    } else {
        Err(TrackerError::TodoNotFound(todo_id))
    }
}

/// Insert an already-validated todo.
fn insert_todo_internal(conn: &Connection, todo: &NewTodo, now: &str) -> Result<TodoId> {
    if let Some(tag_id) = todo.tag_id {
        require_tag(conn, tag_id)?;
    }

    conn.execute(
        "INSERT INTO todos (description, tag_id, status, assignee, assignee_lease, work_notes,
                            priority, due_date, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)",
        params![
            todo.description,
            todo.tag_id,
            todo.status,
            todo.assignee,
            todo.assignee_lease,
            todo.work_notes,
            todo.priority,
            todo.due_date,
            now,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Apply already-validated changes. The completion guard runs here before the
/// trigger gets a chance to, so the error can name the blockers.
fn update_todo_internal(
    conn: &Connection,
    todo_id: TodoId,
    changes: &TodoChanges,
    now: &str,
) -> Result<()> {
    let existing = require_todo(conn, todo_id)?;

    if changes.is_empty() {
        return Ok(());
    }

    if let Some(Some(tag_id)) = changes.tag_id {
        require_tag(conn, tag_id)?;
    }

    if changes.status == Some(TodoStatus::Completed) && existing.status != TodoStatus::Completed {
        let blockers = incomplete_predecessors_internal(conn, todo_id)?;
        if !blockers.is_empty() {
            return Err(TrackerError::PredecessorNotComplete {
                id: todo_id,
                blockers,
            });
        }
    }

    let mut sets: Vec<&str> = Vec::new();
    let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if let Some(ref description) = changes.description {
        sets.push("description = ?");
        params_vec.push(Box::new(description.clone()));
    }
    if let Some(status) = changes.status {
        sets.push("status = ?");
        params_vec.push(Box::new(status));
    }
    if let Some(tag_id) = changes.tag_id {
        sets.push("tag_id = ?");
        params_vec.push(Box::new(tag_id));
    }
    if let Some(ref assignee) = changes.assignee {
        sets.push("assignee = ?");
        params_vec.push(Box::new(assignee.clone()));
    }
    if let Some(ref lease) = changes.assignee_lease {
        sets.push("assignee_lease = ?");
        params_vec.push(Box::new(lease.clone()));
    }
    if let Some(ref notes) = changes.work_notes {
        sets.push("work_notes = ?");
        params_vec.push(Box::new(notes.clone()));
    }
    if let Some(priority) = changes.priority {
        sets.push("priority = ?");
        params_vec.push(Box::new(priority));
    }
    if let Some(ref due_date) = changes.due_date {
        sets.push("due_date = ?");
        params_vec.push(Box::new(due_date.clone()));
    }

    sets.push("updated_at = ?");
    params_vec.push(Box::new(now.to_string()));
    params_vec.push(Box::new(todo_id));

    let sql = format!("UPDATE todos SET {} WHERE id = ?", sets.join(", "));
    let params_refs: Vec<&dyn rusqlite::ToSql> = params_vec.iter().map(|b| b.as_ref()).collect();

    match conn.execute(&sql, params_refs.as_slice()) {
        Ok(_) => Ok(()),
        Err(e) if is_trigger_abort(&e, "predecessor not complete") => {
            Err(TrackerError::PredecessorNotComplete {
                id: todo_id,
                blockers: incomplete_predecessors_internal(conn, todo_id)?,
            })
        }
        Err(e) => Err(e.into()),
    }
}

/// Insert a validated todo and link its predecessors. A todo inserted as
/// completed must not end up with an incomplete predecessor.
pub(crate) fn insert_with_predecessors(
    conn: &Connection,
    todo: &NewTodo,
    predecessor_ids: &[TodoId],
    now: &str,
) -> Result<Todo> {
    let id = insert_todo_internal(conn, todo, now)?;
    replace_predecessors_internal(conn, id, predecessor_ids)?;

    if todo.status == TodoStatus::Completed {
        let blockers = incomplete_predecessors_internal(conn, id)?;
        if !blockers.is_empty() {
            return Err(TrackerError::PredecessorNotComplete { id, blockers });
        }
    }

    require_todo(conn, id)
}

fn resolve_tag_ref(conn: &Connection, tag: TagRef) -> Result<Option<i64>> {
    match tag {
        TagRef::Id(id) => Ok(Some(require_tag(conn, id)?.id)),
        TagRef::Path(path) => resolve_path_internal(conn, &path)?
            .map(|t| Some(t.id))
            .ok_or(TrackerError::TagPathNotFound(path)),
        TagRef::Clear => Ok(None),
    }
}

impl Database {
    /// Insert one todo from row-level fields.
    pub fn create_todo(&self, todo: NewTodo) -> Result<Todo> {
        let todo = prepare_new_todo(todo)?;
        let now = now_timestamp();

        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;
            let id = insert_todo_internal(&tx, &todo, &now)?;
            let created = require_todo(&tx, id)?;
            tx.commit()?;
            Ok(created)
        })
    }

    pub fn get_todo(&self, todo_id: TodoId) -> Result<Option<Todo>> {
        self.with_conn(|conn| get_todo_internal(conn, todo_id))
    }

    /// Every todo, by id.
    pub fn get_todos(&self) -> Result<Vec<Todo>> {
        self.with_conn(all_todos_internal)
    }

    /// Todos for the given ids in the order requested. Duplicates collapse to
    /// the first occurrence; unknown ids are skipped.
    pub fn get_todos_by_ids(&self, ids: &[TodoId]) -> Result<Vec<Todo>> {
        self.with_conn(|conn| get_todos_by_ids_internal(conn, ids))
    }

    /// Apply a partial update.
    pub fn update_todo(&self, todo_id: TodoId, changes: TodoChanges) -> Result<Todo> {
        let changes = prepare_changes(changes)?;
        let now = now_timestamp();

        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;
            update_todo_internal(&tx, todo_id, &changes, &now)?;
            let updated = require_todo(&tx, todo_id)?;
            tx.commit()?;
            Ok(updated)
        })
    }

    /// Delete a todo and every edge touching it. Returns the deleted record.
    pub fn delete_todo(&self, todo_id: TodoId) -> Result<Todo> {
        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;
            let existing = require_todo(&tx, todo_id)?;
            tx.execute("DELETE FROM todos WHERE id = ?1", params![todo_id])?;
            tx.commit()?;
            Ok(existing)
        })
    }

    /// Create a todo, its tag path and its predecessor edges in one transaction.
    pub fn add_todo(&self, input: AddTodo) -> Result<Todo> {
        let prepared = prepare_new_todo(NewTodo {
            description: input.description,
            status: input.status.unwrap_or_default(),
            tag_id: None,
            assignee: None,
            assignee_lease: None,
            work_notes: input.work_notes,
            priority: input.priority,
            due_date: input.due_date,
        })?;
        let now = now_timestamp();

        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;

            let tag_id = match input.tag_path.as_deref() {
                Some(path) => Some(ensure_path_internal(&tx, path)?.id),
                None => None,
            };
            let todo = NewTodo { tag_id, ..prepared };
            let created = insert_with_predecessors(&tx, &todo, &input.predecessor_ids, &now)?;
            tx.commit()?;
            Ok(created)
        })
    }

    /// Update fields, tag and predecessor set together. The predecessor set is
    /// replaced first so the completion guard sees the final edges.
    pub fn update_todo_with_relations(
        &self,
        todo_id: TodoId,
        changes: TodoChanges,
        tag: Option<TagRef>,
        predecessor_ids: Option<&[TodoId]>,
    ) -> Result<Todo> {
        let mut changes = prepare_changes(changes)?;
        let now = now_timestamp();

        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;
            require_todo_exists(&tx, todo_id)?;

            if let Some(tag) = tag {
                changes.tag_id = Some(resolve_tag_ref(&tx, tag)?);
            }
            if let Some(ids) = predecessor_ids {
                replace_predecessors_internal(&tx, todo_id, ids)?;
            }

            update_todo_internal(&tx, todo_id, &changes, &now)?;
            let updated = require_todo(&tx, todo_id)?;
            tx.commit()?;
            Ok(updated)
        })
    }

    /// Unblocked todos still in status `todo`, in claim order.
    pub fn ready_todos(&self) -> Result<Vec<Todo>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{} WHERE t.status = 'todo' AND NOT {} ORDER BY {}",
                *TODO_SELECT, BLOCKED_PREDICATE, CANDIDATE_ORDER
            );
            let mut stmt = conn.prepare(&sql)?;
            let todos = stmt
                .query_map([], parse_todo_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(todos)
        })
    }
}

pub(crate) fn all_todos_internal(conn: &Connection) -> Result<Vec<Todo>> {
    let sql = format!("{} ORDER BY t.id", *TODO_SELECT);
    let mut stmt = conn.prepare(&sql)?;
    let todos = stmt
        .query_map([], parse_todo_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(todos)
}

pub(crate) fn get_todos_by_ids_internal(conn: &Connection, ids: &[TodoId]) -> Result<Vec<Todo>> {
    let mut seen = HashSet::new();
    let mut todos = Vec::new();
    for &id in ids {
        if !seen.insert(id) {
            continue;
        }
        if let Some(todo) = get_todo_internal(conn, id)? {
            todos.push(todo);
        }
    }
    Ok(todos)
}
