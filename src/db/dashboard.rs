//! Bulk operations for the web dashboard, built on the same primitives.

use super::deps::replace_predecessors_internal;
use super::tags::build_tag_forest;
use super::todos::insert_with_predecessors;
use super::{now_timestamp, placeholders, write_tx, Database};
use crate::error::{ErrorCode, Result};
use crate::types::{DashboardData, NewTodo, Tag, TagChanges, TagId, Todo, TodoChanges, TodoId};
use crate::validate::prepare_new_todo;
use std::collections::HashSet;

fn dedup(ids: &[TodoId]) -> Vec<TodoId> {
    let mut seen = HashSet::new();
    ids.iter().copied().filter(|id| seen.insert(*id)).collect()
}

impl Database {
    /// Tag forest, all todos and all edges in one snapshot.
    pub fn dashboard_data(&self) -> Result<DashboardData> {
        let snapshot = self.snapshot()?;
        Ok(DashboardData {
            tag_tree: build_tag_forest(&snapshot.tags),
            todos: snapshot.todos,
            dependencies: snapshot.edges,
        })
    }

    /// Delete several todos at once. Returns the ids that actually existed.
    pub fn delete_dashboard_todos(&self, ids: &[TodoId]) -> Result<Vec<TodoId>> {
        let ids = dedup(ids);
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;
            let sql = format!(
                "DELETE FROM todos WHERE id IN ({}) RETURNING id",
                placeholders(ids.len())
            );
            let mut deleted = {
                let mut stmt = tx.prepare(&sql)?;
                stmt.query_map(rusqlite::params_from_iter(ids.iter()), |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<TodoId>>>()?
            };
            tx.commit()?;
            deleted.sort_unstable();
            Ok(deleted)
        })
    }

    /// Replace a todo's predecessors; the todo's own id is dropped from the list.
    pub fn set_dashboard_todo_predecessors(
        &self,
        id: TodoId,
        predecessor_ids: &[TodoId],
    ) -> Result<Vec<TodoId>> {
        let filtered: Vec<TodoId> = dedup(predecessor_ids)
            .into_iter()
            .filter(|p| *p != id)
            .collect();

        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;
            let linked = replace_predecessors_internal(&tx, id, &filtered)?;
            tx.commit()?;
            Ok(linked)
        })
    }

    /// Create a todo from raw dashboard fields and link its predecessors in
    /// one transaction.
    pub fn create_dashboard_todo(&self, todo: NewTodo, predecessor_ids: &[TodoId]) -> Result<Todo> {
        let todo = prepare_new_todo(todo)?;
        let now = now_timestamp();

        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;
            let created = insert_with_predecessors(&tx, &todo, predecessor_ids, &now)?;
            tx.commit()?;
            Ok(created)
        })
    }

    pub fn update_dashboard_todo(&self, id: TodoId, changes: TodoChanges) -> Result<Todo> {
        self.update_todo(id, changes)
    }

    pub fn rename_dashboard_tag(&self, id: TagId, name: &str) -> Result<Tag> {
        self.update_tag(
            id,
            TagChanges {
                name: Some(name.to_string()),
                parent_id: None,
            },
        )
    }

    /// Delete a tag subtree. Returns whether the tag existed.
    pub fn delete_dashboard_tag(&self, id: TagId) -> Result<bool> {
        match self.delete_tag(id) {
            Ok(_) => Ok(true),
            Err(e) if e.code() == ErrorCode::TagNotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn create_dashboard_tag(&self, name: &str, parent_id: Option<TagId>) -> Result<Tag> {
        self.create_tag(name, parent_id)
    }
}
