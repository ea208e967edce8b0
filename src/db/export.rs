//! Snapshot of the tag forest and the dependency graph for export formatters.

use super::deps::all_dependencies_internal;
use super::tags::{build_tag_forest, load_tags};
use super::todos::all_todos_internal;
use super::{read_tx, Database};
use crate::error::Result;
use crate::types::{Dependency, ExportTodoNode, ExportTree, Tag, Todo, TodoId};
use std::collections::{HashMap, HashSet};

struct Graph<'a> {
    todos: HashMap<TodoId, &'a Todo>,
    predecessors: HashMap<TodoId, Vec<TodoId>>,
    successors: HashMap<TodoId, Vec<TodoId>>,
}

impl Graph<'_> {
    /// A todo with its successors nested below it. A todo reachable from
    /// several predecessors appears under each of them.
    fn node(&self, todo: &Todo, path: &mut HashSet<TodoId>) -> ExportTodoNode {
        path.insert(todo.id);

        let next: Vec<&Todo> = self
            .successors
            .get(&todo.id)
            .map(|ids| {
                ids.iter()
                    .filter(|id| !path.contains(id))
                    .filter_map(|id| self.todos.get(id).copied())
                    .collect()
            })
            .unwrap_or_default();
        let children = next
            .into_iter()
            .map(|child| self.node(child, path))
            .collect();

        path.remove(&todo.id);

        ExportTodoNode {
            id: todo.id,
            description: todo.description.clone(),
            status: todo.status,
            tag_id: todo.tag_id,
            assignee: todo.assignee.clone(),
            work_notes: todo.work_notes.clone(),
            priority: todo.priority,
            due_date: todo.due_date.clone(),
            created_at: todo.created_at.clone(),
            updated_at: todo.updated_at.clone(),
            is_blocked: todo.is_blocked,
            predecessor_ids: self.predecessors.get(&todo.id).cloned().unwrap_or_default(),
            children,
        }
    }
}

/// Every tag, todo and edge, read inside one transaction.
pub(crate) struct Snapshot {
    pub tags: Vec<Tag>,
    pub todos: Vec<Todo>,
    pub edges: Vec<Dependency>,
}

impl Database {
    pub(crate) fn snapshot(&self) -> Result<Snapshot> {
        self.with_conn_mut(|conn| {
            let tx = read_tx(conn)?;
            let snapshot = Snapshot {
                tags: load_tags(&tx, None)?,
                todos: all_todos_internal(&tx)?,
                edges: all_dependencies_internal(&tx)?,
            };
            tx.commit()?;
            Ok(snapshot)
        })
    }

    /// Tag forest plus a todo forest rooted at todos without predecessors.
    pub fn get_export_tree(&self) -> Result<ExportTree> {
        let Snapshot { tags, todos, edges } = self.snapshot()?;

        let mut graph = Graph {
            todos: todos.iter().map(|t| (t.id, t)).collect(),
            predecessors: HashMap::new(),
            successors: HashMap::new(),
        };

        for edge in edges {
            if !graph.todos.contains_key(&edge.successor_id)
                || !graph.todos.contains_key(&edge.predecessor_id)
            {
                continue;
            }
            graph
                .predecessors
                .entry(edge.successor_id)
                .or_default()
                .push(edge.predecessor_id);
            graph
                .successors
                .entry(edge.predecessor_id)
                .or_default()
                .push(edge.successor_id);
        }

        for ids in graph.predecessors.values_mut() {
            ids.sort_unstable();
        }
        for ids in graph.successors.values_mut() {
            ids.sort_unstable();
        }

        // `todos` is already ordered by id.
        let mut path = HashSet::new();
        let todo_tree = todos
            .iter()
            .filter(|t| !graph.predecessors.contains_key(&t.id))
            .map(|t| graph.node(t, &mut path))
            .collect();

        Ok(ExportTree {
            tag_tree: build_tag_forest(&tags),
            todo_tree,
        })
    }
}
