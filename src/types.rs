//! Core types for the tracker.

use crate::error::TrackerError;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type TodoId = i64;
pub type TagId = i64;

/// Lifecycle state of a todo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    #[default]
    Todo,
    InProgress,
    Completed,
    Cancelled,
}

impl TodoStatus {
    pub const ALL: [TodoStatus; 4] = [
        TodoStatus::Todo,
        TodoStatus::InProgress,
        TodoStatus::Completed,
        TodoStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TodoStatus::Todo => "todo",
            TodoStatus::InProgress => "in_progress",
            TodoStatus::Completed => "completed",
            TodoStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TodoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TodoStatus {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "todo" => Ok(TodoStatus::Todo),
            "in_progress" => Ok(TodoStatus::InProgress),
            "completed" => Ok(TodoStatus::Completed),
            "cancelled" => Ok(TodoStatus::Cancelled),
            other => Err(TrackerError::invalid(
                "status",
                format!(
                    "'{}' is not one of todo, in_progress, completed, cancelled",
                    other
                ),
            )),
        }
    }
}

impl ToSql for TodoStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TodoStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        s.parse().map_err(|e: TrackerError| FromSqlError::Other(Box::new(e)))
    }
}

/// A node in the tag taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub parent_id: Option<TagId>,
}

/// A tag with its children, for tree views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagTreeNode {
    pub id: TagId,
    pub name: String,
    pub parent_id: Option<TagId>,
    pub children: Vec<TagTreeNode>,
}

/// One tag, the subtree under it, and how many todos live in that subtree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagSummary {
    pub tag: Tag,
    pub tag_tree: TagTreeNode,
    pub todo_count: i64,
}

/// The whole tag forest and the number of tagged todos.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagForestSummary {
    pub tag_tree: Vec<TagTreeNode>,
    pub todo_count: i64,
}

/// Partial tag update. `parent_id: Some(None)` moves the tag to the root.
#[derive(Debug, Clone, Default)]
pub struct TagChanges {
    pub name: Option<String>,
    pub parent_id: Option<Option<TagId>>,
}

/// A todo as read from the store. `is_blocked` is derived on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Todo {
    pub id: TodoId,
    pub description: String,
    pub tag_id: Option<TagId>,
    pub status: TodoStatus,
    pub assignee: Option<String>,
    pub assignee_lease: Option<String>,
    pub work_notes: Option<String>,
    pub priority: Option<u8>,
    pub due_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub is_blocked: bool,
}

/// Row-level input for inserting a todo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTodo {
    pub description: String,
    #[serde(default)]
    pub status: TodoStatus,
    pub tag_id: Option<TagId>,
    pub assignee: Option<String>,
    pub assignee_lease: Option<String>,
    pub work_notes: Option<String>,
    pub priority: Option<u8>,
    pub due_date: Option<String>,
}

/// Input for `add_todo`: a todo with its tag path and predecessors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTodo {
    pub description: String,
    pub status: Option<TodoStatus>,
    pub tag_path: Option<String>,
    #[serde(default)]
    pub predecessor_ids: Vec<TodoId>,
    pub work_notes: Option<String>,
    pub priority: Option<u8>,
    pub due_date: Option<String>,
}

/// Partial todo update. Outer `None` leaves a field alone; `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct TodoChanges {
    pub description: Option<String>,
    pub status: Option<TodoStatus>,
    pub tag_id: Option<Option<TagId>>,
    pub assignee: Option<Option<String>>,
    pub assignee_lease: Option<Option<String>>,
    pub work_notes: Option<Option<String>>,
    pub priority: Option<Option<u8>>,
    pub due_date: Option<Option<String>>,
}

impl TodoChanges {
    pub fn is_empty(&self) -> bool {
        self.description.is_none()
            && self.status.is_none()
            && self.tag_id.is_none()
            && self.assignee.is_none()
            && self.assignee_lease.is_none()
            && self.work_notes.is_none()
            && self.priority.is_none()
            && self.due_date.is_none()
    }
}

/// Tag reference accepted by `update_todo_with_relations`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagRef {
    Id(TagId),
    Path(String),
    Clear,
}

/// A directed edge: `successor_id` cannot complete until `predecessor_id` does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    pub successor_id: TodoId,
    pub predecessor_id: TodoId,
}

/// Request to lease the next actionable todo (or one specific todo).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRequest {
    pub assignee: String,
    pub lease_minutes: i64,
    pub id: Option<TodoId>,
    pub tag_id: Option<TagId>,
}

impl ClaimRequest {
    pub fn new(assignee: impl Into<String>, lease_minutes: i64) -> Self {
        Self {
            assignee: assignee.into(),
            lease_minutes,
            id: None,
            tag_id: None,
        }
    }

    pub fn with_id(mut self, id: TodoId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_tag(mut self, tag_id: TagId) -> Self {
        self.tag_id = Some(tag_id);
        self
    }
}

/// A todo in the export tree; successors hang below it as children.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTodoNode {
    pub id: TodoId,
    pub description: String,
    pub status: TodoStatus,
    pub tag_id: Option<TagId>,
    pub assignee: Option<String>,
    pub work_notes: Option<String>,
    pub priority: Option<u8>,
    pub due_date: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub is_blocked: bool,
    pub predecessor_ids: Vec<TodoId>,
    pub children: Vec<ExportTodoNode>,
}

/// Full snapshot handed to export formatters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportTree {
    pub tag_tree: Vec<TagTreeNode>,
    pub todo_tree: Vec<ExportTodoNode>,
}

/// Everything the dashboard renders: tag forest, flat todos and raw edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    pub tag_tree: Vec<TagTreeNode>,
    pub todos: Vec<Todo>,
    pub dependencies: Vec<Dependency>,
}
