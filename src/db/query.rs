//! Query/filter engine for todo listings and counts.

use super::claim::CANDIDATE_ORDER;
use super::deps::BLOCKED_PREDICATE;
use super::tags::subtree_ids_internal;
use super::todos::{get_todos_by_ids_internal, parse_todo_row, TODO_SELECT};
use super::{now_timestamp, placeholders, Database};
use crate::error::{Result, TrackerError};
use crate::types::{TagId, Todo, TodoId, TodoStatus};
use crate::validate::{validate_due_date, validate_priority};
use rusqlite::Connection;
use serde_json::{Map, Value};
use std::str::FromStr;

/// Column an explicit sort applies to. `id` is always the final tie-break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Id,
    Priority,
    DueDate,
    CreatedAt,
    UpdatedAt,
}

impl FromStr for SortField {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "id" => Ok(SortField::Id),
            "priority" => Ok(SortField::Priority),
            "due_date" => Ok(SortField::DueDate),
            "created_at" => Ok(SortField::CreatedAt),
            "updated_at" => Ok(SortField::UpdatedAt),
            other => Err(TrackerError::invalid(
                "sort field",
                format!(
                    "'{}' is not one of id, priority, due_date, created_at, updated_at",
                    other
                ),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(TrackerError::invalid(
                "sort order",
                format!("'{}' is not one of asc, desc", other),
            )),
        }
    }
}

/// A todo attribute that can be selected for projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TodoField {
    Id,
    Description,
    TagId,
    Status,
    Assignee,
    AssigneeLease,
    WorkNotes,
    Priority,
    DueDate,
    CreatedAt,
    UpdatedAt,
    IsBlocked,
}

impl TodoField {
    /// Key used in serialized todos.
    pub fn key(&self) -> &'static str {
        match self {
            TodoField::Id => "id",
            TodoField::Description => "description",
            TodoField::TagId => "tagId",
            TodoField::Status => "status",
            TodoField::Assignee => "assignee",
            TodoField::AssigneeLease => "assigneeLease",
            TodoField::WorkNotes => "workNotes",
            TodoField::Priority => "priority",
            TodoField::DueDate => "dueDate",
            TodoField::CreatedAt => "createdAt",
            TodoField::UpdatedAt => "updatedAt",
            TodoField::IsBlocked => "isBlocked",
        }
    }
}

impl FromStr for TodoField {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        let field = match s.trim() {
            "id" => TodoField::Id,
            "description" => TodoField::Description,
            "tagId" | "tag_id" => TodoField::TagId,
            "status" => TodoField::Status,
            "assignee" => TodoField::Assignee,
            "assigneeLease" | "assignee_lease" => TodoField::AssigneeLease,
            "workNotes" | "work_notes" => TodoField::WorkNotes,
            "priority" => TodoField::Priority,
            "dueDate" | "due_date" => TodoField::DueDate,
            "createdAt" | "created_at" => TodoField::CreatedAt,
            "updatedAt" | "updated_at" => TodoField::UpdatedAt,
            "isBlocked" | "is_blocked" => TodoField::IsBlocked,
            other => {
                return Err(TrackerError::invalid(
                    "field",
                    format!("'{}' is not a todo field", other),
                ))
            }
        };
        Ok(field)
    }
}

/// Filters for listing todos. Every `None` leaves that dimension open.
///
/// When `ids` is non-empty it bypasses every other filter and the sort: the
/// result holds those todos in the requested order, deduplicated.
#[derive(Debug, Clone, Default)]
pub struct TodoQuery {
    pub ids: Vec<TodoId>,
    pub blocked: Option<bool>,
    pub statuses: Vec<TodoStatus>,
    pub min_priority: Option<u8>,
    pub due_before: Option<String>,
    pub due_after: Option<String>,
    /// Scope to this tag and every tag below it.
    pub tag_id: Option<TagId>,
    pub assignee: Option<String>,
    pub has_assignee: Option<bool>,
    pub lease_expired: Option<bool>,
    pub sort: Option<(SortField, SortOrder)>,
    pub limit: Option<usize>,
}

impl TodoQuery {
    fn validated(&self) -> Result<()> {
        if let Some(p) = self.min_priority {
            validate_priority(p)?;
        }
        if let Some(ref d) = self.due_before {
            validate_due_date(d)?;
        }
        if let Some(ref d) = self.due_after {
            validate_due_date(d)?;
        }
        Ok(())
    }
}

/// WHERE fragments and their bound values, in placeholder order.
struct Conditions {
    clauses: Vec<String>,
    params: Vec<Box<dyn rusqlite::ToSql>>,
}

impl Conditions {
    fn where_clause(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    fn param_refs(&self) -> Vec<&dyn rusqlite::ToSql> {
        self.params.iter().map(|b| b.as_ref()).collect()
    }
}

fn build_conditions(conn: &Connection, query: &TodoQuery, now: &str) -> Result<Conditions> {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

    if !query.statuses.is_empty() {
        clauses.push(format!("t.status IN ({})", placeholders(query.statuses.len())));
        for status in &query.statuses {
            params.push(Box::new(*status));
        }
    }

    match query.blocked {
        Some(true) => clauses.push(BLOCKED_PREDICATE.to_string()),
        Some(false) => clauses.push(format!("NOT {}", BLOCKED_PREDICATE)),
        None => {}
    }

    if let Some(p) = query.min_priority {
        clauses.push("(t.priority IS NOT NULL AND t.priority >= ?)".to_string());
        params.push(Box::new(p));
    }

    if let Some(ref before) = query.due_before {
        clauses.push("(t.due_date IS NOT NULL AND t.due_date <= ?)".to_string());
        params.push(Box::new(before.trim().to_string()));
    }

    if let Some(ref after) = query.due_after {
        clauses.push("(t.due_date IS NOT NULL AND t.due_date >= ?)".to_string());
        params.push(Box::new(after.trim().to_string()));
    }

    if let Some(tag_id) = query.tag_id {
        let scope = subtree_ids_internal(conn, tag_id)?;
        clauses.push(format!("t.tag_id IN ({})", placeholders(scope.len())));
        for id in scope {
            params.push(Box::new(id));
        }
    }

    if let Some(ref assignee) = query.assignee {
        clauses.push("t.assignee = ?".to_string());
        params.push(Box::new(assignee.clone()));
    }

    match query.has_assignee {
        Some(true) => clauses.push("t.assignee IS NOT NULL".to_string()),
        Some(false) => clauses.push("t.assignee IS NULL".to_string()),
        None => {}
    }

    match query.lease_expired {
        Some(true) => {
            clauses.push("(t.assignee_lease IS NOT NULL AND t.assignee_lease <= ?)".to_string());
            params.push(Box::new(now.to_string()));
        }
        Some(false) => {
            clauses.push("(t.assignee_lease IS NULL OR t.assignee_lease > ?)".to_string());
            params.push(Box::new(now.to_string()));
        }
        None => {}
    }

    Ok(Conditions { clauses, params })
}

fn build_order_clause(sort: Option<(SortField, SortOrder)>) -> String {
    let Some((field, order)) = sort else {
        return CANDIDATE_ORDER.to_string();
    };

    let direction = match order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    };

    let column = match field {
        SortField::Id => return format!("t.id {}", direction),
        SortField::Priority => "COALESCE(t.priority, 0)",
        SortField::DueDate => "COALESCE(t.due_date, '9999-12-31')",
        SortField::CreatedAt => "t.created_at",
        SortField::UpdatedAt => "t.updated_at",
    };

    format!("{} {}, t.id ASC", column, direction)
}

/// Reduce each todo to the selected fields, in the order given.
pub fn project_todos(todos: &[Todo], fields: &[TodoField]) -> Result<Vec<Map<String, Value>>> {
    todos
        .iter()
        .map(|todo| {
            let Value::Object(full) = serde_json::to_value(todo).map_err(TrackerError::internal)?
            else {
                return Err(TrackerError::internal("todo did not serialize to an object"));
            };
            let mut projected = Map::new();
            for field in fields {
                let key = field.key();
                projected.insert(key.to_string(), full.get(key).cloned().unwrap_or(Value::Null));
            }
            Ok(projected)
        })
        .collect()
}

impl Database {
    /// List todos matching `query`.
    pub fn get_todos_for_get(&self, query: &TodoQuery) -> Result<Vec<Todo>> {
        query.validated()?;
        let now = now_timestamp();

        self.with_conn(|conn| {
            if !query.ids.is_empty() {
                return get_todos_by_ids_internal(conn, &query.ids);
            }

            let conditions = build_conditions(conn, query, &now)?;
            let mut sql = format!(
                "{}{} ORDER BY {}",
                *TODO_SELECT,
                conditions.where_clause(),
                build_order_clause(query.sort)
            );
            if let Some(limit) = query.limit {
                sql.push_str(&format!(" LIMIT {}", limit));
            }

            let params_refs = conditions.param_refs();
            let mut stmt = conn.prepare(&sql)?;
            let todos = stmt
                .query_map(params_refs.as_slice(), parse_todo_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(todos)
        })
    }

    /// Number of todos `get_todos_for_get` would return without a limit.
    pub fn count_todos_for_get(&self, query: &TodoQuery) -> Result<i64> {
        query.validated()?;
        let now = now_timestamp();

        self.with_conn(|conn| {
            if !query.ids.is_empty() {
                return Ok(get_todos_by_ids_internal(conn, &query.ids)?.len() as i64);
            }

            let conditions = build_conditions(conn, query, &now)?;
            let sql = format!("SELECT count(*) FROM todos t{}", conditions.where_clause());
            let params_refs = conditions.param_refs();
            let count = conn.query_row(&sql, params_refs.as_slice(), |row| row.get(0))?;
            Ok(count)
        })
    }

    /// Actionable todos: status `todo`, not blocked, in claim order.
    pub fn next_todos(&self, limit: usize) -> Result<Vec<Todo>> {
        self.get_todos_for_get(&TodoQuery {
            statuses: vec![TodoStatus::Todo],
            blocked: Some(false),
            limit: Some(limit),
            ..Default::default()
        })
    }
}
