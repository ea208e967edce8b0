//! Input validation applied before every mutation.
//!
//! The schema repeats most of these rules as CHECK constraints, so a row that
//! slips past a caller still cannot land in the store.

use crate::error::{Result, TrackerError};
use crate::types::{NewTodo, TodoChanges};
use chrono::{NaiveDate, NaiveDateTime};
use regex_lite::Regex;
use std::sync::LazyLock;

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Byte widths of the two formats with a four-digit year. chrono renders
/// years past 9999 as `+YYYYY`, which would sort before every real date.
pub const DATE_WIDTH: usize = 10;
pub const TIMESTAMP_WIDTH: usize = 19;

pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 5;

static TAG_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+$").expect("static tag pattern"));

/// Lowercase and check a single tag name.
pub fn normalize_tag_name(name: &str) -> Result<String> {
    let normalized = name.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(TrackerError::invalid("tag name", "must not be empty"));
    }
    if !TAG_SEGMENT.is_match(&normalized) {
        return Err(TrackerError::invalid(
            "tag name",
            format!("'{}' must be lowercase alphanumeric", name.trim()),
        ));
    }
    Ok(normalized)
}

/// Split a slash-separated tag path into normalized segments.
pub fn normalize_tag_path(path: &str) -> Result<Vec<String>> {
    let segments: Vec<&str> = path.split('/').map(str::trim).collect();

    if segments.iter().any(|s| s.is_empty()) {
        return Err(TrackerError::invalid(
            "tag path",
            format!("'{}' must not contain empty segments", path),
        ));
    }

    let normalized: Vec<String> = segments.iter().map(|s| s.to_lowercase()).collect();
    if normalized.iter().any(|s| !TAG_SEGMENT.is_match(s)) {
        return Err(TrackerError::invalid(
            "tag path",
            format!("segments of '{}' must be lowercase alphanumeric", path),
        ));
    }

    Ok(normalized)
}

pub fn validate_priority(priority: u8) -> Result<u8> {
    if (MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
        Ok(priority)
    } else {
        Err(TrackerError::invalid(
            "priority",
            format!(
                "{} is outside {}-{}",
                priority, MIN_PRIORITY, MAX_PRIORITY
            ),
        ))
    }
}

/// Parse a priority supplied as a wider integer (CLI / web input).
pub fn parse_priority(value: i64) -> Result<u8> {
    u8::try_from(value)
        .map_err(|_| {
            TrackerError::invalid(
                "priority",
                format!("{} is outside {}-{}", value, MIN_PRIORITY, MAX_PRIORITY),
            )
        })
        .and_then(validate_priority)
}

/// Due dates are fixed-width `YYYY-MM-DD` so they compare lexicographically.
pub fn validate_due_date(value: &str) -> Result<String> {
    let trimmed = value.trim();
    let parsed = NaiveDate::parse_from_str(trimmed, DATE_FORMAT).map_err(|_| {
        TrackerError::invalid("due date", format!("'{}' is not YYYY-MM-DD", value))
    })?;
    let canonical = parsed.format(DATE_FORMAT).to_string();
    if canonical.len() != DATE_WIDTH {
        return Err(TrackerError::invalid(
            "due date",
            format!("'{}' has a year outside 0000-9999", value),
        ));
    }
    if canonical != trimmed {
        return Err(TrackerError::invalid(
            "due date",
            format!("'{}' is not zero-padded YYYY-MM-DD", value),
        ));
    }
    Ok(canonical)
}

/// Lease timestamps are fixed-width `YYYY-MM-DD HH:MM:SS` (UTC).
pub fn validate_timestamp(value: &str) -> Result<String> {
    let trimmed = value.trim();
    let parsed = NaiveDateTime::parse_from_str(trimmed, TIMESTAMP_FORMAT).map_err(|_| {
        TrackerError::invalid(
            "lease",
            format!("'{}' is not YYYY-MM-DD HH:MM:SS", value),
        )
    })?;
    let canonical = parsed.format(TIMESTAMP_FORMAT).to_string();
    if canonical.len() != TIMESTAMP_WIDTH {
        return Err(TrackerError::invalid(
            "lease",
            format!("'{}' has a year outside 0000-9999", value),
        ));
    }
    if canonical != trimmed {
        return Err(TrackerError::invalid(
            "lease",
            format!("'{}' is not zero-padded YYYY-MM-DD HH:MM:SS", value),
        ));
    }
    Ok(canonical)
}

pub fn normalize_assignee(assignee: &str) -> Result<String> {
    let trimmed = assignee.trim();
    if trimmed.is_empty() {
        return Err(TrackerError::invalid("assignee", "provide non-empty text"));
    }
    Ok(trimmed.to_string())
}

pub fn normalize_description(description: &str) -> Result<String> {
    let trimmed = description.trim();
    if trimmed.is_empty() {
        return Err(TrackerError::invalid("description", "provide non-empty text"));
    }
    Ok(trimmed.to_string())
}

pub fn validate_lease_minutes(minutes: i64) -> Result<i64> {
    if minutes <= 0 {
        return Err(TrackerError::invalid(
            "lease minutes",
            format!("{} must be a positive integer", minutes),
        ));
    }
    Ok(minutes)
}

/// Trim free text; blank becomes `None`.
pub fn normalize_optional_text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn normalize_optional_assignee(value: Option<String>) -> Option<String> {
    normalize_optional_text(value)
}

fn normalize_optional_lease(value: Option<String>) -> Result<Option<String>> {
    normalize_optional_text(value)
        .map(|v| validate_timestamp(&v))
        .transpose()
}

/// Normalize every field of a todo about to be inserted.
pub fn prepare_new_todo(todo: NewTodo) -> Result<NewTodo> {
    Ok(NewTodo {
        description: normalize_description(&todo.description)?,
        status: todo.status,
        tag_id: todo.tag_id,
        assignee: normalize_optional_assignee(todo.assignee),
        assignee_lease: normalize_optional_lease(todo.assignee_lease)?,
        work_notes: normalize_optional_text(todo.work_notes),
        priority: todo.priority.map(validate_priority).transpose()?,
        due_date: todo.due_date.as_deref().map(validate_due_date).transpose()?,
    })
}

/// Normalize a partial update. Fields left as `None` stay untouched.
pub fn prepare_changes(changes: TodoChanges) -> Result<TodoChanges> {
    Ok(TodoChanges {
        description: changes
            .description
            .as_deref()
            .map(normalize_description)
            .transpose()?,
        status: changes.status,
        tag_id: changes.tag_id,
        assignee: changes.assignee.map(normalize_optional_assignee),
        assignee_lease: changes
            .assignee_lease
            .map(normalize_optional_lease)
            .transpose()?,
        work_notes: changes.work_notes.map(normalize_optional_text),
        priority: changes
            .priority
            .map(|p| p.map(validate_priority).transpose())
            .transpose()?,
        due_date: changes
            .due_date
            .map(|d| d.as_deref().map(validate_due_date).transpose())
            .transpose()?,
    })
}
