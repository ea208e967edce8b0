//! Structured error types for tracker operations.

use serde::Serialize;
use thiserror::Error;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    InvalidFieldValue,

    // Not found errors
    TodoNotFound,
    TagNotFound,
    TagPathNotFound,

    // Conflict errors
    SelfDependency,
    DependencyCycle,
    TagCycle,
    PredecessorNotComplete,
    DuplicateTag,
    NotClaimable,

    // Storage errors
    LegacySchema,
    NotInitialized,
    DatabaseError,
    MigrationError,
    InternalError,
}

/// Coarse grouping of errors: whose fault it is and how a caller should react.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input. Surface verbatim to the user.
    Validation,
    /// A referenced id or path does not exist.
    NotFound,
    /// The request would break a structural invariant.
    Conflict,
    /// The store itself failed or is in an unusable state.
    Storage,
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Todo {0} not found")]
    TodoNotFound(i64),

    #[error("Tag {0} not found")]
    TagNotFound(i64),

    #[error("Tag path not found: {0}")]
    TagPathNotFound(String),

    #[error("Todo {0} cannot depend on itself")]
    SelfDependency(i64),

    #[error("Adding dependency {predecessor} -> {successor} would create a cycle")]
    DependencyCycle { successor: i64, predecessor: i64 },

    #[error("Moving tag {tag} under tag {parent} would create a cycle")]
    TagCycle { tag: i64, parent: i64 },

    #[error("Todo {id} cannot be completed; blocked by: {}", format_ids(.blockers))]
    PredecessorNotComplete { id: i64, blockers: Vec<i64> },

    #[error("Tag '{name}' already exists under {}", describe_parent(.parent))]
    DuplicateTag { name: String, parent: Option<i64> },

    #[error("Todo {0} is not claimable")]
    NotClaimable(i64),

    #[error("{}", legacy_schema_message(.path))]
    LegacySchema { path: String },

    #[error("Database is not initialized. Run 'sb init'.")]
    NotInitialized,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] refinery::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl TrackerError {
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::InvalidFieldValue,
            Self::TodoNotFound(_) => ErrorCode::TodoNotFound,
            Self::TagNotFound(_) => ErrorCode::TagNotFound,
            Self::TagPathNotFound(_) => ErrorCode::TagPathNotFound,
            Self::SelfDependency(_) => ErrorCode::SelfDependency,
            Self::DependencyCycle { .. } => ErrorCode::DependencyCycle,
            Self::TagCycle { .. } => ErrorCode::TagCycle,
            Self::PredecessorNotComplete { .. } => ErrorCode::PredecessorNotComplete,
            Self::DuplicateTag { .. } => ErrorCode::DuplicateTag,
            Self::NotClaimable(_) => ErrorCode::NotClaimable,
            Self::LegacySchema { .. } => ErrorCode::LegacySchema,
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Migration(_) => ErrorCode::MigrationError,
            Self::Internal(_) => ErrorCode::InternalError,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self.code() {
            ErrorCode::InvalidFieldValue => ErrorKind::Validation,
            ErrorCode::TodoNotFound | ErrorCode::TagNotFound | ErrorCode::TagPathNotFound => {
                ErrorKind::NotFound
            }
            ErrorCode::SelfDependency
            | ErrorCode::DependencyCycle
            | ErrorCode::TagCycle
            | ErrorCode::PredecessorNotComplete
            | ErrorCode::DuplicateTag
            | ErrorCode::NotClaimable => ErrorKind::Conflict,
            ErrorCode::LegacySchema
            | ErrorCode::NotInitialized
            | ErrorCode::DatabaseError
            | ErrorCode::MigrationError
            | ErrorCode::InternalError => ErrorKind::Storage,
        }
    }
}

/// Result type for tracker operations.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Extended SQLite result code of a failed statement, if it is one.
pub(crate) fn sqlite_extended_code(err: &rusqlite::Error) -> Option<i32> {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => Some(e.extended_code),
        _ => None,
    }
}

pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        sqlite_extended_code(err),
        Some(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE) | Some(rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
    )
}

/// True when a trigger aborted the statement with the given message.
pub(crate) fn is_trigger_abort(err: &rusqlite::Error, message: &str) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(e, Some(msg)) => {
            e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_TRIGGER && msg.contains(message)
        }
        _ => false,
    }
}

fn format_ids(ids: &[i64]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn describe_parent(parent: &Option<i64>) -> String {
    match parent {
        Some(id) => format!("tag {}", id),
        None => "the root".to_string(),
    }
}

fn legacy_schema_message(path: &str) -> String {
    [
        "Detected a legacy/partially-managed SQLite database that conflicts with the migration history.".to_string(),
        format!("Database path: {}", path),
        "Reason: migration history does not match the existing tables, so early CREATE TABLE statements were re-run.".to_string(),
        String::new(),
        "Recommended recovery:".to_string(),
        format!("1) mv \"{}\" \"{}.legacy-$(date +%Y%m%d%H%M%S)\"", path, path),
        "2) Run 'sb init' to apply all migrations to a fresh DB".to_string(),
        String::new(),
        "If you must keep existing data, migrate it manually into the new schema first.".to_string(),
    ]
    .join("\n")
}
