//! Storage layer: one SQLite file holding tags, todos and their dependency edges.

pub mod claim;
pub mod dashboard;
pub mod deps;
pub mod export;
pub mod query;
pub mod tags;
pub mod todos;

use crate::error::{Result, TrackerError};
use crate::validate::{TIMESTAMP_FORMAT, TIMESTAMP_WIDTH};
use chrono::{DateTime, TimeDelta, Utc};
use regex_lite::Regex;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, LazyLock, Mutex};
use std::time::Duration;
use tracing::debug;

mod embedded {
    use refinery::embed_migrations;
    embed_migrations!("migrations");
}

pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

const MIGRATION_HISTORY_TABLE: &str = "refinery_schema_history";

static TABLE_EXISTS_CONFLICT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)table\s+`?\w+`?\s+already exists").expect("static conflict pattern")
});

/// Database handle wrapping a SQLite connection.
///
/// Each handle owns one connection. Open several handles on the same file to
/// get independent writers; SQLite serializes them via `busy_timeout`.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    location: Arc<str>,
}

impl Database {
    /// Open or create the database at the given path and apply pending migrations.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT_MS)
    }

    pub fn open_with_timeout<P: AsRef<Path>>(path: P, busy_timeout_ms: u64) -> Result<Self> {
        let db = Self::connect(path, busy_timeout_ms)?;
        db.run_migrations()?;
        Ok(db)
    }

    /// Open the database file without touching its schema.
    pub fn connect<P: AsRef<Path>>(path: P, busy_timeout_ms: u64) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;

        // WAL lets readers proceed while one writer holds the lock.
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA foreign_keys=ON;
             PRAGMA synchronous=NORMAL;",
        )?;
        conn.busy_timeout(Duration::from_millis(busy_timeout_ms))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location: Arc::from(path.display().to_string()),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            location: Arc::from(":memory:"),
        };

        db.run_migrations()?;

        Ok(db)
    }

    /// Where this handle's database lives, for messages.
    pub fn location(&self) -> &str {
        &self.location
    }

    /// Run database migrations. Returns how many were newly applied.
    ///
    /// A database whose tables predate the migration history is reported as
    /// [`TrackerError::LegacySchema`] rather than repaired.
    pub fn run_migrations(&self) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let report = embedded::migrations::runner()
                .run(conn)
                .map_err(|err| {
                    if is_table_exists_conflict(&err) {
                        TrackerError::LegacySchema {
                            path: self.location.to_string(),
                        }
                    } else {
                        TrackerError::Migration(err)
                    }
                })?;
            let applied = report.applied_migrations().len();
            debug!(applied, location = %self.location, "Migrations applied");
            Ok(applied)
        })
    }

    /// Fail with [`TrackerError::NotInitialized`] unless every embedded
    /// migration has been applied.
    pub fn assert_initialized(&self) -> Result<()> {
        match self.initialization_warning()? {
            None => Ok(()),
            Some(_) => Err(TrackerError::NotInitialized),
        }
    }

    /// Human-readable warning when the schema is missing or behind.
    pub fn initialization_warning(&self) -> Result<Option<String>> {
        let expected = expected_migration_count();
        let applied = self.with_conn(applied_migration_count)?;

        if applied >= expected {
            return Ok(None);
        }

        Ok(Some(format!(
            "database is not initialized (applied {}/{} migrations). run 'sb init'.",
            applied, expected
        )))
    }

    /// Execute a function with exclusive access to the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|_| TrackerError::internal("database connection lock poisoned"))?;
        f(&conn)
    }

    /// Execute a function with mutable access to the connection (for transactions).
    pub fn with_conn_mut<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| TrackerError::internal("database connection lock poisoned"))?;
        f(&mut conn)
    }
}

fn expected_migration_count() -> usize {
    embedded::migrations::runner().get_migrations().len()
}

/// Count of applied migrations; a missing history table counts as zero.
fn applied_migration_count(conn: &Connection) -> Result<usize> {
    let sql = format!("SELECT count(*) FROM {}", MIGRATION_HISTORY_TABLE);
    match conn.query_row(&sql, [], |row| row.get::<_, i64>(0)) {
        Ok(count) => Ok(count.max(0) as usize),
        Err(rusqlite::Error::SqliteFailure(_, Some(msg))) if msg.contains("no such table") => Ok(0),
        Err(e) => Err(e.into()),
    }
}

fn is_table_exists_conflict(err: &refinery::Error) -> bool {
    let mut current: Option<&dyn std::error::Error> = Some(err);
    while let Some(e) = current {
        if TABLE_EXISTS_CONFLICT.is_match(&e.to_string()) {
            return true;
        }
        current = e.source();
    }
    false
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Current UTC time in the store's fixed-width timestamp format.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Lease deadline `minutes` from now, in the store's timestamp format.
pub fn lease_deadline(minutes: i64) -> Result<String> {
    lease_deadline_from(Utc::now(), minutes)
}

/// Lease deadline `minutes` after `start`. Deadlines past year 9999 are
/// rejected; they would not compare correctly against stored timestamps.
pub fn lease_deadline_from(start: DateTime<Utc>, minutes: i64) -> Result<String> {
    TimeDelta::try_minutes(minutes)
        .and_then(|delta| start.checked_add_signed(delta))
        .map(format_timestamp)
        .filter(|deadline| deadline.len() == TIMESTAMP_WIDTH)
        .ok_or_else(|| TrackerError::invalid("lease minutes", format!("{} is too large", minutes)))
}

/// Begin a write transaction that takes SQLite's write lock up front, so
/// checks made inside it still hold at commit.
pub(crate) fn write_tx(conn: &mut Connection) -> Result<Transaction<'_>> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

/// Begin a read transaction so several SELECTs see the same committed state.
pub(crate) fn read_tx(conn: &mut Connection) -> Result<Transaction<'_>> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Deferred)?)
}

/// `?, ?, ?` for an IN list of `n` values.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_in_memory_database_is_initialized() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.initialization_warning().unwrap().is_none());
        db.assert_initialized().unwrap();
    }

    #[test]
    fn rerunning_migrations_applies_nothing() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.run_migrations().unwrap(), 0);
    }

    #[test]
    fn lease_deadline_is_in_the_future() {
        let now = now_timestamp();
        let deadline = lease_deadline(15).unwrap();
        assert_eq!(deadline.len(), now.len());
        assert!(deadline > now);
        assert!(lease_deadline(i64::MAX).is_err());
    }

    #[test]
    fn lease_deadline_stays_within_four_digit_years() {
        // Accepted by chrono, but lands in year 11000+.
        let err = lease_deadline(5_000_000_000).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);

        let start = DateTime::parse_from_rfc3339("2030-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            lease_deadline_from(start, 90).unwrap(),
            "2030-01-01 01:30:00"
        );
    }

    #[test]
    fn placeholder_list() {
        assert_eq!(placeholders(3), "?, ?, ?");
        assert_eq!(placeholders(1), "?");
    }
}
