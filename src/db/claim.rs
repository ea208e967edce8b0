//! Claim scheduler: lease the best actionable todo in one conditional write.
//!
//! A todo is claimable when it is `todo` or `in_progress`, not blocked, and
//! either unassigned or holding a lease that has already expired. A todo with
//! an assignee and no lease at all is held indefinitely.
//!
//! Candidates are ordered by due date (missing dates last), then priority
//! (missing counts as 0, higher first), then id. The chosen row is picked by a
//! subquery inside the UPDATE itself, and the statement runs in an immediate
//! transaction, so two claimers can never both win the same row.

use super::deps::BLOCKED_PREDICATE;
use super::tags::{require_tag, subtree_ids_internal};
use super::todos::require_todo;
use super::{format_timestamp, lease_deadline_from, placeholders, write_tx, Database};
use crate::error::Result;
use crate::types::{ClaimRequest, Todo, TodoId};
use crate::validate::{normalize_assignee, validate_lease_minutes};
use chrono::Utc;
use rusqlite::OptionalExtension;

/// Total order over candidates; `t` is the todos alias.
pub(crate) const CANDIDATE_ORDER: &str =
    "COALESCE(t.due_date, '9999-12-31') ASC, COALESCE(t.priority, 0) DESC, t.id ASC";

impl Database {
    /// Lease the next eligible todo, or the specific one in `request.id`.
    ///
    /// Returns `Ok(None)` when nothing is eligible. Callers that asked for a
    /// specific id decide whether that is an error.
    pub fn claim_todo(&self, request: ClaimRequest) -> Result<Option<Todo>> {
        let assignee = normalize_assignee(&request.assignee)?;
        let minutes = validate_lease_minutes(request.lease_minutes)?;

        self.with_conn_mut(|conn| {
            let tx = write_tx(conn)?;

            // Read the clock only once the write lock is held.
            let started = Utc::now();
            let now = format_timestamp(started);
            let deadline = lease_deadline_from(started, minutes)?;

            let scope = match request.tag_id {
                Some(tag_id) => {
                    require_tag(&tx, tag_id)?;
                    Some(subtree_ids_internal(&tx, tag_id)?)
                }
                None => None,
            };

            let mut conditions = vec![
                "t.status IN ('todo', 'in_progress')".to_string(),
                format!("NOT {}", BLOCKED_PREDICATE),
                "(t.assignee IS NULL OR t.assignee_lease <= ?)".to_string(),
            ];
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![
                Box::new(assignee),
                Box::new(deadline),
                Box::new(now.clone()),
                Box::new(now),
            ];

            if let Some(id) = request.id {
                conditions.push("t.id = ?".to_string());
                params_vec.push(Box::new(id));
            }
            if let Some(ref ids) = scope {
                conditions.push(format!("t.tag_id IN ({})", placeholders(ids.len())));
                for id in ids {
                    params_vec.push(Box::new(*id));
                }
            }

            let sql = format!(
                "UPDATE todos
                 SET status = 'in_progress', assignee = ?, assignee_lease = ?, updated_at = ?
                 WHERE id = (
                     SELECT t.id FROM todos t
                     WHERE {}
                     ORDER BY {}
                     LIMIT 1
                 )
                 RETURNING id",
                conditions.join(" AND "),
                CANDIDATE_ORDER
            );

            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(|b| b.as_ref()).collect();
            let claimed: Option<TodoId> = tx
                .query_row(&sql, params_refs.as_slice(), |row| row.get(0))
                .optional()?;

            let todo = match claimed {
                Some(id) => Some(require_todo(&tx, id)?),
                None => None,
            };

            tx.commit()?;
            Ok(todo)
        })
    }
}

