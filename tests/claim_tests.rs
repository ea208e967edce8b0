//! Integration tests for lease-based claiming.

use chrono::NaiveDateTime;
use sitback::db::Database;
use sitback::error::{ErrorCode, ErrorKind};
use sitback::types::{AddTodo, ClaimRequest, NewTodo, Todo, TodoChanges, TodoStatus};
use sitback::validate::TIMESTAMP_FORMAT;

const PAST: &str = "2000-01-01 00:00:00";
const FUTURE: &str = "2999-01-01 00:00:00";

fn setup_db() -> Database {
    Database::open_in_memory().expect("Failed to create in-memory database")
}

fn todo_with(db: &Database, description: &str, due: Option<&str>, priority: Option<u8>) -> Todo {
    db.create_todo(NewTodo {
        description: description.to_string(),
        due_date: due.map(str::to_string),
        priority,
        ..Default::default()
    })
    .expect("Failed to create todo")
}

fn assign(db: &Database, id: i64, assignee: &str, lease: Option<&str>) {
    db.update_todo(
        id,
        TodoChanges {
            status: Some(TodoStatus::InProgress),
            assignee: Some(Some(assignee.to_string())),
            assignee_lease: Some(lease.map(str::to_string)),
            ..Default::default()
        },
    )
    .expect("Failed to assign todo");
}

fn claim(db: &Database, assignee: &str) -> Option<Todo> {
    db.claim_todo(ClaimRequest::new(assignee, 15))
        .expect("Failed to claim")
}

mod ordering_tests {
    use super::*;

    #[test]
    fn earliest_due_date_wins_over_priority() {
        let db = setup_db();
        let x = todo_with(&db, "x", Some("2030-02-01"), Some(5));
        let y = todo_with(&db, "y", None, Some(1));
        let z = todo_with(&db, "z", Some("2030-01-01"), Some(1));

        assert_eq!(claim(&db, "w").unwrap().id, z.id);
        assert_eq!(claim(&db, "w").unwrap().id, x.id);
        assert_eq!(claim(&db, "w").unwrap().id, y.id);
        assert!(claim(&db, "w").is_none());
    }

    #[test]
    fn priority_then_id_break_ties() {
        let db = setup_db();
        let low = todo_with(&db, "low", Some("2030-01-01"), Some(2));
        let none = todo_with(&db, "none", Some("2030-01-01"), None);
        let high_a = todo_with(&db, "high a", Some("2030-01-01"), Some(4));
        let high_b = todo_with(&db, "high b", Some("2030-01-01"), Some(4));

        let order: Vec<i64> = std::iter::from_fn(|| claim(&db, "w").map(|t| t.id)).collect();
        assert_eq!(order, vec![high_a.id, high_b.id, low.id, none.id]);
    }
}

mod eligibility_tests {
    use super::*;

    #[test]
    fn claim_sets_lease_and_status() {
        let db = setup_db();
        let t = todo_with(&db, "t", None, None);

        let claimed = db
            .claim_todo(ClaimRequest::new("  worker-1  ", 30))
            .unwrap()
            .unwrap();

        assert_eq!(claimed.id, t.id);
        assert_eq!(claimed.status, TodoStatus::InProgress);
        assert_eq!(claimed.assignee.as_deref(), Some("worker-1"));
        let lease = claimed.assignee_lease.expect("lease set");
        assert!(lease > claimed.updated_at);
    }

    #[test]
    fn blocked_and_finished_todos_are_skipped() {
        let db = setup_db();
        let a = todo_with(&db, "a", Some("2030-01-01"), None);
        let blocked = todo_with(&db, "blocked", Some("2020-01-01"), None);
        db.add_dependency(blocked.id, a.id).unwrap();
        let done = todo_with(&db, "done", Some("2020-01-01"), None);
        db.update_todo(
            done.id,
            TodoChanges {
                status: Some(TodoStatus::Completed),
                ..Default::default()
            },
        )
        .unwrap();
        let cancelled = todo_with(&db, "cancelled", Some("2020-01-01"), None);
        db.update_todo(
            cancelled.id,
            TodoChanges {
                status: Some(TodoStatus::Cancelled),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(claim(&db, "w").unwrap().id, a.id);
        assert!(claim(&db, "w").is_none());
    }

    #[test]
    fn active_lease_blocks_everyone() {
        let db = setup_db();
        let t = todo_with(&db, "t", None, None);
        assign(&db, t.id, "owner", Some(FUTURE));

        assert!(claim(&db, "other").is_none());
        assert!(claim(&db, "owner").is_none());
    }

    #[test]
    fn expired_lease_can_be_taken_over() {
        let db = setup_db();
        let t = todo_with(&db, "t", None, None);
        assign(&db, t.id, "slowpoke", Some(PAST));

        let claimed = claim(&db, "rescuer").unwrap();
        assert_eq!(claimed.id, t.id);
        assert_eq!(claimed.assignee.as_deref(), Some("rescuer"));
        assert!(claimed.assignee_lease.unwrap().as_str() > PAST);
    }

    #[test]
    fn assignee_without_lease_is_held() {
        let db = setup_db();
        let t = todo_with(&db, "t", None, None);
        assign(&db, t.id, "owner", None);

        assert!(claim(&db, "other").is_none());
    }

    #[test]
    fn specific_id() {
        let db = setup_db();
        let first = todo_with(&db, "first", Some("2030-01-01"), None);
        let second = todo_with(&db, "second", None, None);

        let claimed = db
            .claim_todo(ClaimRequest::new("w", 5).with_id(second.id))
            .unwrap()
            .unwrap();
        assert_eq!(claimed.id, second.id);

        // Already leased.
        assert!(db
            .claim_todo(ClaimRequest::new("w", 5).with_id(second.id))
            .unwrap()
            .is_none());
        assert!(db
            .claim_todo(ClaimRequest::new("w", 5).with_id(999))
            .unwrap()
            .is_none());

        assert_eq!(
            db.get_todo(first.id).unwrap().unwrap().status,
            TodoStatus::Todo
        );
    }

    #[test]
    fn tag_scope_includes_descendants() {
        let db = setup_db();
        let work = db.ensure_tag_path("work").unwrap();
        let outside = db
            .add_todo(AddTodo {
                description: "outside".to_string(),
                tag_path: Some("home".to_string()),
                due_date: Some("2020-01-01".to_string()),
                ..Default::default()
            })
            .unwrap();
        let inside = db
            .add_todo(AddTodo {
                description: "inside".to_string(),
                tag_path: Some("work/api/v2".to_string()),
                ..Default::default()
            })
            .unwrap();
        todo_with(&db, "untagged", Some("2020-01-01"), None);

        let claimed = db
            .claim_todo(ClaimRequest::new("w", 5).with_tag(work.id))
            .unwrap()
            .unwrap();
        assert_eq!(claimed.id, inside.id);
        assert!(db
            .claim_todo(ClaimRequest::new("w", 5).with_tag(work.id))
            .unwrap()
            .is_none());
        assert_eq!(
            db.get_todo(outside.id).unwrap().unwrap().status,
            TodoStatus::Todo
        );
    }

    #[test]
    fn unknown_tag_scope_is_not_found() {
        let db = setup_db();
        todo_with(&db, "t", None, None);

        let err = db
            .claim_todo(ClaimRequest::new("w", 5).with_tag(404))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::TagNotFound);
    }

    #[test]
    fn invalid_requests_are_rejected() {
        let db = setup_db();
        let t = todo_with(&db, "t", None, None);

        let err = db.claim_todo(ClaimRequest::new("   ", 5)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = db.claim_todo(ClaimRequest::new("w", 0)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert_eq!(db.get_todo(t.id).unwrap().unwrap().status, TodoStatus::Todo);
    }

    #[test]
    fn lease_past_year_9999_is_rejected() {
        let db = setup_db();
        let t = todo_with(&db, "t", None, None);

        let err = db
            .claim_todo(ClaimRequest::new("alice", 5_000_000_000))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let untouched = db.get_todo(t.id).unwrap().unwrap();
        assert_eq!(untouched.status, TodoStatus::Todo);
        assert_eq!(untouched.assignee_lease, None);

        // A normal lease still holds off other claimers.
        assert_eq!(claim(&db, "alice").unwrap().id, t.id);
        assert!(claim(&db, "bob").is_none());
    }

    #[test]
    fn lease_runs_from_the_claim_time() {
        let db = setup_db();
        todo_with(&db, "t", None, None);

        let claimed = db.claim_todo(ClaimRequest::new("w", 90)).unwrap().unwrap();
        let lease = claimed.assignee_lease.as_deref().unwrap();
        let lease = NaiveDateTime::parse_from_str(lease, TIMESTAMP_FORMAT).unwrap();
        let stamped = NaiveDateTime::parse_from_str(&claimed.updated_at, TIMESTAMP_FORMAT).unwrap();
        assert_eq!((lease - stamped).num_minutes(), 90);
        assert_eq!((lease - stamped).num_seconds(), 90 * 60);
    }
}

mod workflow_tests {
    use super::*;

    #[test]
    fn claim_complete_claim_follows_the_chain() {
        let db = setup_db();
        let a = todo_with(&db, "a", None, None);
        db.update_todo(
            a.id,
            TodoChanges {
                status: Some(TodoStatus::Completed),
                ..Default::default()
            },
        )
        .unwrap();
        let b = db
            .add_todo(AddTodo {
                description: "b".to_string(),
                predecessor_ids: vec![a.id],
                ..Default::default()
            })
            .unwrap();
        let c = db
            .add_todo(AddTodo {
                description: "c".to_string(),
                predecessor_ids: vec![b.id],
                due_date: Some("2030-01-01".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert!(c.is_blocked);

        assert_eq!(claim(&db, "w").unwrap().id, b.id);
        assert!(claim(&db, "w").is_none());

        db.update_todo(
            b.id,
            TodoChanges {
                status: Some(TodoStatus::Completed),
                ..Default::default()
            },
        )
        .unwrap();

        assert_eq!(claim(&db, "w").unwrap().id, c.id);
    }
}
