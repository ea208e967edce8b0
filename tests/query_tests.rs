//! Tests for the todo query engine: filters, ordering, counts and projection.

use sitback::db::query::{project_todos, SortField, SortOrder, TodoField, TodoQuery};
use sitback::db::Database;
use sitback::error::ErrorKind;
use sitback::types::{AddTodo, NewTodo, Todo, TodoChanges, TodoStatus};

fn setup_db() -> Database {
    Database::open_in_memory().expect("Failed to create in-memory database")
}

fn ids(todos: &[Todo]) -> Vec<i64> {
    todos.iter().map(|t| t.id).collect()
}

fn add(db: &Database, description: &str, due: Option<&str>, priority: Option<u8>) -> Todo {
    db.create_todo(NewTodo {
        description: description.to_string(),
        due_date: due.map(str::to_string),
        priority,
        ..Default::default()
    })
    .expect("Failed to create todo")
}

fn set_status(db: &Database, id: i64, status: TodoStatus) {
    db.update_todo(
        id,
        TodoChanges {
            status: Some(status),
            ..Default::default()
        },
    )
    .expect("Failed to update status");
}

mod filter_tests {
    use super::*;

    #[test]
    fn default_listing_includes_every_status_in_claim_order() {
        let db = setup_db();
        let late = add(&db, "late", Some("2030-03-01"), None);
        let soon = add(&db, "soon", Some("2030-01-01"), None);
        let done = add(&db, "done", Some("2029-01-01"), None);
        set_status(&db, done.id, TodoStatus::Completed);
        let dropped = add(&db, "dropped", None, Some(5));
        set_status(&db, dropped.id, TodoStatus::Cancelled);

        let all = db.get_todos_for_get(&TodoQuery::default()).unwrap();
        assert_eq!(ids(&all), vec![done.id, soon.id, late.id, dropped.id]);
    }

    #[test]
    fn status_filter_accepts_several_values() {
        let db = setup_db();
        let a = add(&db, "a", None, None);
        let b = add(&db, "b", None, None);
        let c = add(&db, "c", None, None);
        set_status(&db, b.id, TodoStatus::InProgress);
        set_status(&db, c.id, TodoStatus::Cancelled);

        let query = TodoQuery {
            statuses: vec![TodoStatus::Todo, TodoStatus::Cancelled],
            sort: Some((SortField::Id, SortOrder::Asc)),
            ..Default::default()
        };
        assert_eq!(ids(&db.get_todos_for_get(&query).unwrap()), vec![a.id, c.id]);
    }

    #[test]
    fn blocked_filter_both_ways() {
        let db = setup_db();
        let a = add(&db, "a", None, None);
        let b = add(&db, "b", None, None);
        db.add_dependency(b.id, a.id).unwrap();

        let blocked = db
            .get_todos_for_get(&TodoQuery {
                blocked: Some(true),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(ids(&blocked), vec![b.id]);
        assert!(blocked[0].is_blocked);

        let free = db
            .get_todos_for_get(&TodoQuery {
                blocked: Some(false),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(ids(&free), vec![a.id]);
    }

    #[test]
    fn min_priority_excludes_unprioritized() {
        let db = setup_db();
        add(&db, "none", None, None);
        add(&db, "low", None, Some(2));
        let mid = add(&db, "mid", None, Some(3));
        let high = add(&db, "high", None, Some(5));

        let query = TodoQuery {
            min_priority: Some(3),
            ..Default::default()
        };
        assert_eq!(ids(&db.get_todos_for_get(&query).unwrap()), vec![high.id, mid.id]);
    }

    #[test]
    fn due_range_is_inclusive_and_skips_undated() {
        let db = setup_db();
        add(&db, "undated", None, None);
        add(&db, "early", Some("2030-01-01"), None);
        let start = add(&db, "start", Some("2030-02-01"), None);
        let end = add(&db, "end", Some("2030-02-28"), None);
        add(&db, "late", Some("2030-03-01"), None);

        let query = TodoQuery {
            due_after: Some("2030-02-01".to_string()),
            due_before: Some("2030-02-28".to_string()),
            ..Default::default()
        };
        assert_eq!(ids(&db.get_todos_for_get(&query).unwrap()), vec![start.id, end.id]);
    }

    #[test]
    fn tag_filter_scopes_to_subtree() {
        let db = setup_db();
        let work = db.ensure_tag_path("work").unwrap();
        let top = db
            .add_todo(AddTodo {
                description: "top".to_string(),
                tag_path: Some("work".to_string()),
                ..Default::default()
            })
            .unwrap();
        let deep = db
            .add_todo(AddTodo {
                description: "deep".to_string(),
                tag_path: Some("work/db/migrations".to_string()),
                ..Default::default()
            })
            .unwrap();
        db.add_todo(AddTodo {
            description: "elsewhere".to_string(),
            tag_path: Some("home".to_string()),
            ..Default::default()
        })
        .unwrap();
        add(&db, "untagged", None, None);

        let query = TodoQuery {
            tag_id: Some(work.id),
            sort: Some((SortField::Id, SortOrder::Asc)),
            ..Default::default()
        };
        assert_eq!(ids(&db.get_todos_for_get(&query).unwrap()), vec![top.id, deep.id]);
        assert_eq!(db.count_todos_for_get(&query).unwrap(), 2);
    }

    #[test]
    fn unknown_tag_matches_nothing() {
        let db = setup_db();
        add(&db, "t", None, None);

        let query = TodoQuery {
            tag_id: Some(77),
            ..Default::default()
        };
        assert!(db.get_todos_for_get(&query).unwrap().is_empty());
        assert_eq!(db.count_todos_for_get(&query).unwrap(), 0);
    }

    #[test]
    fn assignee_and_lease_filters() {
        let db = setup_db();
        let free = add(&db, "free", None, None);
        let expired = add(&db, "expired", None, None);
        let active = add(&db, "active", None, None);
        let held = add(&db, "held", None, None);

        for (id, who, lease) in [
            (expired.id, "ann", Some("2000-01-01 00:00:00")),
            (active.id, "bob", Some("2999-01-01 00:00:00")),
            (held.id, "ann", None),
        ] {
            db.update_todo(
                id,
                TodoChanges {
                    assignee: Some(Some(who.to_string())),
                    assignee_lease: Some(lease.map(str::to_string)),
                    ..Default::default()
                },
            )
            .unwrap();
        }

        let by_id = |query: TodoQuery| {
            let query = TodoQuery {
                sort: Some((SortField::Id, SortOrder::Asc)),
                ..query
            };
            ids(&db.get_todos_for_get(&query).unwrap())
        };

        assert_eq!(
            by_id(TodoQuery {
                assignee: Some("ann".to_string()),
                ..Default::default()
            }),
            vec![expired.id, held.id]
        );
        assert_eq!(
            by_id(TodoQuery {
                has_assignee: Some(false),
                ..Default::default()
            }),
            vec![free.id]
        );
        assert_eq!(
            by_id(TodoQuery {
                has_assignee: Some(true),
                ..Default::default()
            }),
            vec![expired.id, active.id, held.id]
        );
        assert_eq!(
            by_id(TodoQuery {
                lease_expired: Some(true),
                ..Default::default()
            }),
            vec![expired.id]
        );
        assert_eq!(
            by_id(TodoQuery {
                lease_expired: Some(false),
                ..Default::default()
            }),
            vec![free.id, active.id, held.id]
        );
    }

    #[test]
    fn invalid_filter_values_are_rejected() {
        let db = setup_db();

        let err = db
            .get_todos_for_get(&TodoQuery {
                min_priority: Some(9),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = db
            .count_todos_for_get(&TodoQuery {
                due_before: Some("next week".to_string()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}

mod ordering_tests {
    use super::*;

    #[test]
    fn explicit_sort_with_id_tie_break() {
        let db = setup_db();
        let a = add(&db, "a", None, Some(3));
        let b = add(&db, "b", None, Some(5));
        let c = add(&db, "c", None, Some(3));
        let d = add(&db, "d", None, None);

        let desc = db
            .get_todos_for_get(&TodoQuery {
                sort: Some((SortField::Priority, SortOrder::Desc)),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(ids(&desc), vec![b.id, a.id, c.id, d.id]);

        let asc = db
            .get_todos_for_get(&TodoQuery {
                sort: Some((SortField::Priority, SortOrder::Asc)),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(ids(&asc), vec![d.id, a.id, c.id, b.id]);

        let by_id = db
            .get_todos_for_get(&TodoQuery {
                sort: Some((SortField::Id, SortOrder::Desc)),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(ids(&by_id), vec![d.id, c.id, b.id, a.id]);
    }

    #[test]
    fn limit_truncates_but_count_does_not() {
        let db = setup_db();
        for i in 0..5 {
            add(&db, &format!("t{}", i), None, None);
        }

        let query = TodoQuery {
            limit: Some(2),
            ..Default::default()
        };
        assert_eq!(db.get_todos_for_get(&query).unwrap().len(), 2);
        assert_eq!(db.count_todos_for_get(&query).unwrap(), 5);
    }

    #[test]
    fn ids_bypass_filters_and_keep_order() {
        let db = setup_db();
        let a = add(&db, "a", None, None);
        let b = add(&db, "b", None, None);
        set_status(&db, b.id, TodoStatus::Cancelled);

        let query = TodoQuery {
            ids: vec![b.id, 404, a.id, b.id],
            statuses: vec![TodoStatus::Todo],
            limit: Some(1),
            ..Default::default()
        };
        assert_eq!(ids(&db.get_todos_for_get(&query).unwrap()), vec![b.id, a.id]);
        assert_eq!(db.count_todos_for_get(&query).unwrap(), 2);
    }

    #[test]
    fn next_todos_lists_only_actionable_work() {
        let db = setup_db();
        let a = add(&db, "a", Some("2030-05-01"), None);
        let b = add(&db, "b", None, None);
        db.add_dependency(b.id, a.id).unwrap();
        let started = add(&db, "started", Some("2020-01-01"), None);
        set_status(&db, started.id, TodoStatus::InProgress);
        let urgent = add(&db, "urgent", Some("2030-01-01"), Some(1));

        assert_eq!(ids(&db.next_todos(10).unwrap()), vec![urgent.id, a.id]);
        assert_eq!(ids(&db.next_todos(1).unwrap()), vec![urgent.id]);
    }
}

mod projection_tests {
    use super::*;

    #[test]
    fn projection_keeps_requested_fields_only() {
        let db = setup_db();
        let t = add(&db, "project me", Some("2030-01-01"), None);

        let fields: Vec<TodoField> = ["id", "due_date", "isBlocked", "priority"]
            .iter()
            .map(|f| f.parse().unwrap())
            .collect();
        let rows = project_todos(&[db.get_todo(t.id).unwrap().unwrap()], &fields).unwrap();

        let row = &rows[0];
        let keys: Vec<&str> = row.keys().map(String::as_str).collect();
        assert_eq!(keys.len(), 4);
        assert_eq!(row["id"], t.id);
        assert_eq!(row["dueDate"], "2030-01-01");
        assert_eq!(row["isBlocked"], false);
        assert!(row["priority"].is_null());
        assert!(!row.contains_key("description"));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let err = "colour".parse::<TodoField>().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
