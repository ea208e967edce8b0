//! Concurrent claimers on one database file.
//!
//! Each worker gets its own handle (and so its own SQLite connection) on the
//! same file, which is how separate `sb` processes meet in practice.

use sitback::db::{now_timestamp, Database};
use sitback::types::{AddTodo, ClaimRequest, NewTodo, TodoId};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

fn seed(path: &Path, count: usize) -> Vec<TodoId> {
    let db = Database::open(path).expect("Failed to open database");
    (0..count)
        .map(|i| {
            db.create_todo(NewTodo {
                description: format!("job {}", i),
                ..Default::default()
            })
            .expect("Failed to create todo")
            .id
        })
        .collect()
}

fn handles(path: &Path, workers: usize) -> Vec<Database> {
    (0..workers)
        .map(|_| Database::connect(path, 10_000).expect("Failed to connect"))
        .collect()
}

#[test]
fn one_todo_many_claimers_single_winner() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("race.db");
    let ids = seed(&path, 1);

    let workers = 8;
    let barrier = Arc::new(Barrier::new(workers));
    let threads: Vec<_> = handles(&path, workers)
        .into_iter()
        .enumerate()
        .map(|(i, db)| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                db.claim_todo(ClaimRequest::new(format!("worker-{}", i), 15))
                    .expect("claim should not error")
            })
        })
        .collect();

    let winners: Vec<_> = threads
        .into_iter()
        .filter_map(|t| t.join().unwrap())
        .collect();

    assert_eq!(winners.len(), 1);
    assert_eq!(winners[0].id, ids[0]);
}

#[test]
fn pool_is_drained_without_double_claims() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pool.db");
    let ids = seed(&path, 12);

    let workers = 4;
    let barrier = Arc::new(Barrier::new(workers));
    let threads: Vec<_> = handles(&path, workers)
        .into_iter()
        .enumerate()
        .map(|(i, db)| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut claimed = Vec::new();
                while let Some(todo) = db
                    .claim_todo(ClaimRequest::new(format!("worker-{}", i), 15))
                    .expect("claim should not error")
                {
                    claimed.push(todo.id);
                }
                claimed
            })
        })
        .collect();

    let mut all = Vec::new();
    for t in threads {
        all.extend(t.join().unwrap());
    }

    let unique: HashSet<_> = all.iter().copied().collect();
    assert_eq!(all.len(), ids.len());
    assert_eq!(unique, ids.into_iter().collect::<HashSet<_>>());
}

#[test]
fn claim_stamps_time_after_waiting_for_the_lock() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stamp.db");
    let ids = seed(&path, 1);

    let mut dbs = handles(&path, 2);
    let claimer = dbs.pop().unwrap();
    let holder = dbs.pop().unwrap();
    let barrier = Arc::new(Barrier::new(2));

    let held = {
        let barrier = Arc::clone(&barrier);
        thread::spawn(move || {
            holder
                .with_conn_mut(|conn| {
                    conn.execute_batch("BEGIN IMMEDIATE")?;
                    barrier.wait();
                    thread::sleep(Duration::from_millis(1500));
                    let released = now_timestamp();
                    conn.execute_batch("COMMIT")?;
                    Ok(released)
                })
                .expect("holder transaction failed")
        })
    };

    barrier.wait();
    let claimed = claimer
        .claim_todo(ClaimRequest::new("late", 15))
        .expect("claim should not error")
        .expect("todo should be claimable");
    let released = held.join().unwrap();

    assert_eq!(claimed.id, ids[0]);
    assert!(
        claimed.updated_at >= released,
        "claim stamped {} before the lock was released at {}",
        claimed.updated_at,
        released
    );
}

#[test]
fn dashboard_never_sees_edges_without_their_todos() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.db");
    let root = seed(&path, 1)[0];

    let mut dbs = handles(&path, 2);
    let reader = dbs.pop().unwrap();
    let writer = dbs.pop().unwrap();
    let done = Arc::new(AtomicBool::new(false));

    let writing = {
        let done = Arc::clone(&done);
        thread::spawn(move || {
            for i in 0..200 {
                writer
                    .add_todo(AddTodo {
                        description: format!("follow-up {}", i),
                        predecessor_ids: vec![root],
                        ..Default::default()
                    })
                    .expect("add should not error");
            }
            done.store(true, Ordering::SeqCst);
        })
    };

    while !done.load(Ordering::SeqCst) {
        let data = reader.dashboard_data().expect("dashboard read failed");
        let known: HashSet<TodoId> = data.todos.iter().map(|t| t.id).collect();
        for edge in &data.dependencies {
            assert!(known.contains(&edge.successor_id), "edge to missing todo {}", edge.successor_id);
        }

        let tree = reader.get_export_tree().expect("export read failed");
        assert_eq!(tree.todo_tree.len(), 1);
    }
    writing.join().unwrap();
}
