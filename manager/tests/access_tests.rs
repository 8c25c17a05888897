//! Read views, exclusive tasks and staged saves against a live store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use strata_manager::{Change, CommitError, StoreConfig, StoreManager};
use strata_schema::parent_child::{self, CHILD, PARENT};
use strata_schema::Value;
use strata_store::{RecordReader, StoreError};

fn open_manager(dir: &tempfile::TempDir) -> StoreManager {
    StoreManager::start(
        StoreConfig::in_dir(dir.path()),
        Arc::new(parent_child::registry()),
    )
}

fn insert_parent(manager: &StoreManager, title: &str, order: i64) -> u64 {
    let title = title.to_string();
    manager
        .exclusive_task(move |batch| {
            batch.insert(
                PARENT,
                [
                    ("title2", Value::from(title)),
                    ("orderIndex", Value::Integer(order)),
                ],
            )
        })
        .unwrap()
}

#[test]
fn view_sees_committed_task() {
    let dir = tempfile::tempdir().unwrap();
    let manager = open_manager(&dir);
    let before = manager.read_view();
    assert_eq!(before.count(PARENT).unwrap(), 0);

    let id = insert_parent(&manager, "visible", 0);

    let record = manager.read_view().get(PARENT, id).unwrap().unwrap();
    assert_eq!(record.text("title2"), Some("visible"));
    // Views are not frozen: each query starts a fresh read transaction.
    assert_eq!(before.count(PARENT).unwrap(), 1);
}

#[test]
fn concurrent_tasks_serialize() {
    const TASKS: usize = 16;

    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(open_manager(&dir));
    let counter = insert_parent(&manager, "counter", 0);
    let inside = Arc::new(AtomicUsize::new(0));

    let workers: Vec<_> = (0..TASKS)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let inside = Arc::clone(&inside);
            thread::spawn(move || {
                manager
                    .exclusive_task(|batch| {
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        let current = batch.require(PARENT, counter)?.integer("orderIndex");
                        let next = current.unwrap_or_default() + 1;
                        thread::yield_now();
                        batch.update(PARENT, counter, [("orderIndex", Value::Integer(next))])?;
                        inside.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .unwrap();
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let record = manager.read_view().get(PARENT, counter).unwrap().unwrap();
    assert_eq!(record.integer("orderIndex"), Some(TASKS as i64));
}

#[test]
fn failed_task_commits_nothing_and_releases_access() {
    let dir = tempfile::tempdir().unwrap();
    let manager = open_manager(&dir);

    let err = manager
        .exclusive_task(|batch| {
            batch.insert(PARENT, [("orderIndex", Value::Integer(1))])?;
            batch.insert(PARENT, [("orderIndex", Value::from("not a number"))])
        })
        .unwrap_err();
    assert!(matches!(
        err,
        CommitError::Aborted(StoreError::Validation { .. })
    ));
    assert_eq!(manager.read_view().count(PARENT).unwrap(), 0);

    insert_parent(&manager, "after failure", 2);
    assert_eq!(manager.read_view().count(PARENT).unwrap(), 1);
}

#[test]
fn panicking_task_releases_access() {
    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(open_manager(&dir));

    let m = Arc::clone(&manager);
    let result = thread::spawn(move || {
        m.exclusive_task(|batch| -> Result<(), StoreError> {
            batch.insert(PARENT, [("orderIndex", Value::Integer(1))])?;
            panic!("task blew up");
        })
    })
    .join();
    assert!(result.is_err());

    assert_eq!(manager.read_view().count(PARENT).unwrap(), 0);
    insert_parent(&manager, "still usable", 0);
}

#[test]
fn readers_wait_for_open() {
    let dir = tempfile::tempdir().unwrap();
    let manager = Arc::new(StoreManager::new(
        StoreConfig::in_dir(dir.path()),
        Arc::new(parent_child::registry()),
    ));

    let reader = {
        let manager = Arc::clone(&manager);
        thread::spawn(move || manager.read_view().count(PARENT).unwrap())
    };
    manager.open();
    assert_eq!(reader.join().unwrap(), 0);
}

#[test]
fn read_consistent_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let manager = open_manager(&dir);
    insert_parent(&manager, "a", 1);
    insert_parent(&manager, "b", 2);

    let (count, titles) = manager
        .read_view()
        .read(|snapshot| {
            let records = snapshot.fetch(PARENT)?;
            let titles: Vec<String> = records
                .iter()
                .filter_map(|r| r.text("title2").map(str::to_string))
                .collect();
            Ok((snapshot.count(PARENT)?, titles))
        })
        .unwrap();
    assert_eq!(count, 2);
    assert_eq!(titles, ["a", "b"]);

    let high = manager
        .read_view()
        .find(PARENT, |r| r.integer("orderIndex") == Some(2))
        .unwrap();
    assert_eq!(high.len(), 1);
}

// ---------------------------------------------------------------------------
// Staged changes
// ---------------------------------------------------------------------------

#[test]
fn save_without_changes_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let manager = open_manager(&dir);
    assert!(!manager.has_changes());
    assert!(!manager.save_if_dirty().unwrap());
}

#[test]
fn staged_changes_are_saved_together() {
    let dir = tempfile::tempdir().unwrap();
    let manager = open_manager(&dir);
    let parent = insert_parent(&manager, "owner", 0);

    manager.stage(Change::insert(
        CHILD,
        [("text", Value::from("staged")), ("rating", Value::Integer(3))],
    ));
    manager.stage(Change::update(PARENT, parent, [("email", Value::from("x@y.z"))]));
    assert!(manager.has_changes());

    assert!(manager.save_if_dirty().unwrap());
    assert!(!manager.has_changes());

    let view = manager.read_view();
    assert_eq!(view.count(CHILD).unwrap(), 1);
    let record = view.get(PARENT, parent).unwrap().unwrap();
    assert_eq!(record.text("email"), Some("x@y.z"));
}

#[test]
fn failed_save_keeps_changes_staged() {
    let dir = tempfile::tempdir().unwrap();
    let manager = open_manager(&dir);

    manager.stage(Change::insert(PARENT, [("orderIndex", Value::Integer(1))]));
    manager.stage(Change::relate(PARENT, 99, "childs", 100));

    let err = manager.save_if_dirty().unwrap_err();
    assert!(matches!(err, CommitError::Aborted(_)));
    assert!(manager.has_changes());
    assert_eq!(manager.read_view().count(PARENT).unwrap(), 0);
}

#[test]
fn cascading_delete_through_staged_change() {
    let dir = tempfile::tempdir().unwrap();
    let manager = open_manager(&dir);
    let parent = manager
        .exclusive_task(|batch| {
            let parent = batch.insert(PARENT, [("orderIndex", Value::Integer(0))])?;
            for rating in 0..3 {
                let child = batch.insert(CHILD, [("rating", Value::Integer(rating))])?;
                batch.relate(PARENT, parent, "childs", child)?;
            }
            Ok(parent)
        })
        .unwrap();
    assert_eq!(manager.read_view().count(CHILD).unwrap(), 3);

    manager.stage(Change::delete(PARENT, parent));
    assert!(manager.save_if_dirty().unwrap());
    assert_eq!(manager.read_view().count(CHILD).unwrap(), 0);
}

#[test]
fn staged_unrelate_detaches_both_sides() {
    let dir = tempfile::tempdir().unwrap();
    let manager = open_manager(&dir);
    let (parent, child) = manager
        .exclusive_task(|batch| {
            let parent = batch.insert(PARENT, [("orderIndex", Value::Integer(0))])?;
            let child = batch.insert(CHILD, [("rating", Value::Integer(1))])?;
            batch.relate(PARENT, parent, "childs", child)?;
            Ok((parent, child))
        })
        .unwrap();

    manager.stage(Change::unrelate(PARENT, parent, "childs", child));
    assert!(manager.save_if_dirty().unwrap());

    let view = manager.read_view();
    let parent = view.get(PARENT, parent).unwrap().unwrap();
    let child = view.get(CHILD, child).unwrap().unwrap();
    assert!(parent.related("childs").is_empty());
    assert!(child.related("parent").is_empty());
}

// ---------------------------------------------------------------------------
// Async entry points
// ---------------------------------------------------------------------------

#[tokio::test]
async fn spawn_exclusive_runs_on_blocking_pool() {
    let dir = tempfile::tempdir().unwrap();
    let manager = open_manager(&dir);

    let id = manager
        .spawn_exclusive(|batch| batch.insert(PARENT, [("orderIndex", Value::Integer(4))]))
        .await
        .unwrap();

    let view = manager.read_view_async().await.unwrap();
    let record = view.get(PARENT, id).unwrap().unwrap();
    assert_eq!(record.integer("orderIndex"), Some(4));
}

#[tokio::test]
async fn spawned_task_error_is_returned() {
    let dir = tempfile::tempdir().unwrap();
    let manager = open_manager(&dir);

    let err = manager
        .spawn_exclusive(|batch| batch.delete("Nobody", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, CommitError::Aborted(StoreError::Schema(_))));
}
