//! Integration tests for export and task orchestration
//!
//! These tests drive a monolith engine through its export commands, voter
//! ticks and worker ticks over the in-memory backends.

mod common;

use common::{harness, harness_with_workers, key, TXN, TXN_2};
use serde_json::json;
use tidewater::adapters::database::{ExportStore, TaskStore};
use tidewater::core::worker::Outcome;
use tidewater::domain::ids::{ExportKey, WorkerName};
use tidewater::domain::query::{ExportFilter, TaskFilter, WorkerMatch};
use tidewater::domain::status::Status;
use tidewater::domain::task::ExportTaskBuilder;
use tidewater::domain::TidewaterError;

#[tokio::test]
async fn test_create_fans_out_one_task_per_collection() {
    let h = harness().await;
    h.source.add_database("db1", &["a", "b"]);

    let export = h.engine.exports().unwrap().create(&key(TXN)).await.unwrap();
    assert_eq!(export.status, Status::Created);

    let tasks = h.engine.tasks().unwrap().tasks_of(&key(TXN)).await.unwrap();
    let mut collections: Vec<&str> = tasks.iter().map(|t| t.key.collection.as_str()).collect();
    collections.sort_unstable();
    assert_eq!(collections, vec!["a", "b"]);
    assert!(tasks.iter().all(|t| t.status == Status::Created));
    assert!(tasks.iter().all(|t| t.worker.is_none()));
}

#[tokio::test]
async fn test_system_collections_are_not_exported() {
    let h = harness().await;
    h.source.add_database("db1", &["a", "system.views"]);

    h.engine.exports().unwrap().create(&key(TXN)).await.unwrap();
    let tasks = h.engine.tasks().unwrap().tasks_of(&key(TXN)).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].key.collection, "a");
}

#[tokio::test]
async fn test_voter_assigns_free_worker_and_starts_export() {
    let h = harness().await;
    h.source.add_database("db1", &["a", "b"]);
    h.engine.exports().unwrap().create(&key(TXN)).await.unwrap();

    let voter = h.engine.voter().unwrap();
    let report = voter.tick().await.unwrap();
    let (task_key, worker) = report.assigned.expect("a task should be assigned");
    assert_eq!(worker.as_str(), "w1");

    let task = h.store.find_task(&task_key).await.unwrap().unwrap();
    assert_eq!(task.status, Status::Running);
    assert_eq!(task.worker.as_ref().map(WorkerName::as_str), Some("w1"));
    assert!(task.window.is_some());
    assert_eq!(
        h.engine.exports().unwrap().check(&key(TXN)).await.unwrap(),
        Status::Running
    );

    // w1 is busy until its task settles
    let second = voter.tick().await.unwrap();
    assert!(second.assigned.is_none());
}

#[tokio::test]
async fn test_empty_window_terminates_without_tables() {
    let h = harness().await;
    h.source.add_database("db1", &["a"]);
    h.engine.exports().unwrap().create(&key(TXN)).await.unwrap();

    let voter = h.engine.voter().unwrap();
    let executor = h.engine.executor(Some("w1")).unwrap();
    voter.tick().await.unwrap();

    let outcome = executor.tick().await.unwrap();
    assert!(matches!(outcome, Some(Outcome::Finished { count: 0, .. })));

    let task = h
        .store
        .find_task(&key(TXN).task("a").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task.status, Status::Terminated);
    assert_eq!(task.count, 0);
    assert!(h.sink.table_names().is_empty());
}

#[tokio::test]
async fn test_export_terminates_after_all_tasks() {
    let h = harness().await;
    h.source.add_database("db1", &["a", "b"]);
    h.engine.exports().unwrap().create(&key(TXN)).await.unwrap();

    let voter = h.engine.voter().unwrap();
    let executor = h.engine.executor(Some("w1")).unwrap();
    for _ in 0..2 {
        voter.tick().await.unwrap();
        executor.tick().await.unwrap();
    }

    let report = voter.tick().await.unwrap();
    assert_eq!(report.finished, vec![key(TXN).transaction]);
    assert_eq!(
        h.engine.exports().unwrap().check(&key(TXN)).await.unwrap(),
        Status::Terminated
    );
}

#[tokio::test]
async fn test_export_errors_when_a_task_fails() {
    let h = harness().await;
    h.source.add_database("db1", &["a", "b"]);
    h.engine.exports().unwrap().create(&key(TXN)).await.unwrap();

    let voter = h.engine.voter().unwrap();
    let executor = h.engine.executor(Some("w1")).unwrap();

    // both attempts of the first task fail
    h.source.fail_next_counts(2);
    voter.tick().await.unwrap();
    let failed = executor.tick().await.unwrap();
    assert!(matches!(failed, Some(Outcome::Failed { .. })));

    voter.tick().await.unwrap();
    let finished = executor.tick().await.unwrap();
    assert!(matches!(finished, Some(Outcome::Finished { .. })));

    let report = voter.tick().await.unwrap();
    assert_eq!(report.errored, vec![key(TXN).transaction]);
    assert_eq!(
        h.engine.exports().unwrap().check(&key(TXN)).await.unwrap(),
        Status::Error
    );

    let errored = h
        .engine
        .tasks()
        .unwrap()
        .list(&TaskFilter::for_export(&key(TXN)).with_statuses(&[Status::Error]))
        .await
        .unwrap();
    assert_eq!(errored.metadata.count, 1);
    assert!(errored.results[0]
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("count interrupted"));
}

#[tokio::test]
async fn test_retry_after_error_reruns_failed_task() {
    let h = harness().await;
    h.source.add_database("db1", &["a"]);
    h.engine.exports().unwrap().create(&key(TXN)).await.unwrap();

    let voter = h.engine.voter().unwrap();
    let executor = h.engine.executor(Some("w1")).unwrap();
    h.source.fail_next_counts(2);
    voter.tick().await.unwrap();
    executor.tick().await.unwrap();
    voter.tick().await.unwrap();
    assert_eq!(
        h.engine.exports().unwrap().check(&key(TXN)).await.unwrap(),
        Status::Error
    );

    let retried = h.engine.exports().unwrap().retry(&key(TXN), false).await.unwrap();
    assert_eq!(retried.status, Status::Created);
    let task = h
        .store
        .find_task(&key(TXN).task("a").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(task.status, Status::Created);
    assert!(task.worker.is_none());
    assert!(task.error.is_none());

    voter.tick().await.unwrap();
    executor.tick().await.unwrap();
    voter.tick().await.unwrap();
    assert_eq!(
        h.engine.exports().unwrap().check(&key(TXN)).await.unwrap(),
        Status::Terminated
    );
}

#[tokio::test]
async fn test_retry_from_stopped_requires_force() {
    let h = harness().await;
    h.source.add_database("db1", &["a", "b"]);
    let exports = h.engine.exports().unwrap();
    exports.create(&key(TXN)).await.unwrap();
    exports.stop(&key(TXN)).await.unwrap();

    let err = exports.retry(&key(TXN), false).await.unwrap_err();
    match err {
        TidewaterError::InvalidStateChange {
            old,
            new,
            valid_from,
        } => {
            assert_eq!(old, Status::Stopped);
            assert_eq!(new, Status::Created);
            assert_eq!(valid_from, vec![Status::Error]);
        }
        other => panic!("unexpected error: {other}"),
    }

    let retried = exports.retry(&key(TXN), true).await.unwrap();
    assert_eq!(retried.status, Status::Created);
    let created = h
        .engine
        .tasks()
        .unwrap()
        .count(&TaskFilter::for_export(&key(TXN)).with_statuses(&[Status::Created]))
        .await
        .unwrap();
    assert_eq!(created, 2);
}

#[tokio::test]
async fn test_stopped_task_is_not_executed() {
    let h = harness().await;
    h.source.add_database("db1", &["a"]);
    h.engine.exports().unwrap().create(&key(TXN)).await.unwrap();

    let voter = h.engine.voter().unwrap();
    let executor = h.engine.executor(Some("w1")).unwrap();
    voter.tick().await.unwrap();
    h.engine.exports().unwrap().stop(&key(TXN)).await.unwrap();

    assert!(executor.tick().await.unwrap().is_none());
    let report = voter.tick().await.unwrap();
    assert!(report.is_idle());
    assert_eq!(
        h.engine.exports().unwrap().check(&key(TXN)).await.unwrap(),
        Status::Stopped
    );
}

#[tokio::test]
async fn test_failed_fan_out_leaves_nothing_behind() {
    let h = harness().await;
    h.source.add_database("db1", &["a", "b", "c"]);
    h.store.fail_task_insert_for("c");

    let err = h.engine.exports().unwrap().create(&key(TXN)).await.unwrap_err();
    assert!(!err.is_client_error());

    assert!(h
        .store
        .list_exports(&ExportFilter::default())
        .await
        .unwrap()
        .is_empty());
    assert_eq!(
        h.store
            .count_tasks(&TaskFilter::for_transaction(&key(TXN).transaction))
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_one_active_export_per_triple() {
    let h = harness().await;
    h.source.add_database("db1", &["a"]);
    let exports = h.engine.exports().unwrap();
    exports.create(&key(TXN)).await.unwrap();

    let err = exports.create(&key(TXN_2)).await.unwrap_err();
    assert!(matches!(err, TidewaterError::InvalidStateChange { .. }));

    // once the first one has settled the triple is free again
    let voter = h.engine.voter().unwrap();
    let executor = h.engine.executor(Some("w1")).unwrap();
    voter.tick().await.unwrap();
    executor.tick().await.unwrap();
    voter.tick().await.unwrap();
    exports.create(&key(TXN_2)).await.unwrap();
}

#[tokio::test]
async fn test_reused_transaction_is_rejected() {
    let h = harness().await;
    h.source.add_database("db1", &["a"]);
    h.source.add_database("db2", &["a"]);
    let exports = h.engine.exports().unwrap();
    exports.create(&key(TXN)).await.unwrap();

    let other_db = ExportKey::new(TXN, "s1", "tg1", "db2").unwrap();
    let err = exports.create(&other_db).await.unwrap_err();
    assert!(matches!(err, TidewaterError::BadRequest(_)));
}

#[tokio::test]
async fn test_active_collection_blocks_fan_out() {
    let h = harness().await;
    h.source.add_database("db1", &["a", "b"]);

    // a running task for collection b left over by another transaction
    let stray = ExportTaskBuilder::new(key(TXN_2).task("b").unwrap())
        .status(Status::Running)
        .worker(WorkerName::new("w9").unwrap())
        .build();
    assert!(h.store.insert_task(&stray).await.unwrap().is_none());

    let err = h.engine.exports().unwrap().create(&key(TXN)).await.unwrap_err();
    assert!(matches!(
        err,
        TidewaterError::InvalidStateChange {
            old: Status::Running,
            ..
        }
    ));
    assert!(h.store.find_export(&key(TXN)).await.unwrap().is_none());
    assert_eq!(
        h.store
            .count_tasks(&TaskFilter::for_transaction(&key(TXN).transaction))
            .await
            .unwrap(),
        0
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_have_one_winner() {
    let h = harness().await;
    h.source.add_database("db1", &["a"]);
    h.engine.exports().unwrap().create(&key(TXN)).await.unwrap();

    let tasks = h.engine.tasks().unwrap();
    let task = key(TXN).task("a").unwrap();
    let w1 = WorkerName::new("w1").unwrap();
    let w2 = WorkerName::new("w2").unwrap();
    let (first, second) = tokio::join!(tasks.start(&task, &w1), tasks.start(&task, &w2));

    assert_eq!(first.is_ok() as u8 + second.is_ok() as u8, 1);
    let loser = if first.is_ok() { second } else { first };
    assert!(matches!(
        loser,
        Err(TidewaterError::InvalidStateChange {
            old: Status::Running,
            ..
        })
    ));
    assert_eq!(tasks.busy_workers().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_each_worker_holds_one_task() {
    let h = harness_with_workers(&["w1", "w2"]).await;
    h.source.add_database("db1", &["a", "b", "c"]);
    h.engine.exports().unwrap().create(&key(TXN)).await.unwrap();

    let voter = h.engine.voter().unwrap();
    let mut assigned = Vec::new();
    for _ in 0..3 {
        if let Some((_, worker)) = voter.tick().await.unwrap().assigned {
            assigned.push(worker.as_str().to_string());
        }
    }
    assigned.sort();
    assert_eq!(assigned, vec!["w1", "w2"]);

    let running = h
        .engine
        .tasks()
        .unwrap()
        .count(&TaskFilter::for_export(&key(TXN)).with_statuses(&[Status::Running]))
        .await
        .unwrap();
    assert_eq!(running, 2);
}

#[tokio::test]
async fn test_task_listing_by_worker() {
    let h = harness().await;
    h.source.add_database("db1", &["a", "b"]);
    h.source.insert_documents(
        "db1",
        "a",
        vec![json!({"_id": "x", "updatedAt": "2024-01-01T00:00:00Z"})],
    );
    h.engine.exports().unwrap().create(&key(TXN)).await.unwrap();
    h.engine.voter().unwrap().tick().await.unwrap();

    let filter =
        TaskFilter::default().with_worker(WorkerMatch::Assigned(WorkerName::new("w1").unwrap()));
    let listed = h.engine.tasks().unwrap().list(&filter).await.unwrap();
    assert_eq!(listed.metadata.count, 1);
    assert_eq!(listed.results[0].status, Status::Running);
}
