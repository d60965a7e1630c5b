//! Integration tests for graceful shutdown functionality
//!
//! These tests verify that:
//! - The voter and worker loops stop when the shutdown signal flips
//! - Work in progress is settled before the loops return
//! - A dropped sender also ends the loops

mod common;

use common::{harness, key, TXN};
use serde_json::json;
use std::time::Duration;
use tidewater::domain::status::Status;
use tokio::sync::watch;

#[tokio::test]
async fn test_monolith_loops_complete_export_then_stop() {
    let h = harness().await;
    h.source.add_database("db1", &["a", "b"]);
    h.source.insert_documents(
        "db1",
        "a",
        vec![json!({"_id": "x", "updatedAt": "2024-01-01T00:00:00Z"})],
    );
    h.engine.exports().unwrap().create(&key(TXN)).await.unwrap();

    let voter = h.engine.voter().unwrap();
    let executor = h.engine.executor(None).unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let exports = h.engine.exports().unwrap();
    let stopper = async {
        for _ in 0..200 {
            if exports.check(&key(TXN)).await.unwrap() == Status::Terminated {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        shutdown_tx.send(true).unwrap();
    };

    let result = tokio::time::timeout(Duration::from_secs(10), async {
        tokio::join!(
            voter.run(shutdown_rx.clone()),
            executor.run(shutdown_rx),
            stopper
        )
    })
    .await
    .expect("loops did not stop");

    assert!(result.0.is_ok());
    assert!(result.1.is_ok());
    assert_eq!(exports.check(&key(TXN)).await.unwrap(), Status::Terminated);
    assert_eq!(h.sink.rows("raw_mongodb_db1", "a").len(), 1);
}

#[tokio::test]
async fn test_shutdown_before_work_returns_promptly() {
    let h = harness().await;
    let voter = h.engine.voter().unwrap();
    let executor = h.engine.executor(None).unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let stopper = async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        shutdown_tx.send(true).unwrap();
    };

    let (voter_result, executor_result, _) = tokio::time::timeout(Duration::from_secs(5), async {
        tokio::join!(voter.run(shutdown_rx.clone()), executor.run(shutdown_rx), stopper)
    })
    .await
    .expect("loops did not stop");

    assert!(voter_result.is_ok());
    assert!(executor_result.is_ok());
}

#[tokio::test]
async fn test_dropped_sender_stops_loops() {
    let h = harness().await;
    let voter = h.engine.voter().unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    drop(shutdown_tx);

    let result = tokio::time::timeout(Duration::from_secs(5), voter.run(shutdown_rx))
        .await
        .expect("voter did not stop");
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_shutdown_signal_propagation() {
    // Test that shutdown signal propagates to multiple receivers
    let (shutdown_tx, shutdown_rx1) = watch::channel(false);
    let shutdown_rx2 = shutdown_rx1.clone();

    assert!(!*shutdown_rx1.borrow());
    assert!(!*shutdown_rx2.borrow());

    shutdown_tx.send(true).unwrap();

    assert!(*shutdown_rx1.borrow());
    assert!(*shutdown_rx2.borrow());
}
