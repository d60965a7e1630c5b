//! Integration tests for the command surface
//!
//! Commands are parsed with clap and run against the in-memory engine; only
//! their exit codes are checked here, the JSON output goes to stdout.

mod common;

use clap::Parser;
use common::{harness, TXN};
use tidewater::cli::commands::{EXIT_CLIENT_ERROR, EXIT_OK};
use tidewater::cli::{Cli, Commands};
use tidewater::core::engine::Engine;
use tidewater::domain::status::Status;

async fn run(engine: &Engine, args: &[&str]) -> i32 {
    let mut argv = vec!["tidewater"];
    argv.extend_from_slice(args);
    let cli = Cli::parse_from(argv);
    match &cli.command {
        Commands::Export(args) => args.run(engine).await.unwrap(),
        Commands::Task(args) => args.run(engine).await.unwrap(),
        other => panic!("not an engine command: {other:?}"),
    }
}

fn key_args(command: &str) -> Vec<&str> {
    vec![
        "export",
        command,
        "--transaction",
        TXN,
        "--source",
        "s1",
        "--target",
        "tg1",
        "--database",
        "db1",
    ]
}

#[tokio::test]
async fn test_export_lifecycle_exit_codes() {
    let h = harness().await;
    h.source.add_database("db1", &["a", "b"]);

    assert_eq!(run(&h.engine, &key_args("create")).await, EXIT_OK);
    assert_eq!(run(&h.engine, &key_args("check")).await, EXIT_OK);
    assert_eq!(run(&h.engine, &key_args("stop")).await, EXIT_OK);

    // stopped exports need --force
    assert_eq!(run(&h.engine, &key_args("retry")).await, EXIT_CLIENT_ERROR);
    let mut forced = key_args("retry");
    forced.push("--force");
    assert_eq!(run(&h.engine, &forced).await, EXIT_OK);

    assert_eq!(
        h.engine
            .exports()
            .unwrap()
            .check(&common::key(TXN))
            .await
            .unwrap(),
        Status::Created
    );
}

#[tokio::test]
async fn test_unknown_export_is_client_error() {
    let h = harness().await;
    assert_eq!(run(&h.engine, &key_args("check")).await, EXIT_CLIENT_ERROR);
    assert_eq!(run(&h.engine, &key_args("play")).await, EXIT_CLIENT_ERROR);
}

#[tokio::test]
async fn test_malformed_transaction_is_client_error() {
    let h = harness().await;
    let code = run(
        &h.engine,
        &[
            "export",
            "create",
            "--transaction",
            "not-a-uuid",
            "--source",
            "s1",
            "--target",
            "tg1",
            "--database",
            "db1",
        ],
    )
    .await;
    assert_eq!(code, EXIT_CLIENT_ERROR);
}

#[tokio::test]
async fn test_listing_and_counting() {
    let h = harness().await;
    h.source.add_database("db1", &["a", "b"]);
    run(&h.engine, &key_args("create")).await;

    assert_eq!(
        run(&h.engine, &["export", "list", "--status", "created"]).await,
        EXIT_OK
    );
    assert_eq!(
        run(&h.engine, &["task", "count", "--status", "created"]).await,
        EXIT_OK
    );
    assert_eq!(
        run(&h.engine, &["task", "list", "--worker", "w1"]).await,
        EXIT_OK
    );
}
