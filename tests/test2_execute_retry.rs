use std::sync::Arc;
use std::time::Duration;

use pg_session::prelude::*;
use pg_session::test_utils::{ScriptedConnector, result_set};
use pg_session::{DriverError, EventKind, StatementOutput};

fn config() -> SessionConfig {
    SessionConfig::new(Endpoint::new("db.test", 5432, "app", "app", "secret"))
        .with_retry_limit(3)
        .with_retry_backoff_secs(1)
}

fn kinds(reporter: &MemoryReporter, kind: EventKind) -> Vec<Option<ErrorKind>> {
    reporter
        .events()
        .iter()
        .filter(|e| e.kind == kind)
        .map(|e| e.failure_kind())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn transient_failure_is_retried_on_a_fresh_connection()
-> Result<(), Box<dyn std::error::Error>> {
    let connector = ScriptedConnector::new();
    connector
        .push_statement(Err(DriverError::transient(
            "server closed the connection unexpectedly",
        )))
        .push_statement(Ok(StatementOutput::Rows(result_set(
            &["id"],
            vec![vec![RowValues::Int(1)], vec![RowValues::Int(2)]],
        ))));
    let reporter = Arc::new(MemoryReporter::new());
    let mut session = Session::with_connector(config(), connector.clone(), reporter.clone())?;

    let outcome = session
        .execute("SELECT id FROM t WHERE id < %s", &[RowValues::Int(5)])
        .await?;

    assert!(outcome.succeeded);
    assert_eq!(outcome.row_count, 2);
    assert_eq!(outcome.rows.len(), 2);
    assert_eq!(
        outcome.rows.results[1].get("id").and_then(RowValues::as_int),
        Some(&2)
    );
    assert_eq!(
        kinds(&reporter, EventKind::QueryAttempt),
        vec![Some(ErrorKind::Transient), None]
    );
    assert_eq!(connector.connect_calls(), 2);
    assert_eq!(connector.closed_connections(), 1);
    assert_eq!(session.state(), ConnectionState::Connected);

    let executed = connector.executed();
    assert_eq!(executed[0].connection_id, 0);
    assert_eq!(executed[1].connection_id, 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn always_failing_statement_exhausts_retries() -> Result<(), Box<dyn std::error::Error>> {
    let connector = ScriptedConnector::new();
    connector.always_fail_statements(DriverError::transient("connection reset by peer"));
    let reporter = Arc::new(MemoryReporter::new());
    let mut session = Session::with_connector(config(), connector.clone(), reporter.clone())?;

    let started = tokio::time::Instant::now();
    let outcome = session.execute("UPDATE t SET n = n + 1", &[]).await?;
    let waited = started.elapsed();

    assert!(!outcome.succeeded);
    assert_eq!(outcome.failure_kind(), Some(ErrorKind::ConnectionExhausted));
    assert_eq!(connector.executed().len(), 4);
    assert_eq!(
        kinds(&reporter, EventKind::QueryAttempt),
        vec![
            Some(ErrorKind::Transient),
            Some(ErrorKind::Transient),
            Some(ErrorKind::Transient),
            Some(ErrorKind::ConnectionExhausted),
        ]
    );
    // initial connect plus one per reset
    assert_eq!(reporter.count(EventKind::ConnectAttempt, true), 4);
    assert!(waited >= Duration::from_secs(3));
    assert!(waited < Duration::from_secs(4));

    let attempts: Vec<u32> = reporter
        .events()
        .iter()
        .filter(|e| e.name == "UPDATE")
        .map(|e| e.attempt)
        .collect();
    assert_eq!(attempts, vec![0, 1, 2, 3]);

    assert_eq!(session.state(), ConnectionState::Broken);
    assert!(!session.is_closed());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn session_reconnects_after_exhaustion() -> Result<(), Box<dyn std::error::Error>> {
    let connector = ScriptedConnector::new();
    for _ in 0..2 {
        connector.push_statement(Err(DriverError::transient("connection reset by peer")));
    }
    let reporter = Arc::new(MemoryReporter::new());
    let mut session = Session::with_connector(
        config().with_retry_limit(1),
        connector.clone(),
        reporter.clone(),
    )?;

    let first = session.execute("SELECT 1", &[]).await?;
    assert_eq!(first.failure_kind(), Some(ErrorKind::ConnectionExhausted));
    assert_eq!(session.state(), ConnectionState::Broken);

    let second = session.execute("SELECT 1", &[]).await?;
    assert!(second.succeeded);
    assert_eq!(session.state(), ConnectionState::Connected);
    assert_eq!(connector.connect_calls(), 3);
    Ok(())
}

#[tokio::test]
async fn permanent_error_short_circuits() -> Result<(), Box<dyn std::error::Error>> {
    let connector = ScriptedConnector::new();
    let missing_column =
        DriverError::permanent("ERROR: column \"nope\" does not exist").with_code("42703");
    connector.push_statement(Err(missing_column));
    let reporter = Arc::new(MemoryReporter::new());
    let mut session = Session::with_connector(config(), connector.clone(), reporter.clone())?;

    let outcome = session.execute("SELECT nope FROM t", &[]).await?;

    assert!(!outcome.succeeded);
    let failure = outcome.failure.as_ref().ok_or("missing failure reason")?;
    assert_eq!(failure.kind, ErrorKind::QueryFailed);
    assert!(failure.message.contains("nope"));
    assert_eq!(
        kinds(&reporter, EventKind::QueryAttempt),
        vec![Some(ErrorKind::QueryFailed)]
    );
    assert_eq!(connector.executed().len(), 1);
    assert_eq!(connector.connect_calls(), 1);

    // the connection survives a statement error
    assert_eq!(session.state(), ConnectionState::Connected);
    assert!(session.execute("SELECT 1", &[]).await?.succeeded);
    assert_eq!(connector.connect_calls(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_reset_ends_the_call() -> Result<(), Box<dyn std::error::Error>> {
    let connector = ScriptedConnector::new();
    connector
        .push_connect(Ok(()))
        .push_connect(Err(DriverError::permanent("too many clients")))
        .push_statement(Err(DriverError::transient("connection reset by peer")));
    let reporter = Arc::new(MemoryReporter::new());
    let mut session = Session::with_connector(config(), connector.clone(), reporter.clone())?;

    let outcome = session.execute("DELETE FROM t", &[]).await?;

    assert_eq!(outcome.failure_kind(), Some(ErrorKind::ConnectFailed));
    assert_eq!(connector.executed().len(), 1);
    assert_eq!(
        kinds(&reporter, EventKind::QueryAttempt),
        vec![Some(ErrorKind::Transient)]
    );
    assert_eq!(
        kinds(&reporter, EventKind::ConnectAttempt),
        vec![None, Some(ErrorKind::ConnectFailed)]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn statement_timeout_counts_as_transient() -> Result<(), Box<dyn std::error::Error>> {
    let connector = ScriptedConnector::new();
    connector.delay_statements(Duration::from_secs(60));
    let reporter = Arc::new(MemoryReporter::new());
    let mut session = Session::with_connector(
        config()
            .with_retry_limit(1)
            .with_statement_timeout_secs(Some(2)),
        connector.clone(),
        reporter.clone(),
    )?;

    let outcome = session.execute("SELECT pg_sleep(60)", &[]).await?;

    assert_eq!(outcome.failure_kind(), Some(ErrorKind::ConnectionExhausted));
    // only the final attempt, not the backoff or the first timeout
    assert!(outcome.elapsed >= Duration::from_secs(2));
    assert!(outcome.elapsed < Duration::from_secs(3));
    assert_eq!(connector.executed().len(), 2);
    assert_eq!(
        kinds(&reporter, EventKind::QueryAttempt),
        vec![Some(ErrorKind::Transient), Some(ErrorKind::ConnectionExhausted)]
    );
    Ok(())
}

#[tokio::test]
async fn write_reports_rows_affected() -> Result<(), Box<dyn std::error::Error>> {
    let connector = ScriptedConnector::new();
    connector
        .push_statement(Ok(StatementOutput::Command { rows_affected: 0 }))
        .push_statement(Ok(StatementOutput::Command { rows_affected: 3 }));
    let reporter = Arc::new(MemoryReporter::new());
    let mut session = Session::with_connector(config(), connector.clone(), reporter.clone())?;

    let ddl = session
        .execute("CREATE TABLE IF NOT EXISTS t (id INT)", &[])
        .await?;
    assert!(ddl.succeeded);
    assert_eq!(ddl.row_count, 0);

    let insert = session
        .execute(
            "INSERT INTO t (id) VALUES (%s), (%s), (%s)",
            &[RowValues::Int(1), RowValues::Int(2), RowValues::Int(3)],
        )
        .await?;
    assert!(insert.succeeded);
    assert_eq!(insert.row_count, 3);
    assert!(insert.rows.is_empty());

    let summary = reporter.summary();
    assert_eq!(summary["CREATE"].requests, 1);
    assert_eq!(summary["INSERT"].rows, 3);
    assert_eq!(summary["CONNECT"].requests, 1);
    Ok(())
}
