#![cfg(feature = "test-utils-postgres")]

use std::sync::Arc;

use pg_session::EventKind;
use pg_session::prelude::*;
use pg_session::test_utils::postgres::{setup_postgres_embedded, stop_postgres_embedded};

#[tokio::test(flavor = "multi_thread")]
async fn session_round_trip_against_embedded_postgres() -> Result<(), Box<dyn std::error::Error>> {
    let pg = setup_postgres_embedded("session_test").await?;
    let reporter = Arc::new(MemoryReporter::new());
    let mut session = Session::new(pg.session_config(), reporter.clone())?;

    let ddl = session
        .execute("CREATE TABLE IF NOT EXISTS t (id BIGINT, name TEXT)", &[])
        .await?;
    assert!(ddl.succeeded);
    assert_eq!(ddl.row_count, 0);

    let insert = session
        .execute("INSERT INTO t (id) VALUES (%s)", &[RowValues::Int(1)])
        .await?;
    assert!(insert.succeeded);
    assert_eq!(insert.row_count, 1);

    let select = session
        .execute("SELECT id FROM t WHERE id < %s", &[RowValues::Int(5)])
        .await?;
    assert!(select.succeeded);
    assert_eq!(select.row_count, 1);
    assert_eq!(
        select.rows.results[0].get("id").and_then(RowValues::as_int),
        Some(&1)
    );

    // hostile text is stored as data
    let hostile = "'; DROP TABLE t; --";
    session
        .execute(
            "INSERT INTO t (id, name) VALUES (%s, %s)",
            &[RowValues::Int(2), RowValues::Text(hostile.to_string())],
        )
        .await?;
    let names = session
        .execute("SELECT name FROM t WHERE id = %s", &[RowValues::Int(2)])
        .await?;
    assert_eq!(
        names.rows.results[0].get("name").and_then(RowValues::as_text),
        Some(hostile)
    );

    let bad = session.execute("SELECT nope FROM t", &[]).await?;
    assert_eq!(bad.failure_kind(), Some(ErrorKind::QueryFailed));
    assert_eq!(
        reporter
            .failures()
            .iter()
            .filter(|e| e.kind == EventKind::QueryAttempt)
            .count(),
        1
    );

    session.close().await;
    stop_postgres_embedded(pg).await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn numeric_columns_bind_and_decode() -> Result<(), Box<dyn std::error::Error>> {
    let pg = setup_postgres_embedded("session_numeric").await?;
    let mut session = Session::new(pg.session_config(), Arc::new(NoopReporter))?;

    session
        .execute(
            "CREATE TABLE orders (order_id SERIAL PRIMARY KEY, total_amount NUMERIC(10,2))",
            &[],
        )
        .await?;

    let inserted = session
        .execute(
            "INSERT INTO orders (total_amount) VALUES (%s) RETURNING total_amount",
            &[RowValues::Float(12.5)],
        )
        .await?;
    assert!(inserted.succeeded, "{:?}", inserted.failure);
    let row = &inserted.rows.results[0];
    assert_eq!(
        row.get("total_amount").and_then(RowValues::as_float),
        Some(12.5)
    );

    session
        .execute(
            "INSERT INTO orders (total_amount) VALUES (%s), (%s)",
            &[RowValues::Int(75), RowValues::Text("199.99".to_string())],
        )
        .await?;

    let over = session
        .execute(
            "SELECT total_amount FROM orders WHERE total_amount > %s ORDER BY total_amount",
            &[RowValues::Int(50)],
        )
        .await?;
    assert!(over.succeeded, "{:?}", over.failure);
    let totals: Vec<f64> = over
        .rows
        .results
        .iter()
        .filter_map(|row| row.get("total_amount").and_then(RowValues::as_float))
        .collect();
    assert_eq!(totals.len(), 2);
    assert!((totals[0] - 75.0).abs() < 1e-9);
    assert!((totals[1] - 199.99).abs() < 1e-9);

    let all = session.execute("SELECT * FROM orders", &[]).await?;
    assert!(all.succeeded, "{:?}", all.failure);
    assert_eq!(all.row_count, 3);

    session.close().await;
    stop_postgres_embedded(pg).await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn terminated_backend_is_recovered() -> Result<(), Box<dyn std::error::Error>> {
    let pg = setup_postgres_embedded("session_recovery").await?;
    let reporter = Arc::new(MemoryReporter::new());
    let cfg = pg.session_config().with_retry_backoff_secs(0);
    let mut victim = Session::new(cfg.clone(), reporter.clone())?;
    let mut admin = Session::new(cfg, Arc::new(NoopReporter))?;

    let pid = victim.execute("SELECT pg_backend_pid() AS pid", &[]).await?;
    let pid = pid.rows.results[0]
        .get("pid")
        .and_then(RowValues::as_int)
        .copied()
        .ok_or("missing backend pid")?;

    let killed = admin
        .execute("SELECT pg_terminate_backend(%s)", &[RowValues::Int(pid)])
        .await?;
    assert!(killed.succeeded);

    let after = victim.execute("SELECT 1 AS one", &[]).await?;
    assert!(after.succeeded);
    assert_eq!(victim.state(), ConnectionState::Connected);
    assert!(reporter.count(EventKind::ConnectAttempt, true) >= 2);

    victim.close().await;
    admin.close().await;
    stop_postgres_embedded(pg).await;
    Ok(())
}
