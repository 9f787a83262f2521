use std::time::Duration;

use tokio::time::Instant;
use tracing::Instrument;

use crate::driver::{Connector, DriverCursor, StatementOutput};
use crate::error::{DriverError, ErrorKind, SessionError};
use crate::outcome::{FailureReason, QueryOutcome};
use crate::translation::{statement_verb, translate_placeholders};
use crate::types::{ErrorMode, RowValues};

use super::{ConnectionState, Session};

impl<C: Connector> Session<C> {
    /// Run one statement with positionally bound parameters.
    ///
    /// Parameters always travel out-of-band; only the placeholder syntax of `sql` is
    /// rewritten (see [`PlaceholderStyle`](crate::PlaceholderStyle)). Transient failures
    /// tear down the connection, wait the fixed backoff, reconnect, and retry, up to
    /// `retry_limit` times. Every attempt is reported to the outcome reporter under the
    /// statement's leading keyword.
    ///
    /// # Errors
    /// Only in [`ErrorMode::Raise`]. In the default [`ErrorMode::Outcome`] every failure
    /// comes back as `Ok(QueryOutcome { succeeded: false, .. })`.
    pub async fn execute(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<QueryOutcome, SessionError> {
        let span = self.span.clone();
        self.execute_inner(sql, params).instrument(span).await
    }

    async fn execute_inner(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<QueryOutcome, SessionError> {
        let name = statement_verb(sql);
        let translated = translate_placeholders(sql, self.config.placeholder_style);
        let statement_timeout = self.config.statement_timeout();
        let mut retry = self.config.statement_retry_policy().start();

        loop {
            if self.closed {
                let err = SessionError::ClosedSession;
                self.report_query(
                    &name,
                    Duration::ZERO,
                    0,
                    retry.attempt(),
                    Some(FailureReason::from(&err)),
                );
                return self.finish(Duration::ZERO, err);
            }

            // Connect failures were already reported as CONNECT events.
            let cursor = match self.cursor_inner().await {
                Ok(cursor) => cursor,
                Err(err) => return self.finish(Duration::ZERO, err),
            };

            let started = Instant::now();
            let result = run_statement(cursor, &translated, params, statement_timeout).await;
            let elapsed = started.elapsed();

            match result {
                Ok(output) => {
                    let row_count = output.row_count();
                    self.report_query(&name, elapsed, row_count, retry.attempt(), None);
                    tracing::debug!(
                        statement = %name,
                        rows = row_count,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "statement succeeded"
                    );
                    return Ok(QueryOutcome::success(
                        elapsed,
                        row_count,
                        output.into_rows(),
                    ));
                }
                Err(err) if err.is_transient() => {
                    self.state = ConnectionState::Broken;
                    if retry.can_retry() {
                        self.report_query(
                            &name,
                            elapsed,
                            0,
                            retry.attempt(),
                            Some(FailureReason::new(ErrorKind::Transient, err.to_string())),
                        );
                        tracing::warn!(
                            statement = %name,
                            attempt = retry.attempt(),
                            error = %err,
                            "transient failure; reconnecting before retry"
                        );
                        retry.backoff().await;
                        retry.advance();
                        if let Err(reset_err) = self.reset_inner().await {
                            return self.finish(elapsed, reset_err);
                        }
                        continue;
                    }

                    let err = SessionError::ConnectionExhausted {
                        attempts: retry.attempts_made(),
                        source: err,
                    };
                    self.report_query(
                        &name,
                        elapsed,
                        0,
                        retry.attempt(),
                        Some(FailureReason::from(&err)),
                    );
                    tracing::error!(statement = %name, error = %err, "giving up on statement");
                    return self.finish(elapsed, err);
                }
                Err(err) => {
                    let err = SessionError::QueryFailed { source: err };
                    self.report_query(
                        &name,
                        elapsed,
                        0,
                        retry.attempt(),
                        Some(FailureReason::from(&err)),
                    );
                    tracing::error!(statement = %name, error = %err, "statement failed");
                    return self.finish(elapsed, err);
                }
            }
        }
    }

    /// Turn a terminal failure into the configured propagation style.
    fn finish(
        &self,
        elapsed: Duration,
        err: SessionError,
    ) -> Result<QueryOutcome, SessionError> {
        match self.config.error_mode {
            ErrorMode::Outcome => Ok(QueryOutcome::failure(elapsed, FailureReason::from(&err))),
            ErrorMode::Raise => Err(err),
        }
    }
}

async fn run_statement<K: DriverCursor>(
    cursor: &mut K,
    sql: &str,
    params: &[RowValues],
    timeout: Option<Duration>,
) -> Result<StatementOutput, DriverError> {
    match timeout {
        None => cursor.execute(sql, params).await,
        Some(limit) => match tokio::time::timeout(limit, cursor.execute(sql, params)).await {
            Ok(result) => result,
            Err(_) => Err(DriverError::transient(format!(
                "statement timed out after {}s",
                limit.as_secs()
            ))),
        },
    }
}
