use tokio::time::Instant;
use tracing::Instrument;

use crate::config::Endpoint;
use crate::driver::{Connector, DriverConnection, DriverCursor};
use crate::error::{DriverError, ErrorKind, SessionError};
use crate::outcome::FailureReason;

use super::{ConnectionState, CursorOf, Session};

impl<C: Connector> Session<C> {
    /// Make sure a usable connection is held, opening one if needed.
    ///
    /// Transient failures are retried with a fixed backoff while `reconnect_enabled` is
    /// set and the retry budget lasts; anything else fails on the spot. Every attempt is
    /// reported as a `CONNECT` event.
    ///
    /// # Errors
    /// `SessionError::ConnectFailed` when no connection could be opened, or
    /// `SessionError::ClosedSession` after [`close`](Self::close).
    pub async fn connect(&mut self) -> Result<&mut C::Connection, SessionError> {
        let span = self.span.clone();
        self.connect_inner().instrument(span).await
    }

    /// Make sure a usable cursor bound to the current connection is held.
    ///
    /// Connects first when the cursor is missing, closed, or its connection is gone.
    /// Never retries by itself; `connect` errors propagate.
    ///
    /// # Errors
    /// Same as [`connect`](Self::connect).
    pub async fn cursor(&mut self) -> Result<&mut CursorOf<C>, SessionError> {
        let span = self.span.clone();
        self.cursor_inner().instrument(span).await
    }

    /// Discard the current connection and cursor, then open fresh ones.
    ///
    /// # Errors
    /// Same as [`connect`](Self::connect).
    pub async fn reset(&mut self) -> Result<(), SessionError> {
        let span = self.span.clone();
        self.reset_inner().instrument(span).await
    }

    /// Release the connection. Idempotent; errors while closing are logged, not raised.
    ///
    /// Every later operation fails with `ClosedSession` instead of reconnecting.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        let span = self.span.clone();
        self.teardown().instrument(span).await;
        self.closed = true;
    }

    pub(super) async fn connect_inner(&mut self) -> Result<&mut C::Connection, SessionError> {
        self.ensure_open()?;

        let usable = self.state == ConnectionState::Connected
            && self
                .connection
                .as_ref()
                .is_some_and(DriverConnection::is_usable);
        if !usable {
            self.teardown().await;
            let conn = self.open_with_retry().await?;
            self.state = ConnectionState::Connected;
            return Ok(self.connection.insert(conn));
        }

        match self.connection.as_mut() {
            Some(conn) => Ok(conn),
            None => Err(connect_error(
                &self.config.endpoint,
                1,
                DriverError::transient("connection disappeared"),
            )),
        }
    }

    pub(super) async fn cursor_inner(&mut self) -> Result<&mut CursorOf<C>, SessionError> {
        self.ensure_open()?;

        let live = self.state == ConnectionState::Connected
            && self.cursor.as_ref().is_some_and(|c| !c.is_closed())
            && self
                .connection
                .as_ref()
                .is_some_and(DriverConnection::is_usable);
        if !live {
            if let Some(mut stale) = self.cursor.take() {
                stale.close();
            }
            let opened = self.connect_inner().await?.cursor();
            return match opened {
                Ok(cursor) => Ok(self.cursor.insert(cursor)),
                Err(err) => {
                    tracing::error!(error = %err, "could not open cursor; dropping connection");
                    let err = connect_error(&self.config.endpoint, 1, err);
                    self.report_connect(
                        std::time::Duration::ZERO,
                        0,
                        Some(FailureReason::from(&err)),
                    );
                    self.teardown().await;
                    Err(err)
                }
            };
        }

        match self.cursor.as_mut() {
            Some(cursor) => Ok(cursor),
            None => Err(connect_error(
                &self.config.endpoint,
                1,
                DriverError::transient("cursor disappeared"),
            )),
        }
    }

    pub(super) async fn reset_inner(&mut self) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.teardown().await;
        self.cursor_inner().await.map(|_| ())
    }

    /// Best-effort release of the cursor and connection.
    async fn teardown(&mut self) {
        if let Some(mut cursor) = self.cursor.take() {
            cursor.close();
        }
        if let Some(conn) = self.connection.take() {
            match conn.close().await {
                Ok(()) => tracing::info!("Closed PostgreSQL connection."),
                Err(err) => tracing::error!(error = %err, "Error closing connection"),
            }
        }
        self.state = ConnectionState::Disconnected;
    }

    async fn open_with_retry(&self) -> Result<C::Connection, SessionError> {
        let endpoint = &self.config.endpoint;
        let timeout = self.config.connect_timeout();
        let policy = self.config.connect_retry_policy();
        let mut retry = policy.start();

        loop {
            let started = Instant::now();
            let attempt = self.connector.connect(endpoint, timeout);
            let result = match tokio::time::timeout(timeout, attempt).await {
                Ok(result) => result,
                Err(_) => Err(DriverError::transient(format!(
                    "connect timed out after {}s",
                    timeout.as_secs()
                ))),
            };
            let elapsed = started.elapsed();

            match result {
                Ok(conn) => {
                    self.report_connect(elapsed, retry.attempt(), None);
                    tracing::info!(
                        attempt = retry.attempt(),
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Established connection to PostgreSQL at {}",
                        endpoint.label()
                    );
                    return Ok(conn);
                }
                Err(err) if err.is_transient() && retry.can_retry() => {
                    self.report_connect(
                        elapsed,
                        retry.attempt(),
                        Some(FailureReason::new(ErrorKind::Transient, err.to_string())),
                    );
                    tracing::warn!(
                        attempt = retry.attempt(),
                        backoff_ms = policy.backoff().as_millis() as u64,
                        error = %err,
                        "connection attempt failed; retrying"
                    );
                    retry.backoff().await;
                    retry.advance();
                }
                Err(err) => {
                    let transient = err.is_transient();
                    let err = connect_error(endpoint, retry.attempts_made(), err);
                    self.report_connect(elapsed, retry.attempt(), Some(FailureReason::from(&err)));
                    if transient {
                        tracing::error!(error = %err, "giving up on connection");
                    } else {
                        tracing::error!(error = %err, "connection failed; not retrying");
                    }
                    return Err(err);
                }
            }
        }
    }
}

fn connect_error(endpoint: &Endpoint, attempts: u32, source: DriverError) -> SessionError {
    SessionError::ConnectFailed {
        endpoint: endpoint.label(),
        attempts,
        source,
    }
}
