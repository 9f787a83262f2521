//! The seam between [`Session`](crate::Session) and a wire driver.
//!
//! A [`Connector`] opens connections; a [`DriverConnection`] hands out cursors; a
//! [`DriverCursor`] runs one statement at a time. The session owns all of them and never
//! touches driver types directly, which keeps the retry state machine testable with the
//! scripted driver in `test_utils`.

use std::time::Duration;

use async_trait::async_trait;

use crate::config::Endpoint;
use crate::error::DriverError;
use crate::results::ResultSet;
use crate::types::RowValues;

/// What a statement produced.
#[derive(Debug, Clone)]
pub enum StatementOutput {
    /// The statement described columns; every row was fetched.
    Rows(ResultSet),
    /// No result set; the driver reported this many affected rows (0 for DDL).
    Command { rows_affected: u64 },
}

impl StatementOutput {
    /// Rows returned for reads, rows affected otherwise.
    #[must_use]
    pub fn row_count(&self) -> usize {
        match self {
            StatementOutput::Rows(rs) => rs.len(),
            StatementOutput::Command { rows_affected } => {
                usize::try_from(*rows_affected).unwrap_or(usize::MAX)
            }
        }
    }

    #[must_use]
    pub fn into_rows(self) -> ResultSet {
        match self {
            StatementOutput::Rows(rs) => rs,
            StatementOutput::Command { .. } => ResultSet::default(),
        }
    }
}

#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: DriverConnection;

    /// Open a new connection with autocommit semantics.
    ///
    /// Implementations should honour `timeout`; the session also enforces it.
    async fn connect(
        &self,
        endpoint: &Endpoint,
        timeout: Duration,
    ) -> Result<Self::Connection, DriverError>;
}

#[async_trait]
pub trait DriverConnection: Send + Sync {
    type Cursor: DriverCursor;

    /// False once the peer has gone away or the connection was closed.
    fn is_usable(&self) -> bool;

    /// Create a cursor bound to this connection.
    ///
    /// # Errors
    /// Returns a `DriverError` if the connection can no longer issue statements.
    fn cursor(&self) -> Result<Self::Cursor, DriverError>;

    /// Release the connection.
    async fn close(self) -> Result<(), DriverError>;
}

#[async_trait]
pub trait DriverCursor: Send + Sync {
    /// True when the cursor can no longer be used, including when its connection died.
    fn is_closed(&self) -> bool;

    /// Run one statement with positionally bound parameters.
    async fn execute(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<StatementOutput, DriverError>;

    /// Release the cursor. Closing is synchronous and infallible by default.
    fn close(&mut self) {}
}
