//! A single resilient database session.
//!
//! One [`Session`] owns one connection and one cursor bound to it. Statements run
//! serially (every operation takes `&mut self`); concurrency comes from running many
//! sessions, each on its own task, sharing one [`OutcomeReporter`].
//!
//! ```text
//! Disconnected --connect--> Connected --transient failure--> Broken
//!      ^                        |                              |
//!      +------close/reset-------+<-----------reset-------------+
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::Span;

use crate::config::{Endpoint, SessionConfig};
use crate::driver::{Connector, DriverConnection};
use crate::error::SessionError;
use crate::outcome::FailureReason;
use crate::postgres::PgConnector;
use crate::reporter::{CONNECT_EVENT, EventKind, OutcomeEvent, OutcomeReporter};

mod execute;
mod lifecycle;

/// Lifecycle state of the session's connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No connection is held.
    Disconnected,
    /// A connection and cursor may be used.
    Connected,
    /// The last statement failed transiently; the connection must be rebuilt before use.
    Broken,
}

pub(crate) type CursorOf<C> = <<C as Connector>::Connection as DriverConnection>::Cursor;

/// Owns one database connection's lifecycle and runs statements against it.
pub struct Session<C: Connector = PgConnector> {
    config: SessionConfig,
    connector: C,
    reporter: Arc<dyn OutcomeReporter>,
    span: Span,
    state: ConnectionState,
    connection: Option<C::Connection>,
    cursor: Option<CursorOf<C>>,
    closed: bool,
}

impl Session<PgConnector> {
    /// Build a PostgreSQL session. No connection is opened until first use.
    ///
    /// # Errors
    /// Returns `SessionError::ConfigError` if the config fails validation.
    pub fn new(
        config: SessionConfig,
        reporter: Arc<dyn OutcomeReporter>,
    ) -> Result<Self, SessionError> {
        let mut connector = PgConnector::new();
        if let Some(name) = &config.application_name {
            connector = connector.with_application_name(name.clone());
        }
        Self::with_connector(config, connector, reporter)
    }
}

impl<C: Connector> Session<C> {
    /// Build a session over any driver.
    ///
    /// # Errors
    /// Returns `SessionError::ConfigError` if the config fails validation.
    pub fn with_connector(
        config: SessionConfig,
        connector: C,
        reporter: Arc<dyn OutcomeReporter>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let span = tracing::info_span!("pg_session", endpoint = %config.endpoint.label());
        Ok(Self {
            config,
            connector,
            reporter,
            span,
            state: ConnectionState::Disconnected,
            connection: None,
            cursor: None,
            closed: false,
        })
    }

    /// Log every operation of this session inside `span` instead of the default one.
    ///
    /// The span, and whatever subscriber records it, belongs to the caller.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn endpoint(&self) -> &Endpoint {
        &self.config.endpoint
    }

    #[must_use]
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Open the connection and cursor ahead of the first statement.
    ///
    /// Failures are logged rather than returned; the next `execute` will try again.
    /// Returns whether the session ended up connected.
    pub async fn warm_up(&mut self) -> bool {
        let ready = self.cursor().await.map(|_| ());
        match ready {
            Ok(()) => true,
            Err(err) => {
                let _entered = self.span.enter();
                tracing::error!(error = %err, "could not initialize session");
                false
            }
        }
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.closed {
            Err(SessionError::ClosedSession)
        } else {
            Ok(())
        }
    }

    fn report(&self, event: &OutcomeEvent) {
        if let Err(err) = self.reporter.report(event) {
            tracing::warn!(
                name = %event.name,
                error = %err,
                "outcome reporter failed; continuing"
            );
        }
    }

    fn report_connect(&self, elapsed: Duration, attempt: u32, failure: Option<FailureReason>) {
        self.report(&OutcomeEvent {
            kind: EventKind::ConnectAttempt,
            name: CONNECT_EVENT.to_string(),
            elapsed,
            row_count: 0,
            attempt,
            failure,
        });
    }

    fn report_query(
        &self,
        name: &str,
        elapsed: Duration,
        row_count: usize,
        attempt: u32,
        failure: Option<FailureReason>,
    ) {
        self.report(&OutcomeEvent {
            kind: EventKind::QueryAttempt,
            name: name.to_string(),
            elapsed,
            row_count,
            attempt,
            failure,
        });
    }
}

impl<C: Connector> fmt::Debug for Session<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.config.endpoint)
            .field("state", &self.state)
            .field("has_cursor", &self.cursor.is_some())
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
