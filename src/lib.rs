//! Resilient single-connection PostgreSQL sessions.
//!
//! A [`Session`] owns one connection, runs statements serially with out-of-band
//! parameters, recovers from transient failures with a bounded fixed-backoff retry, and
//! reports every connect and statement attempt to an [`OutcomeReporter`].

pub mod config;
pub mod driver;
pub mod error;
pub mod outcome;
pub mod postgres;
pub mod prelude;
pub mod reporter;
pub mod results;
pub mod retry;
pub mod session;
pub mod translation;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{Endpoint, SessionConfig};
pub use driver::{Connector, DriverConnection, DriverCursor, StatementOutput};
pub use error::{DriverError, ErrorClass, ErrorKind, SessionError};
pub use outcome::{FailureReason, QueryOutcome};
pub use postgres::{PgConnector, build_result_set as postgres_build_result_set};
pub use reporter::{
    CONNECT_EVENT, EventKind, EventStats, FanoutReporter, MemoryReporter, NoopReporter,
    OutcomeEvent, OutcomeReporter, TracingReporter,
};
pub use results::{CustomDbRow, ResultSet};
pub use retry::{RetryPolicy, RetryState};
pub use session::{ConnectionState, Session};
pub use translation::{PlaceholderStyle, statement_verb, translate_placeholders};
pub use types::{ErrorMode, RowValues};
