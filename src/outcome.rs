use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, SessionError};
use crate::results::{CustomDbRow, ResultSet};

/// Why an operation failed: an error-kind tag plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    pub kind: ErrorKind,
    pub message: String,
}

impl FailureReason {
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl From<&SessionError> for FailureReason {
    fn from(err: &SessionError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Result of one `execute` call.
///
/// `elapsed` covers only the attempt that produced this result; time spent on earlier
/// failed attempts and on backoff is visible through the reported events instead.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub succeeded: bool,
    pub elapsed: Duration,
    /// Rows returned for reads, rows affected for writes, 0 for DDL.
    pub row_count: usize,
    /// Empty unless the statement returned a result set.
    pub rows: ResultSet,
    pub failure: Option<FailureReason>,
}

impl QueryOutcome {
    #[must_use]
    pub fn success(elapsed: Duration, row_count: usize, rows: ResultSet) -> Self {
        Self {
            succeeded: true,
            elapsed,
            row_count,
            rows,
            failure: None,
        }
    }

    #[must_use]
    pub fn failure(elapsed: Duration, reason: FailureReason) -> Self {
        Self {
            succeeded: false,
            elapsed,
            row_count: 0,
            rows: ResultSet::default(),
            failure: Some(reason),
        }
    }

    #[must_use]
    pub fn elapsed_millis(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }

    #[must_use]
    pub fn failure_kind(&self) -> Option<ErrorKind> {
        self.failure.as_ref().map(|f| f.kind)
    }

    #[must_use]
    pub fn rows(&self) -> &[CustomDbRow] {
        &self.rows.results
    }
}

impl fmt::Display for QueryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.failure {
            None => write!(
                f,
                "success: true, rows: {}, elapsed: {:.2}ms",
                self.row_count,
                self.elapsed_millis()
            ),
            Some(reason) => write!(f, "success: false, failure: {reason}"),
        }
    }
}
