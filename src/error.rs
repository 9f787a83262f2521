use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Whether a driver failure is worth recovering from by reconnecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorClass {
    /// Network/operational failure; the connection is presumed broken.
    Transient,
    /// Malformed statement, constraint violation, auth failure, driver misuse.
    Permanent,
}

/// A failure reported by the wire driver, already classified.
///
/// Cheap to clone so scripted drivers can replay the same failure many times.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct DriverError {
    class: ErrorClass,
    message: String,
    code: Option<String>,
    #[source]
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl DriverError {
    #[must_use]
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
            code: None,
            source: None,
        }
    }

    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Transient, message)
    }

    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Permanent, message)
    }

    /// Attach the SQLSTATE reported by the server.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    #[must_use]
    pub fn class(&self) -> ErrorClass {
        self.class
    }

    #[must_use]
    pub fn is_transient(&self) -> bool {
        self.class == ErrorClass::Transient
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// SQLSTATE code, when the server supplied one.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

/// Tag carried by failed outcomes and events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// A failed attempt that is about to be retried after reconnecting.
    Transient,
    /// The connection could not be established within the retry budget.
    ConnectFailed,
    /// Statement retries ran out after repeated transient failures.
    ConnectionExhausted,
    /// Non-transient statement failure; never retried.
    QueryFailed,
    /// The session was closed before the operation was attempted.
    ClosedSession,
    /// Construction parameters were rejected.
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::Transient => "Transient",
            ErrorKind::ConnectFailed => "ConnectFailed",
            ErrorKind::ConnectionExhausted => "ConnectionExhausted",
            ErrorKind::QueryFailed => "QueryFailed",
            ErrorKind::ClosedSession => "ClosedSession",
            ErrorKind::Config => "ConfigError",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection to {endpoint} failed after {attempts} attempt(s): {source}")]
    ConnectFailed {
        endpoint: String,
        attempts: u32,
        #[source]
        source: DriverError,
    },

    #[error("statement retries exhausted after {attempts} attempt(s): {source}")]
    ConnectionExhausted {
        attempts: u32,
        #[source]
        source: DriverError,
    },

    #[error("query failed: {source}")]
    QueryFailed {
        #[source]
        source: DriverError,
    },

    #[error("session is closed")]
    ClosedSession,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl SessionError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::ConnectFailed { .. } => ErrorKind::ConnectFailed,
            SessionError::ConnectionExhausted { .. } => ErrorKind::ConnectionExhausted,
            SessionError::QueryFailed { .. } => ErrorKind::QueryFailed,
            SessionError::ClosedSession => ErrorKind::ClosedSession,
            SessionError::ConfigError(_) => ErrorKind::Config,
        }
    }

    /// The underlying driver failure, if there was one.
    #[must_use]
    pub fn driver_error(&self) -> Option<&DriverError> {
        match self {
            SessionError::ConnectFailed { source, .. }
            | SessionError::ConnectionExhausted { source, .. }
            | SessionError::QueryFailed { source } => Some(source),
            SessionError::ClosedSession | SessionError::ConfigError(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_error_keeps_class_and_code() {
        let err = DriverError::permanent("column \"nope\" does not exist").with_code("42703");
        assert_eq!(err.class(), ErrorClass::Permanent);
        assert!(!err.is_transient());
        assert_eq!(err.code(), Some("42703"));
        assert_eq!(err.to_string(), "column \"nope\" does not exist");
    }

    #[test]
    fn session_error_kinds() {
        let err = SessionError::ConnectionExhausted {
            attempts: 4,
            source: DriverError::transient("server closed the connection"),
        };
        assert_eq!(err.kind(), ErrorKind::ConnectionExhausted);
        assert!(err.driver_error().is_some_and(DriverError::is_transient));
        assert_eq!(SessionError::ClosedSession.kind(), ErrorKind::ClosedSession);
        assert_eq!(ErrorKind::QueryFailed.to_string(), "QueryFailed");
    }
}
