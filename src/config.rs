use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::retry::RetryPolicy;
use crate::translation::PlaceholderStyle;
use crate::types::ErrorMode;

/// Upper bound for `connect_timeout_secs`; connecting must never block indefinitely.
pub const MAX_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Where the session connects. Immutable once the session is built.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl Endpoint {
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            user: user.into(),
            password: password.into(),
        }
    }

    /// `host:port/database`, used in log lines and error messages.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: String::new(),
            user: String::new(),
            password: String::new(),
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Construction parameters for a [`Session`](crate::Session).
///
/// Sourcing these from the environment or a file is the caller's job; the struct
/// deserializes from any serde format:
/// ```rust
/// use pg_session::prelude::*;
///
/// let cfg = SessionConfig::from_json(
///     r#"{"host":"db","port":5432,"database":"app",
///         "user":"svc","password":"pw","retry_limit":5}"#,
/// )?;
/// assert_eq!(cfg.retry_limit, 5);
/// assert!(cfg.reconnect_enabled);
/// # Ok::<(), SessionError>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    #[serde(flatten)]
    pub endpoint: Endpoint,
    /// When false, connection failures are fatal on the first attempt.
    pub reconnect_enabled: bool,
    pub connect_timeout_secs: u64,
    /// Retries after the initial attempt, for both connecting and statements.
    pub retry_limit: u32,
    /// Fixed delay between a failed attempt and its retry.
    pub retry_backoff_secs: u64,
    pub statement_timeout_secs: Option<u64>,
    pub error_mode: ErrorMode,
    pub placeholder_style: PlaceholderStyle,
    pub application_name: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            reconnect_enabled: true,
            connect_timeout_secs: 3,
            retry_limit: 3,
            retry_backoff_secs: 1,
            statement_timeout_secs: None,
            error_mode: ErrorMode::Outcome,
            placeholder_style: PlaceholderStyle::Format,
            application_name: None,
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            ..Self::default()
        }
    }

    /// Parse a JSON document into a config, then validate it.
    ///
    /// # Errors
    /// Returns `SessionError::ConfigError` if the document is malformed or fails validation.
    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        let cfg: SessionConfig = serde_json::from_str(json)
            .map_err(|e| SessionError::ConfigError(format!("invalid session config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    #[must_use]
    pub fn with_reconnect(mut self, enabled: bool) -> Self {
        self.reconnect_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    #[must_use]
    pub fn with_retry_backoff_secs(mut self, secs: u64) -> Self {
        self.retry_backoff_secs = secs;
        self
    }

    #[must_use]
    pub fn with_connect_timeout_secs(mut self, secs: u64) -> Self {
        self.connect_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn with_statement_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.statement_timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn with_error_mode(mut self, mode: ErrorMode) -> Self {
        self.error_mode = mode;
        self
    }

    #[must_use]
    pub fn with_placeholder_style(mut self, style: PlaceholderStyle) -> Self {
        self.placeholder_style = style;
        self
    }

    #[must_use]
    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Check that every required field is present and every bound is sane.
    ///
    /// # Errors
    /// Returns `SessionError::ConfigError` naming the first offending field.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.endpoint.host.trim().is_empty() {
            return Err(SessionError::ConfigError("host is required".to_string()));
        }
        if self.endpoint.port == 0 {
            return Err(SessionError::ConfigError("port is required".to_string()));
        }
        if self.endpoint.database.trim().is_empty() {
            return Err(SessionError::ConfigError(
                "database is required".to_string(),
            ));
        }
        if self.endpoint.user.trim().is_empty() {
            return Err(SessionError::ConfigError("user is required".to_string()));
        }
        if self.connect_timeout_secs == 0 || self.connect_timeout_secs > MAX_CONNECT_TIMEOUT_SECS {
            return Err(SessionError::ConfigError(format!(
                "connect_timeout_secs must be between 1 and {MAX_CONNECT_TIMEOUT_SECS}, got {}",
                self.connect_timeout_secs
            )));
        }
        if self.statement_timeout_secs == Some(0) {
            return Err(SessionError::ConfigError(
                "statement_timeout_secs must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_secs.map(Duration::from_secs)
    }

    /// Retry policy for establishing the connection.
    ///
    /// Collapses to a single attempt when reconnecting is disabled.
    #[must_use]
    pub fn connect_retry_policy(&self) -> RetryPolicy {
        if self.reconnect_enabled {
            self.statement_retry_policy()
        } else {
            RetryPolicy::no_retry()
        }
    }

    /// Retry policy for statements that fail transiently.
    #[must_use]
    pub fn statement_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry_limit,
            Duration::from_secs(self.retry_backoff_secs),
        )
    }
}
