use tokio_postgres::error::SqlState;

use crate::error::{DriverError, ErrorClass};

/// SQLSTATE classes that mean "the connection or server is unhealthy, try again":
/// connection exception, transaction rollback, insufficient resources, operator
/// intervention and system error.
const TRANSIENT_SQLSTATE_CLASSES: [&str; 5] = ["08", "40", "53", "57", "58"];

/// Client-side failures without a SQLSTATE that still point at a broken connection.
const TRANSIENT_MESSAGE_PREFIXES: [&str; 6] = [
    "connection closed",
    "error communicating with the server",
    "error connecting to server",
    "timeout waiting for server",
    "unexpected message from server",
    "error parsing response from server",
];

/// Classify a SQLSTATE code.
#[must_use]
pub fn classify_sqlstate(code: &str) -> ErrorClass {
    if TRANSIENT_SQLSTATE_CLASSES
        .iter()
        .any(|class| code.starts_with(class))
    {
        ErrorClass::Transient
    } else {
        ErrorClass::Permanent
    }
}

/// Convert a `tokio_postgres` error into a classified `DriverError`.
///
/// Server errors are classified by SQLSTATE. Client-side errors are transient when they
/// come from I/O or a dead connection, permanent otherwise (bad parameters, undecodable
/// columns, authentication).
#[must_use]
pub fn classify_error(err: tokio_postgres::Error) -> DriverError {
    if let Some(db) = err.as_db_error() {
        let code = db.code().code().to_string();
        let message = format!("{}: {}", db.severity(), db.message());
        return DriverError::new(classify_sqlstate(&code), message)
            .with_code(code)
            .with_source(err);
    }

    let message = err.to_string();
    let io_failure = std::error::Error::source(&err)
        .is_some_and(|source| source.downcast_ref::<std::io::Error>().is_some());
    let class = if err.is_closed()
        || io_failure
        || TRANSIENT_MESSAGE_PREFIXES
            .iter()
            .any(|prefix| message.starts_with(prefix))
    {
        ErrorClass::Transient
    } else {
        ErrorClass::Permanent
    };

    let mut driver_error = DriverError::new(class, message);
    if let Some(code) = err.code().map(SqlState::code) {
        driver_error = driver_error.with_code(code);
    }
    driver_error.with_source(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqlstate_classes() {
        assert_eq!(classify_sqlstate("08006"), ErrorClass::Transient);
        assert_eq!(classify_sqlstate("57P01"), ErrorClass::Transient);
        assert_eq!(classify_sqlstate("53300"), ErrorClass::Transient);
        assert_eq!(classify_sqlstate("40001"), ErrorClass::Transient);
        assert_eq!(classify_sqlstate("42703"), ErrorClass::Permanent);
        assert_eq!(classify_sqlstate("42601"), ErrorClass::Permanent);
        assert_eq!(classify_sqlstate("23505"), ErrorClass::Permanent);
        assert_eq!(classify_sqlstate("28P01"), ErrorClass::Permanent);
        assert_eq!(classify_sqlstate("3D000"), ErrorClass::Permanent);
    }
}
