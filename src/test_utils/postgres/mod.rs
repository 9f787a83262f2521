/// Embedded `PostgreSQL` server for integration tests
pub mod embedded;

pub use embedded::*;
