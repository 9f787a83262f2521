// PostgreSQL driver for the session seam
//
// - connector: opening connections and handing out cursors
// - params: binding RowValues as tokio_postgres parameters
// - query: turning fetched rows into a ResultSet
// - classify: transient vs permanent error classification

pub mod classify;
pub mod connector;
pub mod params;
pub mod query;

pub use classify::{classify_error, classify_sqlstate};
pub use connector::{PgConnection, PgConnector, PgCursor};
pub use params::Params;
pub use query::build_result_set;
