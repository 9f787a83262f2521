//! Helpers for exercising sessions in tests and load runs.
//!
//! - `scripted`: an in-memory driver whose connect and statement results are scripted
//! - `postgres`: an embedded PostgreSQL server (feature `test-utils-postgres`)

use std::sync::Arc;

use crate::results::ResultSet;
use crate::types::RowValues;

pub mod scripted;

#[cfg(feature = "test-utils-postgres")]
pub mod postgres;

pub use scripted::{ExecutedStatement, ScriptedConnection, ScriptedConnector, ScriptedCursor};

/// Build a result set with the given column names and rows.
#[must_use]
pub fn result_set(column_names: &[&str], rows: Vec<Vec<RowValues>>) -> ResultSet {
    let names: Vec<String> = column_names.iter().map(ToString::to_string).collect();
    let mut rs = ResultSet::with_capacity(rows.len());
    rs.set_column_names(Arc::new(names));
    for row in rows {
        rs.add_row_values(row);
    }
    rs
}
