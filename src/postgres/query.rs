use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value;
use tokio_postgres::Statement;
use tokio_postgres::types::Type;

use crate::error::DriverError;
use crate::results::ResultSet;
use crate::types::RowValues;

use super::classify::classify_error;

/// Build a result set from fetched rows, taking column names from the statement.
///
/// # Errors
/// Returns a permanent `DriverError` if a column has a type this crate cannot represent.
pub fn build_result_set(
    stmt: &Statement,
    rows: &[tokio_postgres::Row],
) -> Result<ResultSet, DriverError> {
    let column_names: Vec<String> = stmt
        .columns()
        .iter()
        .map(|col| col.name().to_string())
        .collect();
    let column_count = column_names.len();

    let mut result_set = ResultSet::with_capacity(rows.len());
    result_set.set_column_names(Arc::new(column_names));

    for row in rows {
        let mut row_values = Vec::with_capacity(column_count);
        for idx in 0..column_count {
            row_values.push(postgres_extract_value(row, idx)?);
        }
        result_set.add_row_values(row_values);
    }

    Ok(result_set)
}

/// `NUMERIC` surfaces as a float; values a float cannot hold keep their exact text.
fn numeric_value(value: Decimal) -> RowValues {
    match value.to_f64() {
        Some(f) if f.is_finite() => RowValues::Float(f),
        _ => RowValues::Text(value.to_string()),
    }
}

/// Extracts a `RowValues` from a `tokio_postgres` Row at the given index.
///
/// # Errors
/// Returns a `DriverError` if the column cannot be decoded.
pub fn postgres_extract_value(
    row: &tokio_postgres::Row,
    idx: usize,
) -> Result<RowValues, DriverError> {
    let ty = row.columns()[idx].type_().clone();
    let value = match ty {
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)
            .map(|v| v.map(|v| RowValues::Int(i64::from(v)))),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)
            .map(|v| v.map(|v| RowValues::Int(i64::from(v)))),
        Type::INT8 => row
            .try_get::<_, Option<i64>>(idx)
            .map(|v| v.map(RowValues::Int)),
        Type::OID => row
            .try_get::<_, Option<u32>>(idx)
            .map(|v| v.map(|v| RowValues::Int(i64::from(v)))),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)
            .map(|v| v.map(|v| RowValues::Float(f64::from(v)))),
        Type::FLOAT8 => row
            .try_get::<_, Option<f64>>(idx)
            .map(|v| v.map(RowValues::Float)),
        Type::NUMERIC => row
            .try_get::<_, Option<Decimal>>(idx)
            .map(|v| v.map(numeric_value)),
        Type::BOOL => row
            .try_get::<_, Option<bool>>(idx)
            .map(|v| v.map(RowValues::Bool)),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)
            .map(|v| v.map(RowValues::Timestamp)),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)
            .map(|v| v.map(|v| RowValues::Timestamp(v.naive_utc()))),
        Type::DATE => row
            .try_get::<_, Option<NaiveDate>>(idx)
            .map(|v| v.map(|d| RowValues::Timestamp(d.and_time(NaiveTime::default())))),
        Type::JSON | Type::JSONB => row
            .try_get::<_, Option<Value>>(idx)
            .map(|v| v.map(RowValues::JSON)),
        Type::BYTEA => row
            .try_get::<_, Option<Vec<u8>>>(idx)
            .map(|v| v.map(RowValues::Blob)),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => row
            .try_get::<_, Option<String>>(idx)
            .map(|v| v.map(RowValues::Text)),
        other => {
            return Err(DriverError::permanent(format!(
                "unsupported type `{other}` for column `{}`",
                row.columns()[idx].name()
            )));
        }
    };
    value
        .map(|v| v.unwrap_or(RowValues::Null))
        .map_err(classify_error)
}
