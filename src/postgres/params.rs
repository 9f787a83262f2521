use std::error::Error;

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use tokio_util::bytes;

use crate::types::RowValues;

/// Borrowed view of bound parameters in the shape `tokio_postgres` expects.
pub struct Params<'a> {
    references: Vec<&'a (dyn ToSql + Sync)>,
}

impl<'a> Params<'a> {
    #[must_use]
    pub fn convert(params: &'a [RowValues]) -> Params<'a> {
        let mut references = Vec::with_capacity(params.len());
        for p in params {
            references.push(p as &(dyn ToSql + Sync));
        }
        Params { references }
    }

    /// Get a reference to the underlying parameter array
    #[must_use]
    pub fn as_refs(&self) -> &[&(dyn ToSql + Sync)] {
        &self.references
    }
}

impl ToSql for RowValues {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            // narrow to the width the server inferred for the placeholder
            RowValues::Int(i) => match *ty {
                Type::INT2 => bind(&i16::try_from(*i)?, ty, out),
                Type::INT4 => bind(&i32::try_from(*i)?, ty, out),
                #[allow(clippy::cast_precision_loss)]
                Type::FLOAT4 => bind(&(*i as f32), ty, out),
                #[allow(clippy::cast_precision_loss)]
                Type::FLOAT8 => bind(&(*i as f64), ty, out),
                Type::NUMERIC => bind(&Decimal::from(*i), ty, out),
                _ => bind(i, ty, out),
            },
            RowValues::Float(f) => match *ty {
                #[allow(clippy::cast_possible_truncation)]
                Type::FLOAT4 => bind(&(*f as f32), ty, out),
                Type::NUMERIC => bind(&Decimal::try_from(*f)?, ty, out),
                _ => bind(f, ty, out),
            },
            RowValues::Text(s) => match *ty {
                Type::NUMERIC => bind(&s.trim().parse::<Decimal>()?, ty, out),
                _ => bind(s, ty, out),
            },
            RowValues::Bool(b) => bind(b, ty, out),
            RowValues::Timestamp(dt) => match *ty {
                Type::TIMESTAMPTZ => bind(&Utc.from_utc_datetime(dt), ty, out),
                Type::DATE => bind(&dt.date(), ty, out),
                _ => bind(dt, ty, out),
            },
            RowValues::Null => Ok(IsNull::Yes),
            RowValues::JSON(jsval) => bind(jsval, ty, out),
            RowValues::Blob(bytes) => bind(bytes, ty, out),
        }
    }

    fn accepts(ty: &Type) -> bool {
        matches!(
            *ty,
            Type::INT2
                | Type::INT4
                | Type::INT8
                | Type::FLOAT4
                | Type::FLOAT8
                | Type::NUMERIC
                | Type::TEXT
                | Type::VARCHAR
                | Type::BPCHAR
                | Type::NAME
                | Type::UNKNOWN
                | Type::BOOL
                | Type::TIMESTAMP
                | Type::TIMESTAMPTZ
                | Type::DATE
                | Type::JSON
                | Type::JSONB
                | Type::BYTEA
        )
    }

    to_sql_checked!();
}

/// Serialize `value` only if its Rust type can represent the placeholder's type.
fn bind<T: ToSql>(
    value: &T,
    ty: &Type,
    out: &mut bytes::BytesMut,
) -> Result<IsNull, Box<dyn Error + Sync + Send>> {
    if !T::accepts(ty) {
        return Err(format!(
            "cannot bind a {} value to a parameter of type {ty}",
            std::any::type_name::<T>()
        )
        .into());
    }
    value.to_sql(ty, out)
}

#[cfg(test)]
mod tests {
    use tokio_postgres::types::{FromSql, ToSql, Type};
    use tokio_util::bytes::BytesMut;

    use super::*;

    fn encode(value: &RowValues, ty: &Type) -> Result<BytesMut, Box<dyn Error + Sync + Send>> {
        let mut out = BytesMut::new();
        value.to_sql_checked(ty, &mut out)?;
        Ok(out)
    }

    fn numeric(value: &RowValues) -> Decimal {
        let out = encode(value, &Type::NUMERIC).expect("numeric encodes");
        Decimal::from_sql(&Type::NUMERIC, &out).expect("numeric decodes")
    }

    #[test]
    fn numbers_bind_to_numeric_columns() {
        assert_eq!(numeric(&RowValues::Int(50)), Decimal::from(50));
        assert_eq!(numeric(&RowValues::Float(12.5)), Decimal::new(125, 1));
        assert_eq!(
            numeric(&RowValues::Text("199.99".to_string())),
            Decimal::new(19999, 2)
        );
    }

    #[test]
    fn unrepresentable_values_are_rejected_for_numeric() {
        assert!(encode(&RowValues::Float(f64::NAN), &Type::NUMERIC).is_err());
        let garbage = RowValues::Text("abc".to_string());
        assert!(encode(&garbage, &Type::NUMERIC).is_err());
    }

    #[test]
    fn integers_narrow_to_placeholder_width() {
        assert!(encode(&RowValues::Int(7), &Type::INT2).is_ok());
        let too_wide = RowValues::Int(i64::from(i16::MAX) + 1);
        assert!(encode(&too_wide, &Type::INT2).is_err());
        assert!(encode(&RowValues::Bool(true), &Type::INT4).is_err());
    }
}
