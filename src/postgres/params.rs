use std::error::Error;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use tokio_postgres::types::{IsNull, ToSql, Type, to_sql_checked};
use tokio_util::bytes;

use crate::types::PreparedParameter;

type BoxError = Box<dyn Error + Sync + Send>;

/// Binds a parameter against whatever type the server inferred for its
/// placeholder, coercing where the tag and the column type differ (an `i` value
/// into an `int4` column, an `s` value into a `jsonb` column, ...).
impl ToSql for PreparedParameter {
    fn to_sql(&self, ty: &Type, out: &mut bytes::BytesMut) -> Result<IsNull, BoxError> {
        match self {
            PreparedParameter::Integer(Some(i)) => integer_to_sql(*i, ty, out),
            PreparedParameter::Double(Some(f)) => double_to_sql(*f, ty, out),
            PreparedParameter::String(Some(s)) => string_to_sql(s, ty, out),
            PreparedParameter::Blob(Some(b)) => blob_to_sql(b, ty, out),
            PreparedParameter::Integer(None)
            | PreparedParameter::Double(None)
            | PreparedParameter::String(None)
            | PreparedParameter::Blob(None) => Ok(IsNull::Yes),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // coercion happens per type in to_sql
        true
    }

    to_sql_checked!();
}

fn is_text(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    )
}

fn integer_to_sql(i: i64, ty: &Type, out: &mut bytes::BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT8 => i.to_sql(ty, out),
        Type::INT4 => i32::try_from(i)?.to_sql(ty, out),
        Type::INT2 => i16::try_from(i)?.to_sql(ty, out),
        #[allow(clippy::cast_precision_loss)]
        Type::FLOAT8 => (i as f64).to_sql(ty, out),
        #[allow(clippy::cast_precision_loss)]
        Type::FLOAT4 => (i as f32).to_sql(ty, out),
        Type::BOOL => (i != 0).to_sql(ty, out),
        ref t if is_text(t) => i.to_string().to_sql(ty, out),
        _ => Err(format!("cannot bind an integer parameter to a {ty} column").into()),
    }
}

fn double_to_sql(f: f64, ty: &Type, out: &mut bytes::BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::FLOAT8 => f.to_sql(ty, out),
        #[allow(clippy::cast_possible_truncation)]
        Type::FLOAT4 => (f as f32).to_sql(ty, out),
        Type::INT2 | Type::INT4 | Type::INT8 if f.fract() == 0.0 && f.is_finite() => {
            #[allow(clippy::cast_possible_truncation)]
            let whole = f as i64;
            integer_to_sql(whole, ty, out)
        }
        ref t if is_text(t) => f.to_string().to_sql(ty, out),
        _ => Err(format!("cannot bind a double parameter to a {ty} column").into()),
    }
}

fn string_to_sql(s: &str, ty: &Type, out: &mut bytes::BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 | Type::INT4 | Type::INT8 => integer_to_sql(s.trim().parse()?, ty, out),
        Type::FLOAT4 | Type::FLOAT8 => double_to_sql(s.trim().parse()?, ty, out),
        Type::BOOL => parse_bool(s)?.to_sql(ty, out),
        Type::JSON | Type::JSONB => serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out),
        Type::TIMESTAMP => parse_timestamp(s)?.to_sql(ty, out),
        Type::TIMESTAMPTZ => parse_timestamp(s)?.and_utc().to_sql(ty, out),
        Type::DATE => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")?.to_sql(ty, out),
        Type::BYTEA => s.as_bytes().to_sql(ty, out),
        _ => s.to_sql(ty, out),
    }
}

fn blob_to_sql(b: &[u8], ty: &Type, out: &mut bytes::BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::BYTEA => b.to_sql(ty, out),
        ref t if is_text(t) => std::str::from_utf8(b)?.to_sql(ty, out),
        _ => Err(format!("cannot bind a blob parameter to a {ty} column").into()),
    }
}

fn parse_bool(s: &str) -> Result<bool, BoxError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "t" | "true" | "1" | "y" | "yes" | "on" => Ok(true),
        "f" | "false" | "0" | "n" | "no" | "off" => Ok(false),
        other => Err(format!("'{other}' is not a boolean").into()),
    }
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime, BoxError> {
    let s = s.trim();
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt);
        }
    }
    Ok(DateTime::parse_from_rfc3339(s)?.naive_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(param: &PreparedParameter, ty: &Type) -> Result<Vec<u8>, BoxError> {
        let mut out = bytes::BytesMut::new();
        param.to_sql(ty, &mut out)?;
        Ok(out.to_vec())
    }

    #[test]
    fn integer_narrows_to_column_width() {
        assert_eq!(
            encode(&PreparedParameter::integer(7), &Type::INT4).unwrap(),
            7_i32.to_be_bytes().to_vec()
        );
        assert!(encode(&PreparedParameter::integer(i64::MAX), &Type::INT2).is_err());
    }

    #[test]
    fn string_parses_into_typed_columns() {
        assert_eq!(
            encode(&PreparedParameter::string("12"), &Type::INT8).unwrap(),
            12_i64.to_be_bytes().to_vec()
        );
        assert!(encode(&PreparedParameter::string("2024-01-02 03:04:05"), &Type::TIMESTAMP).is_ok());
        assert!(encode(&PreparedParameter::string("{\"a\":1}"), &Type::JSONB).is_ok());
        assert!(encode(&PreparedParameter::string("maybe"), &Type::BOOL).is_err());
    }

    #[test]
    fn null_is_null_for_any_type() {
        let mut out = bytes::BytesMut::new();
        let res = PreparedParameter::Blob(None).to_sql(&Type::INT4, &mut out).unwrap();
        assert!(matches!(res, IsNull::Yes));
    }
}
