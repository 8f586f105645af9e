use rusqlite::types::Value;

use crate::types::PreparedParameter;

/// Convert a typed parameter into a rusqlite `Value`. A `None` binds NULL.
#[must_use]
pub fn prepared_to_sqlite_value(param: &PreparedParameter) -> Value {
    match param {
        PreparedParameter::Integer(Some(i)) => Value::Integer(*i),
        PreparedParameter::Double(Some(f)) => Value::Real(*f),
        PreparedParameter::String(Some(s)) => Value::Text(s.clone()),
        PreparedParameter::Blob(Some(bytes)) => Value::Blob(bytes.clone()),
        PreparedParameter::Integer(None)
        | PreparedParameter::Double(None)
        | PreparedParameter::String(None)
        | PreparedParameter::Blob(None) => Value::Null,
    }
}

/// Unified `SQLite` parameter container, in binding order.
pub struct Params(pub Vec<Value>);

impl Params {
    #[must_use]
    pub fn convert(params: &[PreparedParameter]) -> Self {
        Params(params.iter().map(prepared_to_sqlite_value).collect())
    }

    #[must_use]
    pub fn as_values(&self) -> &[Value] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ParamType;

    #[test]
    fn converts_in_order_with_nulls() {
        let params = Params::convert(&[
            PreparedParameter::integer(1),
            PreparedParameter::null(ParamType::String),
            PreparedParameter::blob(vec![0_u8, 1]),
        ]);
        assert_eq!(
            params.as_values(),
            &[Value::Integer(1), Value::Null, Value::Blob(vec![0, 1])]
        );
    }
}
