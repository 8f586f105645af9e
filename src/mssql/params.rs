use tiberius::Query;

use crate::types::PreparedParameter;

/// Bind parameters onto the query in order. NULLs keep their declared type.
pub fn bind_query_params<'a>(query: &mut Query<'a>, params: &[PreparedParameter]) {
    for param in params {
        match param {
            PreparedParameter::Integer(i) => query.bind(*i),
            PreparedParameter::Double(f) => query.bind(*f),
            PreparedParameter::String(s) => query.bind(s.clone()),
            PreparedParameter::Blob(b) => query.bind(b.clone()),
        }
    }
}
