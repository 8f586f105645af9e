use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::DbManagerError;

/// Values that can be read back from a database row.
///
/// Every backend decodes its native column types into this one enum so fetch shapes
/// and callers never branch on driver types:
/// ```rust
/// use db_manager::prelude::*;
///
/// let cells = vec![RowValues::Int(1), RowValues::Text("alice".into()), RowValues::Null];
/// assert!(cells[2].is_null());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum RowValues {
    /// Integer value (64-bit)
    Int(i64),
    /// Floating point value (64-bit)
    Float(f64),
    /// Text/string value
    Text(String),
    /// Boolean value
    Bool(bool),
    /// Timestamp value
    Timestamp(NaiveDateTime),
    /// NULL value
    Null,
    /// JSON value
    JSON(JsonValue),
    /// Binary data
    Blob(Vec<u8>),
}

impl RowValues {
    /// Check if this value is NULL
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_int(&self) -> Option<&i64> {
        if let RowValues::Int(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        if let RowValues::Text(value) = self {
            Some(value)
        } else {
            None
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            RowValues::Float(value) => Some(*value),
            #[allow(clippy::cast_precision_loss)]
            RowValues::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            RowValues::Bool(value) => Some(*value),
            RowValues::Int(1) => Some(true),
            RowValues::Int(0) => Some(false),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        if let RowValues::Timestamp(value) = self {
            return Some(*value);
        } else if let Some(s) = self.as_text() {
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
                return Some(dt);
            }
            if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
                return Some(dt);
            }
        }
        None
    }

    #[must_use]
    pub fn as_blob(&self) -> Option<&[u8]> {
        if let RowValues::Blob(bytes) = self {
            Some(bytes)
        } else {
            None
        }
    }
}

impl fmt::Display for RowValues {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowValues::Int(i) => write!(f, "{i}"),
            RowValues::Float(v) => write!(f, "{v}"),
            RowValues::Text(s) => f.write_str(s),
            RowValues::Bool(b) => write!(f, "{}", u8::from(*b)),
            RowValues::Timestamp(dt) => write!(f, "{}", dt.format("%F %T%.f")),
            RowValues::Null => Ok(()),
            RowValues::JSON(v) => write!(f, "{v}"),
            RowValues::Blob(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
        }
    }
}

/// Binding type of a positional parameter, written as the one-letter tag
/// `i`, `d`, `s` or `b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamType {
    Integer,
    Double,
    String,
    Blob,
}

impl ParamType {
    #[must_use]
    pub fn tag(self) -> char {
        match self {
            ParamType::Integer => 'i',
            ParamType::Double => 'd',
            ParamType::String => 's',
            ParamType::Blob => 'b',
        }
    }

    /// Parse a binding tag.
    ///
    /// # Errors
    /// Returns `DbManagerError::ParameterError` for anything other than `i`, `d`, `s`, `b`.
    pub fn from_tag(tag: char) -> Result<Self, DbManagerError> {
        match tag {
            'i' => Ok(ParamType::Integer),
            'd' => Ok(ParamType::Double),
            's' => Ok(ParamType::String),
            'b' => Ok(ParamType::Blob),
            other => Err(DbManagerError::ParameterError(format!(
                "unknown parameter type tag '{other}' (expected one of i, d, s, b)"
            ))),
        }
    }
}

/// A typed positional parameter. The variant is the type tag; `None` binds NULL.
///
/// Parameters bind strictly in slice order:
/// ```rust
/// use db_manager::prelude::*;
///
/// let params = [
///     PreparedParameter::string("inactive"),
///     PreparedParameter::integer(1),
/// ];
/// assert_eq!(params[1].tag(), 'i');
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum PreparedParameter {
    Integer(Option<i64>),
    Double(Option<f64>),
    String(Option<String>),
    Blob(Option<Vec<u8>>),
}

impl PreparedParameter {
    #[must_use]
    pub fn integer(value: i64) -> Self {
        PreparedParameter::Integer(Some(value))
    }

    #[must_use]
    pub fn double(value: f64) -> Self {
        PreparedParameter::Double(Some(value))
    }

    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        PreparedParameter::String(Some(value.into()))
    }

    #[must_use]
    pub fn blob(value: impl Into<Vec<u8>>) -> Self {
        PreparedParameter::Blob(Some(value.into()))
    }

    #[must_use]
    pub fn null(ty: ParamType) -> Self {
        match ty {
            ParamType::Integer => PreparedParameter::Integer(None),
            ParamType::Double => PreparedParameter::Double(None),
            ParamType::String => PreparedParameter::String(None),
            ParamType::Blob => PreparedParameter::Blob(None),
        }
    }

    /// Build a parameter from a type tag and an untyped value, coercing the value the
    /// way the tag demands (`i` truncates doubles and parses text, `s` stringifies, ...).
    ///
    /// # Errors
    /// Returns `DbManagerError::ParameterError` for an unknown tag or a value the tag
    /// cannot represent.
    pub fn tagged(tag: char, value: RowValues) -> Result<Self, DbManagerError> {
        let ty = ParamType::from_tag(tag)?;
        if value.is_null() {
            return Ok(Self::null(ty));
        }
        let mismatch = |value: &RowValues| {
            DbManagerError::ParameterError(format!(
                "value {value:?} cannot be bound with type tag '{tag}'"
            ))
        };
        let param = match ty {
            ParamType::Integer => match value {
                RowValues::Int(i) => Self::integer(i),
                RowValues::Bool(b) => Self::integer(i64::from(b)),
                #[allow(clippy::cast_possible_truncation)]
                RowValues::Float(f) if f.is_finite() => Self::integer(f.trunc() as i64),
                RowValues::Text(ref s) => {
                    Self::integer(s.trim().parse::<i64>().map_err(|_| mismatch(&value))?)
                }
                other => return Err(mismatch(&other)),
            },
            ParamType::Double => match value {
                RowValues::Float(f) => Self::double(f),
                #[allow(clippy::cast_precision_loss)]
                RowValues::Int(i) => Self::double(i as f64),
                RowValues::Text(ref s) => {
                    Self::double(s.trim().parse::<f64>().map_err(|_| mismatch(&value))?)
                }
                other => return Err(mismatch(&other)),
            },
            ParamType::String => match value {
                RowValues::Text(s) => Self::string(s),
                RowValues::Blob(bytes) => {
                    Self::string(String::from_utf8(bytes).map_err(|e| {
                        DbManagerError::ParameterError(format!("blob is not valid UTF-8: {e}"))
                    })?)
                }
                other => Self::string(other.to_string()),
            },
            ParamType::Blob => match value {
                RowValues::Blob(bytes) => Self::blob(bytes),
                RowValues::Text(s) => Self::blob(s.into_bytes()),
                other => return Err(mismatch(&other)),
            },
        };
        Ok(param)
    }

    #[must_use]
    pub fn param_type(&self) -> ParamType {
        match self {
            PreparedParameter::Integer(_) => ParamType::Integer,
            PreparedParameter::Double(_) => ParamType::Double,
            PreparedParameter::String(_) => ParamType::String,
            PreparedParameter::Blob(_) => ParamType::Blob,
        }
    }

    #[must_use]
    pub fn tag(&self) -> char {
        self.param_type().tag()
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(
            self,
            PreparedParameter::Integer(None)
                | PreparedParameter::Double(None)
                | PreparedParameter::String(None)
                | PreparedParameter::Blob(None)
        )
    }
}

/// The database engine a connection is made with.
///
/// Every variant exists regardless of enabled features; selecting one whose cargo
/// feature is off fails at configuration time.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    /// `SQLite` through `rusqlite`
    Sqlite,
    /// `PostgreSQL` through `tokio-postgres`
    #[default]
    #[value(alias = "postgresql", alias = "pgsql")]
    Postgres,
    /// SQL Server through `tiberius`
    #[value(alias = "sqlserver")]
    Mssql,
}

impl Engine {
    /// Port used when the options leave it unset.
    #[must_use]
    pub fn default_port(self) -> Option<u16> {
        match self {
            Engine::Sqlite => None,
            Engine::Postgres => Some(5432),
            Engine::Mssql => Some(1433),
        }
    }
}

impl FromStr for Engine {
    type Err = DbManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Engine as ValueEnum>::from_str(s.trim(), true)
            .map_err(|_| DbManagerError::ConfigError(format!("unknown database engine '{s}'")))
    }
}

/// Shape a fetched row is returned in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchShape {
    /// Column name to value mapping (`assoc`)
    #[default]
    Assoc,
    /// Positional values (`array`, legacy alias `row`)
    Indexed,
    /// Row object with named and positional accessors (`object`)
    Object,
}

impl FromStr for FetchShape {
    type Err = DbManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "assoc" => Ok(FetchShape::Assoc),
            "array" | "row" | "num" => Ok(FetchShape::Indexed),
            "object" | "obj" => Ok(FetchShape::Object),
            other => Err(DbManagerError::CursorError(format!(
                "unknown fetch shape '{other}'"
            ))),
        }
    }
}

/// Result metadata a cursor can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetadataKind {
    RowCount,
    FieldCount,
    AffectedRows,
}

impl FromStr for MetadataKind {
    type Err = DbManagerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "row_count" | "num_rows" => Ok(MetadataKind::RowCount),
            "field_count" | "num_fields" => Ok(MetadataKind::FieldCount),
            "affected_rows" | "num_rows_affected" => Ok(MetadataKind::AffectedRows),
            other => Err(DbManagerError::CursorError(format!(
                "unknown metadata kind '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_coerces_by_tag() {
        assert_eq!(
            PreparedParameter::tagged('i', RowValues::Text(" 42 ".into())).unwrap(),
            PreparedParameter::integer(42)
        );
        assert_eq!(
            PreparedParameter::tagged('i', RowValues::Float(3.9)).unwrap(),
            PreparedParameter::integer(3)
        );
        assert_eq!(
            PreparedParameter::tagged('d', RowValues::Int(2)).unwrap(),
            PreparedParameter::double(2.0)
        );
        assert_eq!(
            PreparedParameter::tagged('s', RowValues::Int(7)).unwrap(),
            PreparedParameter::string("7")
        );
        assert_eq!(
            PreparedParameter::tagged('b', RowValues::Text("ab".into())).unwrap(),
            PreparedParameter::blob(b"ab".to_vec())
        );
    }

    #[test]
    fn tagged_null_keeps_type() {
        let p = PreparedParameter::tagged('d', RowValues::Null).unwrap();
        assert!(p.is_null());
        assert_eq!(p.param_type(), ParamType::Double);
    }

    #[test]
    fn tagged_rejects_bad_input() {
        assert!(PreparedParameter::tagged('x', RowValues::Int(1)).is_err());
        assert!(PreparedParameter::tagged('i', RowValues::Text("abc".into())).is_err());
        assert!(PreparedParameter::tagged('b', RowValues::Int(1)).is_err());
    }

    #[test]
    fn engine_parses_aliases() {
        assert_eq!("PostgreSQL".parse::<Engine>().unwrap(), Engine::Postgres);
        assert_eq!("sqlserver".parse::<Engine>().unwrap(), Engine::Mssql);
        assert_eq!("sqlite".parse::<Engine>().unwrap(), Engine::Sqlite);
        assert!("oracle".parse::<Engine>().is_err());
    }

    #[test]
    fn legacy_fetch_strings() {
        assert_eq!("row".parse::<FetchShape>().unwrap(), FetchShape::Indexed);
        assert_eq!("array".parse::<FetchShape>().unwrap(), FetchShape::Indexed);
        assert_eq!("assoc".parse::<FetchShape>().unwrap(), FetchShape::Assoc);
        assert_eq!(
            "num_rows_affected".parse::<MetadataKind>().unwrap(),
            MetadataKind::AffectedRows
        );
    }
}
