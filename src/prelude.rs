//! Convenient imports for common functionality.
//!
//! This module re-exports the types needed to connect, run statements, read
//! results and manage transactions.

pub use crate::adapter::{Capabilities, Driver, NativeAdapter, TransactionNesting};
pub use crate::config::{ConnectionOptions, ConnectionOptionsBuilder};
pub use crate::connection::{Connection, ConnectionInfo};
pub use crate::diagnostics::Diagnostics;
pub use crate::error::{DbManagerError, ErrorKind, ErrorReport};
pub use crate::manager::ConnectionManager;
pub use crate::placeholders::PlaceholderStyle;
pub use crate::policy::ErrorMode;
pub use crate::results::{FetchedRow, FieldInfo, ObjectRow, ResultCursor};
pub use crate::transaction::TransactionState;
pub use crate::types::{
    Engine, FetchShape, MetadataKind, ParamType, PreparedParameter, RowValues,
};

#[cfg(feature = "mssql")]
pub use crate::mssql::MssqlDriver;
#[cfg(feature = "postgres")]
pub use crate::postgres::PostgresDriver;
#[cfg(feature = "sqlite")]
pub use crate::sqlite::SqliteDriver;
