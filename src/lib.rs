//! Blocking database access over `SQLite`, `PostgreSQL` and SQL Server behind one
//! connect / execute / fetch / transact contract.
//!
//! ```rust,no_run
//! use db_manager::prelude::*;
//!
//! let options = ConnectionOptions::builder(Engine::Postgres, "localhost", "app", "secret", "shop")
//!     .finish()?;
//! let mut manager = ConnectionManager::connect(options)?;
//! let conn = manager.connection()?;
//!
//! conn.begin()?;
//! conn.execute(
//!     "update accounts set balance = balance - ? where id = ?",
//!     &[PreparedParameter::double(10.0), PreparedParameter::integer(7)],
//! )?;
//! conn.commit()?;
//!
//! let mut cursor = conn.execute("select id, balance from accounts", &[])?;
//! while let Some(row) = cursor.next()? {
//!     println!("{:?} {:?}", row.get("id"), row.get("balance"));
//! }
//! # Ok::<(), DbManagerError>(())
//! ```

pub mod prelude;

pub mod adapter;
pub mod config;
pub mod connection;
pub mod diagnostics;
pub mod error;
pub(crate) mod executor;
pub mod manager;
pub mod placeholders;
pub mod policy;
pub mod results;
pub mod transaction;
pub mod types;

#[cfg(feature = "mssql")]
pub mod mssql;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "test-utils")]
pub mod test_utils;

pub use adapter::{Capabilities, Driver, NativeAdapter, TransactionNesting};
pub use config::{ConnectionOptions, ConnectionOptionsBuilder};
pub use connection::{Connection, ConnectionInfo};
pub use error::{DbManagerError, ErrorKind, ErrorReport};
pub use manager::ConnectionManager;
pub use policy::ErrorMode;
pub use results::{FetchedRow, FieldInfo, ObjectRow, ResultCursor};
pub use transaction::TransactionState;
pub use types::{Engine, FetchShape, MetadataKind, ParamType, PreparedParameter, RowValues};
