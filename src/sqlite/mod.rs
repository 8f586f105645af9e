// SQLite backend over rusqlite.
//
// - config: driver, opening the database file
// - params: parameter conversion into rusqlite values
// - query: buffered result sets and value extraction
// - transaction: savepoint directives for nested scopes
// - connection: the `NativeAdapter` implementation

pub mod config;
pub mod connection;
pub mod params;
pub mod query;
pub mod transaction;

pub use config::SqliteDriver;
pub use connection::SqliteAdapter;
pub use query::SqliteResult;
