// PostgreSQL backend over tokio-postgres, driven by an adapter-owned
// current-thread runtime.
//
// - config: driver and connect
// - params: binding typed parameters against the server-inferred types
// - query: streamed result handle and value extraction
// - transaction: BEGIN/COMMIT/ROLLBACK directives
// - connection: the `NativeAdapter` implementation

pub mod config;
pub mod connection;
pub mod params;
pub mod query;
pub mod transaction;

pub use config::PostgresDriver;
pub use connection::PostgresAdapter;
pub use query::PostgresResult;
