// SQL Server backend over tiberius, driven by an adapter-owned current-thread
// runtime.
//
// - config: driver, tiberius config, TCP / SQL Browser connect
// - params: binding typed parameters onto a tiberius `Query`
// - query: streamed result handle and value extraction
// - transaction: transaction and savepoint directives
// - connection: the `NativeAdapter` implementation

pub mod config;
pub mod connection;
pub mod params;
pub mod query;
pub mod transaction;

pub use config::{MssqlClient, MssqlDriver};
pub use connection::MssqlAdapter;
pub use query::MssqlResult;
