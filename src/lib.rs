// sqlgate
// Minimal async database-access abstraction: a connection contract that turns
// logical CRUD operations into escaped SQL, executes them inside an optional
// transaction and parses driver results into typed outcomes

// Module declarations
pub mod connection;
pub mod drivers;
pub mod query;
pub mod schema;
pub mod traits;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::ConnectionConfig;
pub use drivers::{MysqlConnection, MysqlTransaction};
pub use query::{escape_identifier, escape_literal, WhereClause};
pub use schema::{TableColumn, TableSchema};
pub use traits::{
    AttributeMap, CellValue, DatabaseConnection, DatabaseError, QueryContext, QueryResult,
    TransactionHandle,
};
