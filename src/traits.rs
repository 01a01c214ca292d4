// Connection contract
// Defines the abstraction every relational backend implements: transaction
// lifecycle, raw query execution, SQL generation and result parsing

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::query::WhereClause;

/// Common database error type
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Transaction control failed: {0}")]
    TransactionFailed(String),

    #[error("Query execution error: {0}")]
    QueryError(String),

    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    #[error("Invalid transaction handle")]
    InvalidTransaction,

    #[error("Result parse error: {0}")]
    ParseError(String),

    #[error("Where clause has {placeholders} placeholders but {values} bound values")]
    PlaceholderMismatch { placeholders: usize, values: usize },
}

/// Scalar value carried in attribute maps, where clauses and result cells
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    DateTime(String),
    Binary(Vec<u8>),
}

/// Ordered column -> value mapping describing one row's data.
///
/// Column lists and value lists are emitted positionally from the same map,
/// so iteration order is load-bearing within a single statement.
pub type AttributeMap = IndexMap<String, CellValue>;

/// Raw result of one executed statement.
///
/// Consumed only by the parse methods; inserted ids, affected-row counts and
/// projected rows are extracted from here, never read directly by callers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub last_insert_id: Option<u64>,
    pub affected_rows: u64,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl QueryResult {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Opaque token for one open connection with an active transaction.
///
/// Owned by the caller between `create_transaction` and the single commit or
/// rollback that consumes it. A handle serves at most one in-flight query at
/// a time; `QueryContext::Bound` borrows it mutably to enforce that.
pub trait TransactionHandle: Send {
    /// Allow downcasting for driver-specific access
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;

    /// Allow consuming downcasts on commit/rollback
    fn into_any(self: Box<Self>) -> Box<dyn std::any::Any>;
}

/// Execution context for `send_query`
pub enum QueryContext<'a> {
    /// Open a fresh connection around the single statement, then close it
    Ambient,
    /// Run on the connection bound to an open transaction
    Bound(&'a mut dyn TransactionHandle),
}

/// Database connection trait - all backends must implement this
#[async_trait::async_trait]
pub trait DatabaseConnection: Send + Sync {
    // --- Connection Management ---
    /// Probe the backend: connect, ping, disconnect
    async fn test_connection(&self) -> Result<bool, DatabaseError>;

    // --- Transaction Lifecycle ---
    /// Open a connection and begin a transaction on it.
    ///
    /// On failure no handle is returned and no connection stays open.
    async fn create_transaction(&self) -> Result<Box<dyn TransactionHandle>, DatabaseError>;

    /// Commit the transaction, then close its connection.
    ///
    /// The connection is closed whether or not the commit is accepted; an
    /// error means the transaction's effects are not durable.
    async fn commit_transaction(
        &self,
        transaction: Box<dyn TransactionHandle>,
    ) -> Result<(), DatabaseError>;

    /// Roll the transaction back, then close its connection.
    ///
    /// An error here usually indicates connection loss and leaves the
    /// transaction's effects unknown.
    async fn rollback_transaction(
        &self,
        transaction: Box<dyn TransactionHandle>,
    ) -> Result<(), DatabaseError>;

    // --- Query Execution ---
    /// Execute a fully-formed SQL statement and return the raw result.
    ///
    /// Errors surface verbatim from the backend; nothing is retried.
    async fn send_query(
        &self,
        sql: &str,
        context: QueryContext<'_>,
    ) -> Result<QueryResult, DatabaseError>;

    // --- SQL Generation ---
    /// `INSERT INTO t (cols) VALUES (vals)` in attribute-map order
    fn create_insert_query(&self, table_name: &str, attributes: &AttributeMap) -> String;

    /// `SELECT * FROM t` with an optional `WHERE` clause
    fn create_find_query(&self, table_name: &str, where_clause: Option<&WhereClause>) -> String;

    /// `UPDATE t SET c = v, ...` in attribute-map order.
    ///
    /// Without a where clause this updates every row in the table.
    fn create_update_query(
        &self,
        table_name: &str,
        attributes: &AttributeMap,
        where_clause: Option<&WhereClause>,
    ) -> String;

    /// `DELETE FROM t` with an optional `WHERE` clause
    fn create_delete_query(&self, table_name: &str, where_clause: Option<&WhereClause>) -> String;

    /// Upsert: insert that converts to an update when a uniqueness
    /// constraint on the table is violated
    fn create_save_query(&self, table_name: &str, attributes: &AttributeMap) -> String;

    // --- Result Parsing ---
    /// Auto-generated primary key of a single-row insert.
    ///
    /// Errors when the backend reports no generated id (absent or the zero
    /// sentinel), i.e. the statement was not an auto-increment insert.
    fn parse_primary_key(&self, result: &QueryResult) -> Result<u64, DatabaseError>;

    /// Affected-row count of an update
    fn parse_updated_rows(&self, result: &QueryResult) -> u64;

    /// Affected-row count of a delete
    fn parse_deleted_rows(&self, result: &QueryResult) -> u64;

    /// Project each returned row into a map keyed by exactly the requested
    /// attribute names, values copied verbatim, row order preserved
    fn parse_attribute_maps(&self, result: &QueryResult, attributes: &[&str])
        -> Vec<AttributeMap>;
}
