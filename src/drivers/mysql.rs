// MySQL Driver
// Implements the DatabaseConnection contract using mysql_async

use chrono::NaiveDate;
use mysql_async::prelude::Queryable;
use mysql_async::{Conn, Opts, OptsBuilder};
use tracing::debug;

use crate::connection::ConnectionConfig;
use crate::query::{escape_identifier, escape_literal, WhereClause};
use crate::traits::{
    AttributeMap, CellValue, DatabaseConnection, DatabaseError, QueryContext, QueryResult,
    TransactionHandle,
};

/// One MySQL connection with an active transaction on it
pub struct MysqlTransaction {
    conn: Conn,
}

impl TransactionHandle for MysqlTransaction {
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn std::any::Any> {
        self
    }
}

/// MySQL implementation of the connection contract
pub struct MysqlConnection {
    config: ConnectionConfig,
    opts: Opts,
}

impl MysqlConnection {
    pub fn new(config: ConnectionConfig) -> Result<Self, DatabaseError> {
        config.validate()?;
        let opts = Self::build_opts(&config);
        Ok(Self { config, opts })
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Build mysql_async Opts from the connection configuration
    fn build_opts(config: &ConnectionConfig) -> Opts {
        OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port)
            .db_name(Some(config.database.clone()))
            .user(Some(config.username.clone()))
            .pass(Some(config.password.clone()))
            .into()
    }

    async fn open(&self) -> Result<Conn, DatabaseError> {
        Conn::new(self.opts.clone())
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))
    }

    async fn run_query(conn: &mut Conn, sql: &str) -> Result<QueryResult, DatabaseError> {
        debug!(sql, "executing statement");
        let mut result = conn
            .query_iter(sql)
            .await
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;
        let rows: Vec<mysql_async::Row> = result
            .collect()
            .await
            .map_err(|e| DatabaseError::QueryError(e.to_string()))?;
        let affected_rows = result.affected_rows();
        let last_insert_id = result.last_insert_id();
        drop(result);

        let columns = rows
            .first()
            .map(|row| {
                row.columns_ref()
                    .iter()
                    .map(|column| column.name_str().to_string())
                    .collect()
            })
            .unwrap_or_default();
        let rows = rows
            .iter()
            .map(|row| {
                (0..row.len())
                    .map(|idx| {
                        row.as_ref(idx)
                            .map(Self::cell_value_from_wire)
                            .unwrap_or(CellValue::Null)
                    })
                    .collect()
            })
            .collect();

        Ok(QueryResult {
            last_insert_id,
            affected_rows,
            columns,
            rows,
        })
    }

    /// Extract cell value from a wire value
    fn cell_value_from_wire(value: &mysql_async::Value) -> CellValue {
        use mysql_async::Value;

        match value {
            Value::NULL => CellValue::Null,

            // The text protocol delivers most cells as bytes
            Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => CellValue::String(text.to_string()),
                Err(_) => CellValue::Binary(bytes.clone()),
            },

            Value::Int(v) => CellValue::Int(*v),
            Value::UInt(v) => match i64::try_from(*v) {
                Ok(v) => CellValue::Int(v),
                Err(_) => CellValue::String(v.to_string()),
            },

            Value::Float(v) => CellValue::Float(f64::from(*v)),
            Value::Double(v) => CellValue::Float(*v),

            Value::Date(year, month, day, hour, minute, second, micros) => {
                NaiveDate::from_ymd_opt(i32::from(*year), u32::from(*month), u32::from(*day))
                    .and_then(|date| {
                        date.and_hms_micro_opt(
                            u32::from(*hour),
                            u32::from(*minute),
                            u32::from(*second),
                            *micros,
                        )
                    })
                    .map(|dt| CellValue::DateTime(dt.to_string()))
                    .unwrap_or(CellValue::Null)
            }

            Value::Time(negative, days, hours, minutes, seconds, micros) => {
                let sign = if *negative { "-" } else { "" };
                let hours = u32::from(*hours) + *days * 24;
                let mut text = format!("{}{:02}:{:02}:{:02}", sign, hours, minutes, seconds);
                if *micros > 0 {
                    text.push_str(&format!(".{:06}", micros));
                }
                CellValue::DateTime(text)
            }
        }
    }
}

fn column_list(attributes: &AttributeMap) -> String {
    attributes
        .keys()
        .map(|column| escape_identifier(column))
        .collect::<Vec<_>>()
        .join(", ")
}

fn value_list(attributes: &AttributeMap) -> String {
    attributes
        .values()
        .map(escape_literal)
        .collect::<Vec<_>>()
        .join(", ")
}

fn assignment_list(attributes: &AttributeMap) -> String {
    attributes
        .iter()
        .map(|(column, value)| format!("{} = {}", escape_identifier(column), escape_literal(value)))
        .collect::<Vec<_>>()
        .join(", ")
}

#[async_trait::async_trait]
impl DatabaseConnection for MysqlConnection {
    async fn test_connection(&self) -> Result<bool, DatabaseError> {
        let mut conn = self.open().await?;
        let ping = conn.ping().await;
        let _ = conn.disconnect().await;
        ping.map(|_| true)
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))
    }

    async fn create_transaction(&self) -> Result<Box<dyn TransactionHandle>, DatabaseError> {
        let mut conn = self.open().await?;
        debug!("starting transaction");
        if let Err(e) = conn.query_drop("START TRANSACTION").await {
            let _ = conn.disconnect().await;
            return Err(DatabaseError::TransactionFailed(e.to_string()));
        }
        Ok(Box::new(MysqlTransaction { conn }))
    }

    async fn commit_transaction(
        &self,
        transaction: Box<dyn TransactionHandle>,
    ) -> Result<(), DatabaseError> {
        let tx = transaction
            .into_any()
            .downcast::<MysqlTransaction>()
            .map_err(|_| DatabaseError::InvalidTransaction)?;
        let mut conn = tx.conn;
        debug!("committing transaction");
        let committed = conn.query_drop("COMMIT").await;
        // the connection is released whether or not the commit went through
        let _ = conn.disconnect().await;
        committed.map_err(|e| DatabaseError::TransactionFailed(e.to_string()))
    }

    async fn rollback_transaction(
        &self,
        transaction: Box<dyn TransactionHandle>,
    ) -> Result<(), DatabaseError> {
        let tx = transaction
            .into_any()
            .downcast::<MysqlTransaction>()
            .map_err(|_| DatabaseError::InvalidTransaction)?;
        let mut conn = tx.conn;
        debug!("rolling back transaction");
        let rolled_back = conn.query_drop("ROLLBACK").await;
        let _ = conn.disconnect().await;
        rolled_back.map_err(|e| DatabaseError::TransactionFailed(e.to_string()))
    }

    async fn send_query(
        &self,
        sql: &str,
        context: QueryContext<'_>,
    ) -> Result<QueryResult, DatabaseError> {
        match context {
            QueryContext::Bound(handle) => {
                let tx = handle
                    .as_any_mut()
                    .downcast_mut::<MysqlTransaction>()
                    .ok_or(DatabaseError::InvalidTransaction)?;
                Self::run_query(&mut tx.conn, sql).await
            }
            QueryContext::Ambient => {
                let mut conn = self.open().await?;
                let result = Self::run_query(&mut conn, sql).await;
                let _ = conn.disconnect().await;
                result
            }
        }
    }

    fn create_insert_query(&self, table_name: &str, attributes: &AttributeMap) -> String {
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            escape_identifier(table_name),
            column_list(attributes),
            value_list(attributes)
        )
    }

    fn create_find_query(&self, table_name: &str, where_clause: Option<&WhereClause>) -> String {
        let mut sql = format!("SELECT * FROM {}", escape_identifier(table_name));
        if let Some(clause) = where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&clause.render());
        }
        sql
    }

    fn create_update_query(
        &self,
        table_name: &str,
        attributes: &AttributeMap,
        where_clause: Option<&WhereClause>,
    ) -> String {
        let mut sql = format!(
            "UPDATE {} SET {}",
            escape_identifier(table_name),
            assignment_list(attributes)
        );
        if let Some(clause) = where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&clause.render());
        }
        sql
    }

    fn create_delete_query(&self, table_name: &str, where_clause: Option<&WhereClause>) -> String {
        let mut sql = format!("DELETE FROM {}", escape_identifier(table_name));
        if let Some(clause) = where_clause {
            sql.push_str(" WHERE ");
            sql.push_str(&clause.render());
        }
        sql
    }

    fn create_save_query(&self, table_name: &str, attributes: &AttributeMap) -> String {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON DUPLICATE KEY UPDATE {}",
            escape_identifier(table_name),
            column_list(attributes),
            value_list(attributes),
            assignment_list(attributes)
        )
    }

    fn parse_primary_key(&self, result: &QueryResult) -> Result<u64, DatabaseError> {
        match result.last_insert_id {
            Some(id) if id != 0 => Ok(id),
            _ => Err(DatabaseError::ParseError(
                "statement produced no generated primary key".to_string(),
            )),
        }
    }

    fn parse_updated_rows(&self, result: &QueryResult) -> u64 {
        result.affected_rows
    }

    fn parse_deleted_rows(&self, result: &QueryResult) -> u64 {
        result.affected_rows
    }

    fn parse_attribute_maps(
        &self,
        result: &QueryResult,
        attributes: &[&str],
    ) -> Vec<AttributeMap> {
        result
            .rows
            .iter()
            .map(|row| {
                attributes
                    .iter()
                    .map(|attr| {
                        let value = result
                            .columns
                            .iter()
                            .position(|column| column.as_str() == *attr)
                            .and_then(|idx| row.get(idx))
                            .cloned()
                            .unwrap_or(CellValue::Null);
                        ((*attr).to_string(), value)
                    })
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> MysqlConnection {
        let config = ConnectionConfig::new("localhost", 3306, "testdb", "root", "");
        MysqlConnection::new(config).unwrap()
    }

    fn attributes() -> AttributeMap {
        let mut map = AttributeMap::new();
        map.insert("a".to_string(), CellValue::Int(1));
        map.insert("b".to_string(), CellValue::String("2".to_string()));
        map
    }

    fn test_where_clause() -> WhereClause {
        WhereClause::new(
            "a = ? AND (b = ? OR c = ?)",
            vec![CellValue::Int(1), CellValue::Int(2), CellValue::Int(3)],
        )
        .unwrap()
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = ConnectionConfig::new("", 3306, "testdb", "root", "");
        assert!(MysqlConnection::new(config).is_err());
    }

    #[test]
    fn test_create_insert_query() {
        let query = connection().create_insert_query("testTable", &attributes());
        assert_eq!(query, "INSERT INTO `testTable` (`a`, `b`) VALUES (1, '2')");
    }

    #[test]
    fn test_insert_column_and_value_order_match() {
        let mut map = AttributeMap::new();
        map.insert("b".to_string(), CellValue::String("2".to_string()));
        map.insert("a".to_string(), CellValue::Int(1));

        let query = connection().create_insert_query("t", &map);
        assert_eq!(query, "INSERT INTO `t` (`b`, `a`) VALUES ('2', 1)");
    }

    #[test]
    fn test_create_find_query_without_where() {
        let query = connection().create_find_query("testTable", None);
        assert_eq!(query, "SELECT * FROM `testTable`");
        assert!(!query.contains("WHERE"));
    }

    #[test]
    fn test_create_find_query_with_where() {
        let query = connection().create_find_query("testTable", Some(&test_where_clause()));
        assert_eq!(
            query,
            "SELECT * FROM `testTable` WHERE a = 1 AND (b = 2 OR c = 3)"
        );
    }

    #[test]
    fn test_create_update_query_without_where_touches_all_rows() {
        let query = connection().create_update_query("testTable", &attributes(), None);
        assert_eq!(query, "UPDATE `testTable` SET `a` = 1, `b` = '2'");
    }

    #[test]
    fn test_create_update_query_with_where() {
        let clause = WhereClause::new("a = ?", vec![CellValue::Int(9)]).unwrap();
        let query = connection().create_update_query("testTable", &attributes(), Some(&clause));
        assert_eq!(
            query,
            "UPDATE `testTable` SET `a` = 1, `b` = '2' WHERE a = 9"
        );
    }

    #[test]
    fn test_create_delete_query() {
        let query = connection().create_delete_query("testTable", Some(&test_where_clause()));
        assert_eq!(
            query,
            "DELETE FROM `testTable` WHERE a = 1 AND (b = 2 OR c = 3)"
        );

        let unconditional = connection().create_delete_query("testTable", None);
        assert_eq!(unconditional, "DELETE FROM `testTable`");
    }

    #[test]
    fn test_create_save_query_references_every_column_in_all_lists() {
        let query = connection().create_save_query("testTable", &attributes());
        assert_eq!(
            query,
            "INSERT INTO `testTable` (`a`, `b`) VALUES (1, '2') \
             ON DUPLICATE KEY UPDATE `a` = 1, `b` = '2'"
        );
        assert_eq!(query.matches("`a`").count(), 2);
        assert_eq!(query.matches("`b`").count(), 2);
    }

    #[test]
    fn test_builders_escape_hostile_input() {
        let mut map = AttributeMap::new();
        map.insert(
            "name".to_string(),
            CellValue::String("'; DROP TABLE users; --".to_string()),
        );

        let query = connection().create_insert_query("users`--", &map);
        assert_eq!(
            query,
            "INSERT INTO `users``--` (`name`) VALUES ('\\'; DROP TABLE users; --')"
        );
    }

    #[test]
    fn test_parse_primary_key() {
        let conn = connection();

        let mut result = QueryResult::new();
        result.last_insert_id = Some(7);
        assert_eq!(conn.parse_primary_key(&result).unwrap(), 7);

        result.last_insert_id = Some(0);
        assert!(conn.parse_primary_key(&result).is_err());

        result.last_insert_id = None;
        assert!(conn.parse_primary_key(&result).is_err());
    }

    #[test]
    fn test_parse_affected_row_counts() {
        let conn = connection();
        let mut result = QueryResult::new();
        result.affected_rows = 3;
        assert_eq!(conn.parse_updated_rows(&result), 3);
        assert_eq!(conn.parse_deleted_rows(&result), 3);
    }

    #[test]
    fn test_parse_attribute_maps_empty_result() {
        let conn = connection();
        let maps = conn.parse_attribute_maps(&QueryResult::new(), &["a", "b"]);
        assert!(maps.is_empty());
    }

    #[test]
    fn test_parse_attribute_maps_projects_requested_attributes() {
        let conn = connection();
        let result = QueryResult {
            last_insert_id: None,
            affected_rows: 0,
            columns: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            rows: vec![
                vec![
                    CellValue::Int(1),
                    CellValue::String("x".to_string()),
                    CellValue::Bool(true),
                ],
                vec![
                    CellValue::Int(2),
                    CellValue::String("y".to_string()),
                    CellValue::Bool(false),
                ],
            ],
        };

        let maps = conn.parse_attribute_maps(&result, &["c", "a"]);
        assert_eq!(maps.len(), 2);
        for map in &maps {
            assert_eq!(map.len(), 2);
            let keys: Vec<&str> = map.keys().map(|k| k.as_str()).collect();
            assert_eq!(keys, vec!["c", "a"]);
        }
        assert_eq!(maps[0]["c"], CellValue::Bool(true));
        assert_eq!(maps[1]["a"], CellValue::Int(2));
    }

    #[test]
    fn test_parse_attribute_maps_missing_column_is_null() {
        let conn = connection();
        let result = QueryResult {
            last_insert_id: None,
            affected_rows: 0,
            columns: vec!["a".to_string()],
            rows: vec![vec![CellValue::Int(1)]],
        };

        let maps = conn.parse_attribute_maps(&result, &["a", "ghost"]);
        assert_eq!(maps[0]["a"], CellValue::Int(1));
        assert_eq!(maps[0]["ghost"], CellValue::Null);
    }

    #[test]
    fn test_cell_value_from_wire() {
        use mysql_async::Value;

        assert_eq!(
            MysqlConnection::cell_value_from_wire(&Value::NULL),
            CellValue::Null
        );
        assert_eq!(
            MysqlConnection::cell_value_from_wire(&Value::Int(-5)),
            CellValue::Int(-5)
        );
        assert_eq!(
            MysqlConnection::cell_value_from_wire(&Value::Bytes(b"hello".to_vec())),
            CellValue::String("hello".to_string())
        );
        assert_eq!(
            MysqlConnection::cell_value_from_wire(&Value::Bytes(vec![0xFF, 0xFE])),
            CellValue::Binary(vec![0xFF, 0xFE])
        );
        assert_eq!(
            MysqlConnection::cell_value_from_wire(&Value::Double(2.5)),
            CellValue::Float(2.5)
        );
        assert_eq!(
            MysqlConnection::cell_value_from_wire(&Value::Date(2024, 3, 1, 12, 30, 0, 0)),
            CellValue::DateTime("2024-03-01 12:30:00".to_string())
        );
        // zeroed dates have no calendar representation
        assert_eq!(
            MysqlConnection::cell_value_from_wire(&Value::Date(0, 0, 0, 0, 0, 0, 0)),
            CellValue::Null
        );
    }
}
