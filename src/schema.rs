// Table description
// Passive reference data describing a table; query generation takes raw
// table names and attribute maps and never validates against this

use serde::{Deserialize, Serialize};

/// Column of a described table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableColumn {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
}

impl TableColumn {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
        }
    }
}

/// Static description of a table: name, ordered columns and the name of its
/// primary-key column, if it has one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<TableColumn>,
    pub primary_key: Option<String>,
}

impl TableSchema {
    pub fn new(
        name: impl Into<String>,
        columns: Vec<TableColumn>,
        primary_key: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            columns,
            primary_key,
        }
    }

    /// Look up a column by name
    pub fn column(&self, name: &str) -> Option<&TableColumn> {
        self.columns.iter().find(|column| column.name == name)
    }

    /// The column the primary-key name refers to, if both exist
    pub fn primary_key_column(&self) -> Option<&TableColumn> {
        self.primary_key.as_deref().and_then(|name| self.column(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> TableSchema {
        TableSchema::new(
            "users",
            vec![
                TableColumn::new("id", "INT"),
                TableColumn::new("name", "VARCHAR(64)"),
            ],
            Some("id".to_string()),
        )
    }

    #[test]
    fn test_column_lookup() {
        let schema = schema();
        assert!(schema.column("name").is_some());
        assert!(schema.column("missing").is_none());
    }

    #[test]
    fn test_primary_key_column() {
        let schema = schema();
        let pk = schema.primary_key_column().expect("pk column");
        assert_eq!(pk.name, "id");
        assert_eq!(pk.data_type, "INT");
    }

    #[test]
    fn test_without_primary_key() {
        let schema = TableSchema::new("log", vec![TableColumn::new("line", "TEXT")], None);
        assert!(schema.primary_key_column().is_none());
    }
}
