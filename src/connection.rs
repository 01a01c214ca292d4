// Connection configuration
// Target-server description handed to a backend once at construction

use serde::{Deserialize, Serialize};

use crate::traits::DatabaseError;

/// Connection configuration for a relational backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    #[serde(skip_serializing)] // Don't serialize password
    pub password: String,
}

impl ConnectionConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            database: database.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn validate(&self) -> Result<(), DatabaseError> {
        if self.host.is_empty() {
            return Err(DatabaseError::InvalidConfig("Host is required".to_string()));
        }
        if self.port == 0 {
            return Err(DatabaseError::InvalidConfig("Port is required".to_string()));
        }
        if self.database.is_empty() {
            return Err(DatabaseError::InvalidConfig(
                "Database name is required".to_string(),
            ));
        }
        if self.username.is_empty() {
            return Err(DatabaseError::InvalidConfig(
                "Username is required".to_string(),
            ));
        }
        Ok(())
    }
}
