// Database Drivers
// Contains implementations of the connection contract for each supported backend

pub mod mysql;

// Re-export drivers
pub use mysql::{MysqlConnection, MysqlTransaction};
