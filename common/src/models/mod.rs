//! Shared data models.

pub mod database;
pub mod query;
pub mod request;

// Re-export commonly used types
pub use database::{ConnectionStatus, Database, DatabaseItem, Vendor};
pub use query::{QueryResult, QueryResultResponse, Row};
pub use request::{ExecuteQueryRequest, RegisterDatabaseRequest};
