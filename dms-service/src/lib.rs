//! DMS 数据库连接注册服务
//!
//! 提供多数据库连接管理功能，包括：
//! - PostgreSQL / Oracle / MariaDB 适配器
//! - 连接注册表与连接状态维护
//! - SQL 查询与表结构查询

pub mod adapters;
pub mod handlers;
pub mod registry;
pub mod routes;
pub mod service;
pub mod state;

/// Service name reported in responses and logs.
pub const SERVICE_NAME: &str = "dms-service";

pub use registry::ConnectionRegistry;
pub use routes::create_router;
pub use service::{DatabaseService, DatabaseServiceTrait};
pub use state::AppState;
