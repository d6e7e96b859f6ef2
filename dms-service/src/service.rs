//! 数据库注册与查询服务模块
//!
//! 在连接注册表之上做参数校验、连接状态检查和密码脱敏，
//! 所有对外返回的 `Database` 都经过脱敏处理。

use std::sync::Arc;

use async_trait::async_trait;
use validator::Validate;

use common::errors::{AppError, AppResult};
use common::models::{Database, QueryResult};
use common::utils::QueryValidator;
use common::OpContext;

use crate::registry::ConnectionRegistry;

/// 数据库服务 Trait
#[async_trait]
pub trait DatabaseServiceTrait: Send + Sync {
    /// 校验并注册数据库，建立连接
    async fn register_database(&self, ctx: &OpContext, database: Database) -> AppResult<Database>;

    /// 在已连接的数据库上执行 SQL
    async fn execute_query(&self, ctx: &OpContext, id: &str, query: &str) -> AppResult<QueryResult>;

    /// 列出所有已注册的数据库
    async fn list_databases(&self) -> Vec<Database>;

    /// 根据 ID 获取数据库信息
    async fn get_database_info(&self, id: &str) -> AppResult<Database>;

    /// 断开并移除数据库连接
    async fn disconnect_database(&self, ctx: &OpContext, id: &str) -> AppResult<()>;

    /// 列出数据库中的表
    async fn get_tables(&self, ctx: &OpContext, id: &str) -> AppResult<Vec<String>>;

    /// 列出表中的字段
    async fn get_columns(&self, ctx: &OpContext, id: &str, table: &str) -> AppResult<Vec<String>>;

    /// 关闭所有连接
    async fn shutdown(&self, ctx: &OpContext) -> AppResult<()>;
}

/// 数据库注册与查询服务
pub struct DatabaseService {
    registry: Arc<ConnectionRegistry>,
}

impl DatabaseService {
    /// 创建新的服务实例
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// 当前注册的连接数
    pub async fn connection_count(&self) -> usize {
        self.registry.connection_count().await
    }

    fn require_id(id: &str) -> AppResult<()> {
        if id.trim().is_empty() {
            return Err(AppError::Validation("database id is required".into()));
        }
        Ok(())
    }

    /// 探测连接是否可用，不可用时区分未连接与不存在
    async fn ensure_connected(&self, ctx: &OpContext, id: &str) -> AppResult<()> {
        if self.registry.is_connected(ctx, id).await {
            return Ok(());
        }
        if let Err(reason) = ctx.check() {
            return Err(AppError::interrupted(id, reason));
        }
        if self.registry.contains(id).await {
            Err(AppError::NotConnected(id.to_string()))
        } else {
            Err(AppError::DatabaseNotFound(id.to_string()))
        }
    }
}

#[async_trait]
impl DatabaseServiceTrait for DatabaseService {
    async fn register_database(&self, ctx: &OpContext, database: Database) -> AppResult<Database> {
        database.validate()?;
        if !self.registry.supports(database.vendor) {
            return Err(AppError::InvalidDatabaseType(database.vendor.to_string()));
        }
        if !database.can_connect() {
            return Err(AppError::MissingCredentials(database.id));
        }

        let connected = self.registry.connect(ctx, database).await?;
        tracing::info!(id = %connected.id, name = %connected.name, "数据库已注册");
        Ok(connected.masked())
    }

    async fn execute_query(&self, ctx: &OpContext, id: &str, query: &str) -> AppResult<QueryResult> {
        Self::require_id(id)?;
        QueryValidator::validate(query)?;
        self.ensure_connected(ctx, id).await?;
        self.registry.execute_query(ctx, id, query).await
    }

    async fn list_databases(&self) -> Vec<Database> {
        self.registry
            .list_connections()
            .await
            .into_iter()
            .map(Database::masked)
            .collect()
    }

    async fn get_database_info(&self, id: &str) -> AppResult<Database> {
        Self::require_id(id)?;
        self.registry
            .get(id)
            .await
            .map(Database::masked)
            .ok_or_else(|| AppError::DatabaseNotFound(id.to_string()))
    }

    async fn disconnect_database(&self, ctx: &OpContext, id: &str) -> AppResult<()> {
        Self::require_id(id)?;
        self.registry.disconnect(ctx, id).await?;
        tracing::info!(id = %id, "数据库已断开");
        Ok(())
    }

    async fn get_tables(&self, ctx: &OpContext, id: &str) -> AppResult<Vec<String>> {
        Self::require_id(id)?;
        self.ensure_connected(ctx, id).await?;
        self.registry.get_tables(ctx, id).await
    }

    async fn get_columns(&self, ctx: &OpContext, id: &str, table: &str) -> AppResult<Vec<String>> {
        Self::require_id(id)?;
        if table.trim().is_empty() {
            return Err(AppError::Validation("table name is required".into()));
        }
        self.ensure_connected(ctx, id).await?;
        self.registry.get_columns(ctx, id, table).await
    }

    async fn shutdown(&self, ctx: &OpContext) -> AppResult<()> {
        let count = self.registry.connection_count().await;
        self.registry.disconnect_all(ctx).await?;
        tracing::info!(count, "所有连接已关闭");
        Ok(())
    }
}
