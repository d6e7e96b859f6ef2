//! Handler模块

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use common::errors::AppError;
use common::middleware::RequestId;
use common::models::{
    DatabaseItem, ExecuteQueryRequest, QueryResultResponse, RegisterDatabaseRequest,
};
use common::response::ApiResponse;

use crate::service::DatabaseServiceTrait;
use crate::state::AppState;
use crate::SERVICE_NAME;

type ApiResult<T> = Result<Json<ApiResponse<T>>, AppError>;

fn reply<T>(data: T, request_id: &RequestId) -> Json<ApiResponse<T>> {
    Json(ApiResponse::ok_with_service(data, SERVICE_NAME).with_request_id(request_id.as_str()))
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

/// 列出所有已注册的数据库
#[utoipa::path(
    get,
    path = "/api/dms/v1/databases",
    tag = "databases",
    responses(
        (status = 200, description = "数据库列表", body = ApiResponse<Vec<DatabaseItem>>)
    )
)]
pub async fn list_databases(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> ApiResult<Vec<DatabaseItem>> {
    let data = state
        .service
        .list_databases()
        .await
        .into_iter()
        .map(DatabaseItem::from)
        .collect();
    Ok(reply(data, &request_id))
}

/// 注册数据库并建立连接
#[utoipa::path(
    post,
    path = "/api/dms/v1/databases",
    tag = "databases",
    request_body = RegisterDatabaseRequest,
    responses(
        (status = 201, description = "数据库已注册", body = ApiResponse<DatabaseItem>),
        (status = 400, description = "参数校验失败"),
        (status = 409, description = "数据库已存在"),
        (status = 502, description = "连接失败")
    )
)]
pub async fn register_database(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    payload: Result<Json<RegisterDatabaseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<DatabaseItem>>), AppError> {
    let database = body(payload)?.into_database()?;
    let ctx = state.request_context();
    let registered = state.service.register_database(&ctx, database).await?;
    Ok((
        StatusCode::CREATED,
        reply(DatabaseItem::from(registered), &request_id),
    ))
}

/// 根据 ID 获取数据库
#[utoipa::path(
    get,
    path = "/api/dms/v1/databases/{id}",
    tag = "databases",
    params(
        ("id" = String, Path, description = "数据库 ID")
    ),
    responses(
        (status = 200, description = "数据库详情", body = ApiResponse<DatabaseItem>),
        (status = 404, description = "数据库未找到")
    )
)]
pub async fn get_database(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
) -> ApiResult<DatabaseItem> {
    let database = state.service.get_database_info(&id).await?;
    Ok(reply(DatabaseItem::from(database), &request_id))
}

/// 断开并移除数据库连接
#[utoipa::path(
    delete,
    path = "/api/dms/v1/databases/{id}",
    tag = "databases",
    params(
        ("id" = String, Path, description = "数据库 ID")
    ),
    responses(
        (status = 200, description = "连接已断开", body = ApiResponse<bool>),
        (status = 404, description = "数据库未找到")
    )
)]
pub async fn disconnect_database(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
) -> ApiResult<bool> {
    let ctx = state.request_context();
    state.service.disconnect_database(&ctx, &id).await?;
    Ok(reply(true, &request_id))
}

/// 执行 SQL 查询
#[utoipa::path(
    post,
    path = "/api/dms/v1/databases/{id}/query",
    tag = "query",
    params(
        ("id" = String, Path, description = "数据库 ID")
    ),
    request_body = ExecuteQueryRequest,
    responses(
        (status = 200, description = "查询结果", body = ApiResponse<QueryResultResponse>),
        (status = 400, description = "SQL 校验失败"),
        (status = 404, description = "数据库未找到"),
        (status = 408, description = "查询超时"),
        (status = 503, description = "数据库未连接")
    )
)]
pub async fn execute_query(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
    payload: Result<Json<ExecuteQueryRequest>, JsonRejection>,
) -> ApiResult<QueryResultResponse> {
    let req = body(payload)?;
    let ctx = state.request_context();
    let result = state.service.execute_query(&ctx, &id, &req.query).await?;
    Ok(reply(QueryResultResponse::from(result), &request_id))
}

/// 列出数据库中的表
#[utoipa::path(
    get,
    path = "/api/dms/v1/databases/{id}/tables",
    tag = "query",
    params(
        ("id" = String, Path, description = "数据库 ID")
    ),
    responses(
        (status = 200, description = "表名列表", body = ApiResponse<Vec<String>>),
        (status = 404, description = "数据库未找到"),
        (status = 503, description = "数据库未连接")
    )
)]
pub async fn list_tables(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path(id): Path<String>,
) -> ApiResult<Vec<String>> {
    let ctx = state.request_context();
    let tables = state.service.get_tables(&ctx, &id).await?;
    Ok(reply(tables, &request_id))
}

/// 列出表中的字段
#[utoipa::path(
    get,
    path = "/api/dms/v1/databases/{id}/tables/{table}/columns",
    tag = "query",
    params(
        ("id" = String, Path, description = "数据库 ID"),
        ("table" = String, Path, description = "表名")
    ),
    responses(
        (status = 200, description = "字段名列表", body = ApiResponse<Vec<String>>),
        (status = 404, description = "数据库未找到"),
        (status = 503, description = "数据库未连接")
    )
)]
pub async fn list_columns(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    Path((id, table)): Path<(String, String)>,
) -> ApiResult<Vec<String>> {
    let ctx = state.request_context();
    let columns = state.service.get_columns(&ctx, &id, &table).await?;
    Ok(reply(columns, &request_id))
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "服务运行正常", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        connections: state.service.connection_count().await,
    })
}

/// 健康检查响应
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// 服务状态
    pub status: String,
    /// 服务名称
    pub service: String,
    /// 服务版本
    pub version: String,
    /// 当前时间戳
    pub timestamp: DateTime<Utc>,
    /// 已注册连接数
    pub connections: usize,
}
