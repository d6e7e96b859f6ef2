//! 路由模块

use axum::{
    http::HeaderValue,
    middleware,
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use common::config::ServerConfig;
use common::middleware::request_id_middleware;

use crate::handlers;
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "DMS 服务 API",
        version = "0.1.0",
        description = "多数据库连接注册与查询微服务"
    ),
    paths(
        handlers::list_databases,
        handlers::register_database,
        handlers::get_database,
        handlers::disconnect_database,
        handlers::execute_query,
        handlers::list_tables,
        handlers::list_columns,
        handlers::health_check,
    ),
    components(schemas(
        common::models::DatabaseItem,
        common::models::Vendor,
        common::models::ConnectionStatus,
        common::models::RegisterDatabaseRequest,
        common::models::ExecuteQueryRequest,
        common::models::QueryResultResponse,
        common::response::ApiError,
        common::response::ResponseMeta,
        handlers::HealthResponse,
    )),
    tags(
        (name = "databases", description = "数据库注册端点"),
        (name = "query", description = "查询与元数据端点"),
        (name = "health", description = "健康检查端点")
    )
)]
pub struct ApiDoc;

/// 创建业务路由
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route(
            "/api/dms/v1/databases",
            get(handlers::list_databases).post(handlers::register_database),
        )
        .route(
            "/api/dms/v1/databases/{id}",
            get(handlers::get_database).delete(handlers::disconnect_database),
        )
        .route(
            "/api/dms/v1/databases/{id}/query",
            post(handlers::execute_query),
        )
        .route("/api/dms/v1/databases/{id}/tables", get(handlers::list_tables))
        .route(
            "/api/dms/v1/databases/{id}/tables/{table}/columns",
            get(handlers::list_columns),
        )
}

/// 创建完整应用（业务路由 + 文档 + 中间件）
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server);

    Router::new()
        .merge(router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if server.allowed_origins.iter().any(|origin| origin == "*") {
        return cors.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = server
        .allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
