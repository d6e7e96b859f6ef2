//! DMS 数据库连接注册服务
//!
//! 启动流程：加载配置、初始化日志、按配置注册数据库、启动 HTTP 服务，
//! 收到退出信号后优雅关闭所有连接。

use anyhow::Context;
use common::config::{AppConfig, LoggingConfig};
use common::OpContext;
use dms_service::{create_router, AppState, DatabaseServiceTrait, SERVICE_NAME};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (if present) before anything else
    load_dotenv();

    // 加载配置
    let config_path = AppConfig::default_path();
    let config = AppConfig::load_or_default(&config_path)
        .with_context(|| format!("加载配置失败: {}", config_path.display()))?;

    // 初始化日志追踪
    init_tracing(&config.logging);

    let state = AppState::new(config.clone());
    register_startup_databases(&state, &config).await;

    // 创建路由
    let app = create_router(state.clone());

    // 启动服务
    let addr = config.server.address();
    info!(service = SERVICE_NAME, address = %addr, "启动服务");

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("绑定地址失败: {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("服务运行失败")?;

    // 关闭所有数据库连接
    info!("正在关闭数据库连接");
    let ctx = OpContext::background().with_timeout(config.server.shutdown_timeout());
    if let Err(e) = state.service.shutdown(&ctx).await {
        tracing::error!(error = %e, "关闭数据库连接时出错");
    }
    info!(service = SERVICE_NAME, "服务已停止");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Registers every database marked `connect_on_startup`.
///
/// Each one gets its own timeout; a failure is logged and startup continues.
async fn register_startup_databases(state: &AppState, config: &AppConfig) {
    for entry in config.databases.iter().filter(|d| d.connect_on_startup) {
        let database = match entry.to_database() {
            Ok(database) => database,
            Err(e) => {
                tracing::warn!(id = %entry.id, error = %e, "跳过无效的数据库配置");
                continue;
            }
        };
        let ctx = OpContext::background().with_timeout(entry.connection_timeout());
        match state.service.register_database(&ctx, database).await {
            Ok(db) => info!(id = %db.id, vendor = %db.vendor, "启动时已连接数据库"),
            Err(e) => tracing::warn!(id = %entry.id, error = %e, "启动时连接数据库失败"),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "无法监听 Ctrl+C 信号");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "无法监听 SIGTERM 信号");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("收到退出信号");
}

/// Load .env file from the working directory (best-effort, no error if missing).
fn load_dotenv() {
    let Ok(content) = std::fs::read_to_string(".env") else {
        return;
    };
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim();
            let value = value.trim().trim_matches('"');
            // Only set if not already set by the environment
            if std::env::var_os(key).is_none() {
                std::env::set_var(key, value);
            }
        }
    }
}
