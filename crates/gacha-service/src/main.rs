//! 抽卡服务入口
//!
//! 加载配置、初始化存储与种子数据后启动 REST API。

use std::sync::Arc;

use axum::http::HeaderValue;
use gacha_service::{
    AppState, ChaChaDrawFactory, JwtIdentityVerifier, MemoryStore, Repositories, SeedData,
    StaticItemCatalog, routes,
};
use gacha_shared::{
    config::{AppConfig, StorageBackend},
    database::Database,
    observability,
    retry::RetryPolicy,
};
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 统一加载配置：从 config/{service_name}.toml 加载，包含可观测性配置
    let config = AppConfig::load("gacha-service").unwrap_or_default();

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!(
        "Starting gacha-service on {} (storage: {:?})",
        config.server_addr(),
        config.storage.backend
    );

    // 初始化存储
    let repos = match config.storage.backend {
        StorageBackend::Postgres => {
            // 数据库可能晚于服务就绪，按默认退避策略重连
            let db =
                Database::connect_with_retry(&config.database, &RetryPolicy::default()).await?;
            if config.database.run_migrations {
                db.run_migrations(&MIGRATOR).await?;
            }
            Repositories::postgres(db.pool().clone())
        }
        StorageBackend::Memory => {
            if config.is_production() {
                warn!("生产环境使用内存存储，进程重启后数据将丢失");
            }
            Repositories::memory(Arc::new(MemoryStore::new()))
        }
    };

    let seed = match config.storage.seed_path.as_deref() {
        Some(path) => SeedData::load(path)?,
        None => SeedData::default(),
    };
    let catalog: StaticItemCatalog = seed.catalog();
    if catalog.is_empty() {
        warn!("物品目录为空，响应中不包含物品展示信息");
    }

    let identity = Arc::new(JwtIdentityVerifier::new(&config.auth)?);
    let state = AppState::build(
        &config,
        repos,
        Arc::new(catalog),
        identity,
        Arc::new(ChaChaDrawFactory),
    )?;

    seed.apply(&state.banners, &state.enhancement).await?;

    if state.admin_api_key_hash.is_none() {
        warn!("未配置 auth.admin_api_key，管理接口不可用");
    }

    // CORS 配置：通过 GACHA_CORS_ORIGINS 环境变量控制允许的来源
    let allowed_origins = std::env::var("GACHA_CORS_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3001,http://localhost:5173".to_string());

    let cors = if allowed_origins == "*" {
        if config.is_production() {
            warn!("GACHA_CORS_ORIGINS=\"*\" 在生产环境中不安全，请设置为具体域名");
        }
        info!("CORS allowed_origins: * (all origins)");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        info!("CORS allowed_origins: {}", allowed_origins);
        let origins: Vec<_> = allowed_origins
            .split(',')
            .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let app = routes::build_router(state, &config.server).layer(cors);

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    // 优雅关闭：收到 SIGTERM 或 Ctrl+C 时停止接收新连接并等待已有请求处理完毕
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");

    Ok(())
}

/// 监听关闭信号
///
/// 注册信号处理器失败时只记录日志，对应的分支永远不会触发
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("注册 Ctrl+C 处理器失败: {}", e);
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
                warn!("注册 SIGTERM 处理器失败: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
