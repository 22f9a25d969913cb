//! 路由配置模块
//!
//! 玩家接口走 Bearer Token 认证，管理接口走 API Key 认证，/health 公开

use std::time::Duration;

use axum::{
    Router,
    http::StatusCode,
    middleware,
    routing::{get, post, put},
};
use tower_http::timeout::TimeoutLayer;

use gacha_shared::config::ServerConfig;
use gacha_shared::observability::middleware as obs_middleware;

use crate::handlers;
use crate::middleware::{admin_api_key_middleware, caller_auth_middleware};
use crate::state::AppState;

/// 玩家路由
fn player_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        // 抽卡
        .route("/api/gacha/pull", post(handlers::gacha::pull))
        .route("/api/gacha/banners", get(handlers::gacha::list_banners))
        .route("/api/gacha/banners/{id}", get(handlers::gacha::get_banner))
        .route(
            "/api/gacha/banners/{id}/pity",
            get(handlers::gacha::pity_status),
        )
        .route("/api/gacha/history", get(handlers::gacha::history))
        .route("/api/gacha/history/{id}", get(handlers::gacha::get_record))
        // 背包与养成
        .route("/api/inventory", get(handlers::inventory::list_inventory))
        .route("/api/inventory/materials", get(handlers::inventory::wallet))
        .route(
            "/api/inventory/enhancements",
            get(handlers::inventory::list_enhancements),
        )
        .route("/api/inventory/{id}", get(handlers::inventory::get_item))
        .route(
            "/api/inventory/{id}/enhance",
            post(handlers::inventory::enhance),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            caller_auth_middleware,
        ))
}

/// 管理路由
fn admin_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/api/admin/banners", put(handlers::admin::publish_banner))
        .route(
            "/api/admin/banners/{id}/pity/reset",
            post(handlers::admin::reset_pity),
        )
        .route(
            "/api/admin/materials/grant",
            post(handlers::admin::grant_materials),
        )
        .route(
            "/api/admin/pulls/{id}/audit",
            get(handlers::admin::audit_record),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admin_api_key_middleware,
        ))
}

/// 请求超时返回 408
fn timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

/// 构建完整路由
pub fn build_router(state: AppState, server: &ServerConfig) -> Router {
    Router::new()
        .merge(player_routes(&state))
        .merge(admin_routes(&state))
        .route("/health", get(handlers::health::health_check))
        .layer(timeout_layer(Duration::from_secs(
            server.request_timeout_seconds,
        )))
        // 可观测性中间件：请求追踪和指标收集
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id))
        .with_state(state)
}
