//! 管理接口 API Key 认证中间件
//!
//! 管理接口（发布卡池、重置保底、发放材料、审计）只接受 X-API-Key 认证

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::GachaError;
use crate::state::AppState;

/// API Key Header 名称
pub const API_KEY_HEADER: &str = "X-API-Key";

/// 计算 API Key 的 SHA256 哈希
///
/// 配置中的 Key 在启动时哈希一次，请求只比较摘要
pub fn hash_api_key(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// 管理接口认证中间件
///
/// 未配置 admin_api_key 时拒绝所有管理请求
pub async fn admin_api_key_middleware(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.admin_api_key_hash.as_deref() else {
        warn!("未配置管理 API Key，拒绝管理请求");
        return GachaError::Unauthorized("管理接口未启用".to_string()).into_response();
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match provided {
        Some(key) if hash_api_key(key) == expected => next.run(request).await,
        Some(_) => {
            warn!("无效的管理 API Key");
            GachaError::Unauthorized("无效的 API Key".to_string()).into_response()
        }
        None => GachaError::Unauthorized("缺少 API Key".to_string()).into_response(),
    }
}
