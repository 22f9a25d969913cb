//! 玩家身份认证中间件
//!
//! 从 Authorization header 中提取 Bearer Token，交给 `IdentityVerifier` 校验，
//! 通过后把调用方身份注入请求扩展

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{Request, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::GachaError;
use crate::state::AppState;

/// 已认证的调用方
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: String,
}

/// 认证中间件
pub async fn caller_auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim);

    let Some(token) = token.filter(|t| !t.is_empty()) else {
        return GachaError::Unauthorized("缺少认证 Token".to_string()).into_response();
    };

    match state.identity.verify_caller(token) {
        Ok(user_id) => {
            request.extensions_mut().insert(CallerIdentity { user_id });
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

impl<S> FromRequestParts<S> for CallerIdentity
where
    S: Send + Sync,
{
    type Rejection = GachaError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CallerIdentity>()
            .cloned()
            .ok_or_else(|| GachaError::Unauthorized("未认证的请求".to_string()))
    }
}
