//! 中间件模块
//!
//! 提供玩家身份认证与管理接口 API Key 认证

mod api_key_auth;
mod auth;

pub use api_key_auth::{API_KEY_HEADER, admin_api_key_middleware, hash_api_key};
pub use auth::{CallerIdentity, caller_auth_middleware};
