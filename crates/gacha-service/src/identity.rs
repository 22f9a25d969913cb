//! 调用方身份校验
//!
//! 把请求携带的凭据解析为 user_id。默认实现校验 HMAC 签名的 JWT，取 `sub` 作为用户 ID。

use std::str::FromStr;

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

use gacha_shared::config::AuthConfig;

use crate::error::{GachaError, Result};

/// 身份校验接口
#[cfg_attr(test, mockall::automock)]
pub trait IdentityVerifier: Send + Sync {
    /// 校验凭据并返回 user_id
    fn verify_caller(&self, credential: &str) -> Result<String>;
}

/// JWT 载荷
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// 用户 ID
    pub sub: String,
    /// 过期时间
    pub exp: i64,
}

/// JWT 身份校验器
pub struct JwtIdentityVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityVerifier {
    pub fn new(config: &AuthConfig) -> Result<Self> {
        let algorithm = Algorithm::from_str(&config.jwt_algorithm).map_err(|_| {
            GachaError::Validation(format!("不支持的 JWT 算法: {}", config.jwt_algorithm))
        })?;
        if !matches!(algorithm, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(GachaError::Validation(format!(
                "仅支持 HMAC 签名算法，实际为 {}",
                config.jwt_algorithm
            )));
        }
        if config.jwt_secret.is_empty() {
            return Err(GachaError::Validation("jwt_secret 不能为空".to_string()));
        }

        Ok(Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation: Validation::new(algorithm),
        })
    }
}

impl IdentityVerifier for JwtIdentityVerifier {
    fn verify_caller(&self, credential: &str) -> Result<String> {
        let token_data = decode::<Claims>(credential, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    GachaError::Unauthorized("Token 已过期".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidToken => {
                    GachaError::Unauthorized("无效的 Token".to_string())
                }
                _ => GachaError::Unauthorized(format!("Token 验证失败: {}", e)),
            })?;

        let user_id = token_data.claims.sub;
        if user_id.trim().is_empty() {
            return Err(GachaError::Unauthorized("Token 缺少用户标识".to_string()));
        }
        Ok(user_id)
    }
}
