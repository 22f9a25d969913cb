//! 抽卡服务错误类型
//!
//! 定义服务层的业务错误和系统错误，并负责映射为 HTTP 响应

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// 抽卡服务错误类型
#[derive(Debug, Error)]
pub enum GachaError {
    // === 卡池相关错误 ===
    #[error("卡池配置无效: {0}")]
    ConfigError(String),

    #[error("卡池不存在: {0}")]
    BannerNotFound(String),

    #[error("卡池未开放: {0}")]
    BannerInactive(String),

    #[error("卡池版本已发布且内容不同: banner={banner_id}, version={version}")]
    BannerVersionExists { banner_id: String, version: i64 },

    // === 抽卡相关错误 ===
    #[error("无效的抽卡次数: {0}，仅支持 1 或 10")]
    InvalidBatchSize(u32),

    #[error("抽卡引擎繁忙，已尝试 {attempts} 次，请稍后重试")]
    PullEngineBusy { attempts: u32 },

    #[error("抽卡记录不存在: {0}")]
    RecordNotFound(Uuid),

    // === 背包与养成相关错误 ===
    #[error("物品不存在或不属于当前用户: {0}")]
    NotOwned(Uuid),

    #[error("材料不足: material_id={material_id}, 需要 {required}, 可用 {available}")]
    InsufficientMaterials {
        material_id: String,
        required: i64,
        available: i64,
    },

    #[error("物品已达到等级上限: level={level}, max_level={max_level}")]
    MaxLevelReached { level: i32, max_level: i32 },

    // === 鉴权错误 ===
    #[error("未授权: {0}")]
    Unauthorized(String),

    // === 内部协调错误（服务内消化，不直接暴露） ===
    #[error("并发冲突: {0}")]
    Conflict(String),

    #[error("重复的幂等键: {0}")]
    DuplicateIdempotencyKey(String),

    // === 系统错误 ===
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("内部错误: {0}")]
    Internal(String),

    #[error("参数校验失败: {0}")]
    Validation(String),
}

/// 抽卡服务 Result 类型别名
pub type Result<T> = std::result::Result<T, GachaError>;

impl GachaError {
    /// 检查是否为可重试的错误
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Database(_) | Self::Conflict(_) | Self::PullEngineBusy { .. }
        )
    }

    /// 检查是否为业务错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        !matches!(
            self,
            Self::Database(_)
                | Self::Serialization(_)
                | Self::Internal(_)
                | Self::Conflict(_)
                | Self::DuplicateIdempotencyKey(_)
                | Self::ConfigError(_)
        )
    }

    /// 获取错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ConfigError(_) => "BANNER_CONFIG_ERROR",
            Self::BannerNotFound(_) => "BANNER_NOT_FOUND",
            Self::BannerInactive(_) => "BANNER_INACTIVE",
            Self::BannerVersionExists { .. } => "BANNER_VERSION_EXISTS",
            Self::InvalidBatchSize(_) => "INVALID_BATCH_SIZE",
            Self::PullEngineBusy { .. } => "PULL_ENGINE_BUSY",
            Self::RecordNotFound(_) => "PULL_RECORD_NOT_FOUND",
            Self::NotOwned(_) => "ITEM_NOT_OWNED",
            Self::InsufficientMaterials { .. } => "INSUFFICIENT_MATERIALS",
            Self::MaxLevelReached { .. } => "MAX_LEVEL_REACHED",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Conflict(_) => "CONCURRENCY_CONFLICT",
            Self::DuplicateIdempotencyKey(_) => "DUPLICATE_IDEMPOTENCY_KEY",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
        }
    }

    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::InvalidBatchSize(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            // 不区分“不存在”和“不属于你”，避免泄露他人物品 ID
            Self::BannerNotFound(_) | Self::NotOwned(_) | Self::RecordNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            Self::BannerInactive(_)
            | Self::BannerVersionExists { .. }
            | Self::MaxLevelReached { .. }
            | Self::Conflict(_)
            | Self::DuplicateIdempotencyKey(_) => StatusCode::CONFLICT,
            Self::InsufficientMaterials { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::PullEngineBusy { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::ConfigError(_)
            | Self::Database(_)
            | Self::Serialization(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for GachaError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        // 系统级错误只返回通用提示，详细信息仅记录日志
        let message = match &self {
            Self::Database(e) => {
                tracing::error!(error = %e, "数据库操作失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Serialization(e) => {
                tracing::error!(error = %e, "序列化失败");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::Internal(e) => {
                tracing::error!(error = %e, "内部错误");
                "服务内部错误，请稍后重试".to_string()
            }
            Self::ConfigError(e) => {
                tracing::error!(error = %e, "卡池配置错误");
                "卡池配置异常，请联系运营".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "success": false,
            "code": self.error_code(),
            "message": message,
            "data": serde_json::Value::Null
        });

        (status, axum::Json(body)).into_response()
    }
}

/// 从 validator 错误转换
impl From<validator::ValidationErrors> for GachaError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}
