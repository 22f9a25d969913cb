//! 管理 API 处理器
//!
//! 卡池发布、保底迁移、材料发放与抽卡审计，均需 API Key

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::dto::{ApiResponse, GrantMaterialsBody, PityResetResponse};
use crate::error::{GachaError, Result};
use crate::models::{BannerConfig, MaterialWallet};
use crate::service::{AuditReport, BannerInfo};
use crate::state::AppState;

/// 发布卡池配置
///
/// PUT /api/admin/banners
pub async fn publish_banner(
    State(state): State<AppState>,
    Json(config): Json<BannerConfig>,
) -> Result<Json<ApiResponse<BannerInfo>>> {
    // 管理端提交的配置不合法属于请求错误
    let banner = state.banners.publish(config).await.map_err(|e| match e {
        GachaError::ConfigError(message) => GachaError::Validation(message),
        other => other,
    })?;
    let info = state.queries.get_banner_info(&banner.id).await?;
    Ok(Json(ApiResponse::success_with_message(info, "卡池已发布")))
}

/// 重置某卡池下所有用户的保底计数
///
/// POST /api/admin/banners/{id}/pity/reset
pub async fn reset_pity(
    State(state): State<AppState>,
    Path(banner_id): Path<String>,
) -> Result<Json<ApiResponse<PityResetResponse>>> {
    let affected_users = state.pull_engine.reset_pity_for_banner(&banner_id).await?;
    info!(banner_id = %banner_id, affected_users, "管理端重置保底");
    Ok(Json(ApiResponse::success(PityResetResponse {
        banner_id,
        affected_users,
    })))
}

/// 发放养成材料
///
/// POST /api/admin/materials/grant
pub async fn grant_materials(
    State(state): State<AppState>,
    Json(body): Json<GrantMaterialsBody>,
) -> Result<Json<ApiResponse<MaterialWallet>>> {
    body.validate()?;
    let wallet = state
        .enhancement
        .grant_materials(&body.user_id, body.materials)
        .await?;
    Ok(Json(ApiResponse::success(wallet)))
}

/// 审计重放一条抽卡记录
///
/// GET /api/admin/pulls/{id}/audit
pub async fn audit_record(
    State(state): State<AppState>,
    Path(record_id): Path<Uuid>,
) -> Result<Json<ApiResponse<AuditReport>>> {
    let report = state.pull_engine.audit_record_by_id(record_id).await?;
    Ok(Json(ApiResponse::success(report)))
}
