//! 抽卡 API 处理器
//!
//! 抽卡、卡池信息、保底进度与抽卡历史

use axum::{
    Json,
    extract::{Path, Query, State},
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::{ApiResponse, HistoryQuery, PullBody, PullResponse};
use crate::error::Result;
use crate::middleware::CallerIdentity;
use crate::models::{BatchSize, PullRecord};
use crate::service::{BannerInfo, PityStatus, PullRequest};
use crate::state::AppState;

/// 抽卡
///
/// POST /api/gacha/pull
pub async fn pull(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Json(body): Json<PullBody>,
) -> Result<Json<ApiResponse<PullResponse>>> {
    body.validate()?;
    let batch_size = BatchSize::try_from(body.batch_size)?;

    let outcome = state
        .pull_engine
        .execute_pull(PullRequest {
            user_id: caller.user_id,
            banner_id: body.banner_id,
            batch_size,
            idempotency_key: body.idempotency_key,
        })
        .await?;

    let response = PullResponse::new(
        outcome.record,
        outcome.attempts,
        outcome.replayed,
        state.catalog.as_ref(),
    );
    Ok(Json(ApiResponse::success(response)))
}

/// 卡池列表
///
/// GET /api/gacha/banners
pub async fn list_banners(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<BannerInfo>>>> {
    let banners = state.queries.list_banners().await?;
    Ok(Json(ApiResponse::success(banners)))
}

/// 卡池详情（含概率表）
///
/// GET /api/gacha/banners/{id}
pub async fn get_banner(
    State(state): State<AppState>,
    Path(banner_id): Path<String>,
) -> Result<Json<ApiResponse<BannerInfo>>> {
    let info = state.queries.get_banner_info(&banner_id).await?;
    Ok(Json(ApiResponse::success(info)))
}

/// 当前用户的保底进度
///
/// GET /api/gacha/banners/{id}/pity
pub async fn pity_status(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(banner_id): Path<String>,
) -> Result<Json<ApiResponse<PityStatus>>> {
    let status = state
        .queries
        .pity_status(&caller.user_id, &banner_id)
        .await?;
    Ok(Json(ApiResponse::success(status)))
}

/// 抽卡历史
///
/// GET /api/gacha/history?limit=
pub async fn history(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<Vec<PullRecord>>>> {
    let records = state.queries.history(&caller.user_id, query.limit).await?;
    Ok(Json(ApiResponse::success(records)))
}

/// 单条抽卡记录
///
/// GET /api/gacha/history/{id}
pub async fn get_record(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(record_id): Path<Uuid>,
) -> Result<Json<ApiResponse<PullRecord>>> {
    let record = state.queries.get_record(&caller.user_id, record_id).await?;
    Ok(Json(ApiResponse::success(record)))
}
