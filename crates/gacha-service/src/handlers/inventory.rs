//! 背包与养成 API 处理器

use axum::{
    Json,
    extract::{Path, Query, State},
};
use uuid::Uuid;
use validator::Validate;

use crate::dto::{ApiResponse, EnhanceBody, HistoryQuery, InventoryQuery};
use crate::error::Result;
use crate::middleware::CallerIdentity;
use crate::models::{EnhancementAttempt, ItemType, MaterialWallet};
use crate::service::{EnhanceRequest, EnhancementOutcome, InventoryItemView};
use crate::state::AppState;

/// 背包列表
///
/// GET /api/inventory?tierId=&itemType=
pub async fn list_inventory(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<InventoryQuery>,
) -> Result<Json<ApiResponse<Vec<InventoryItemView>>>> {
    let item_type = query
        .item_type
        .as_deref()
        .map(str::parse::<ItemType>)
        .transpose()?;

    let items = state
        .queries
        .list_inventory(&caller.user_id, query.tier_id, item_type)
        .await?;
    Ok(Json(ApiResponse::success(items)))
}

/// 背包物品详情
///
/// GET /api/inventory/{id}
pub async fn get_item(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<InventoryItemView>>> {
    let item = state.queries.get_inventory_item(&caller.user_id, id).await?;
    Ok(Json(ApiResponse::success(item)))
}

/// 强化
///
/// POST /api/inventory/{id}/enhance
pub async fn enhance(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Path(id): Path<Uuid>,
    Json(body): Json<EnhanceBody>,
) -> Result<Json<ApiResponse<EnhancementOutcome>>> {
    body.validate()?;

    let outcome = state
        .enhancement
        .enhance(EnhanceRequest {
            user_id: caller.user_id,
            inventory_item_id: id,
            materials: body.materials,
            idempotency_key: body.idempotency_key,
        })
        .await?;

    let message = if outcome.attempt.success {
        "强化成功"
    } else {
        "强化失败"
    };
    Ok(Json(ApiResponse::success_with_message(outcome, message)))
}

/// 材料钱包
///
/// GET /api/inventory/materials
pub async fn wallet(
    State(state): State<AppState>,
    caller: CallerIdentity,
) -> Result<Json<ApiResponse<MaterialWallet>>> {
    let wallet = state.queries.wallet(&caller.user_id).await?;
    Ok(Json(ApiResponse::success(wallet)))
}

/// 强化记录
///
/// GET /api/inventory/enhancements?limit=
pub async fn list_enhancements(
    State(state): State<AppState>,
    caller: CallerIdentity,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<ApiResponse<Vec<EnhancementAttempt>>>> {
    let attempts = state
        .queries
        .list_enhancements(&caller.user_id, query.limit)
        .await?;
    Ok(Json(ApiResponse::success(attempts)))
}
