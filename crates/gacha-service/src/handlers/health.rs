//! 健康检查

use axum::Json;

/// 存活探针
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "gacha-service"
    }))
}
