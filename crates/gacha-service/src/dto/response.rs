//! 响应 DTO 定义

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::catalog::{ItemCatalog, ItemMetadata};
use crate::models::{PityCounters, PullRecord, PullResult};

/// API 统一响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    /// 创建成功响应
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: "操作成功".to_string(),
            data: Some(data),
        }
    }

    /// 创建成功响应（自定义消息）
    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            code: "SUCCESS".to_string(),
            message: message.into(),
            data: Some(data),
        }
    }
}

/// 单抽结果视图
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResultView {
    #[serde(flatten)]
    pub result: PullResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ItemMetadata>,
}

/// 抽卡响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    pub record_id: Uuid,
    pub banner_id: String,
    pub banner_version: i64,
    pub batch_size: u32,
    pub results: Vec<PullResultView>,
    pub pity_after: PityCounters,
    pub attempts: u32,
    pub replayed: bool,
    pub created_at: DateTime<Utc>,
}

impl PullResponse {
    pub fn new(
        record: PullRecord,
        attempts: u32,
        replayed: bool,
        catalog: &dyn ItemCatalog,
    ) -> Self {
        let results = record
            .results
            .into_iter()
            .map(|result| PullResultView {
                metadata: catalog.get_item_metadata(&result.item_id),
                result,
            })
            .collect();

        Self {
            record_id: record.id,
            banner_id: record.banner_id,
            banner_version: record.banner_version,
            batch_size: record.batch_size,
            results,
            pity_after: record.pity_after,
            attempts,
            replayed,
            created_at: record.created_at,
        }
    }
}

/// 保底重置响应
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PityResetResponse {
    pub banner_id: String,
    pub affected_users: u64,
}
