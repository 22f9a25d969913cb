//! 请求 DTO 定义
//!
//! REST API 的请求体与查询参数

use std::collections::BTreeMap;

use serde::Deserialize;
use validator::Validate;

/// 抽卡请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PullBody {
    #[validate(length(min = 1, max = 64, message = "卡池 ID 长度必须在1-64个字符之间"))]
    pub banner_id: String,
    /// 只允许 1 或 10，由服务层转换为 BatchSize
    pub batch_size: u32,
    #[validate(length(min = 1, max = 128, message = "幂等键长度必须在1-128个字符之间"))]
    pub idempotency_key: String,
}

/// 强化请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EnhanceBody {
    /// 投入的材料：材料 ID -> 数量
    pub materials: BTreeMap<String, i64>,
    #[validate(length(min = 1, max = 128, message = "幂等键长度必须在1-128个字符之间"))]
    pub idempotency_key: Option<String>,
}

/// 运维发放材料请求
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GrantMaterialsBody {
    #[validate(length(min = 1, max = 128, message = "用户 ID 长度必须在1-128个字符之间"))]
    pub user_id: String,
    pub materials: BTreeMap<String, i64>,
}

/// 历史查询参数
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

/// 背包查询参数
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryQuery {
    pub tier_id: Option<String>,
    /// CHARACTER / WEAPON / MATERIAL，大小写不敏感
    pub item_type: Option<String>,
}
