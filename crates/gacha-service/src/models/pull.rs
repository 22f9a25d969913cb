//! 抽卡记录实体定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::GuaranteeKind;
use super::pity::PityCounters;

/// 单抽结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResult {
    /// 在本次批量中的序号（0-based）
    pub index: u32,
    pub tier_id: String,
    pub rank: u32,
    pub item_id: String,
    pub featured: bool,
    /// 抽取时处于当前保底周期的第几抽（1-based）
    pub pity_counter_at_draw: u32,
    /// 被哪种保底强制出货，自然出货为空
    pub guarantee: Option<GuaranteeKind>,
    /// 发放到背包后的实例 ID
    pub inventory_item_id: Uuid,
}

/// 抽卡记录
///
/// 写入后不可修改，既是审计流水也是幂等凭据
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRecord {
    pub id: Uuid,
    pub user_id: String,
    pub banner_id: String,
    pub banner_version: i64,
    pub batch_size: u32,
    pub results: Vec<PullResult>,
    pub pity_before: PityCounters,
    pub pity_after: PityCounters,
    /// 本次提交所用随机流的种子，审计重放时使用
    pub rng_seed: u64,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

impl PullRecord {
    /// 本次批量中最高稀有度的出货数
    pub fn top_rarity_count(&self, top_rank: u32) -> usize {
        self.results.iter().filter(|r| r.rank == top_rank).count()
    }
}
