//! 服务层数据传输对象
//!
//! 服务层的输入与输出，与 HTTP 层的请求体解耦

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::catalog::ItemMetadata;
use crate::models::{
    BannerConfig, BatchSize, EnhancementAttempt, InventoryItem, PityState, PullRecord,
    SoftPityCurve,
};

/// 抽卡请求
#[derive(Debug, Clone)]
pub struct PullRequest {
    pub user_id: String,
    pub banner_id: String,
    pub batch_size: BatchSize,
    pub idempotency_key: String,
}

/// 抽卡结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullOutcome {
    pub record: PullRecord,
    /// 本次调用的提交尝试次数，回放时为 0
    pub attempts: u32,
    /// 是否为幂等回放
    pub replayed: bool,
}

/// 强化请求
#[derive(Debug, Clone)]
pub struct EnhanceRequest {
    pub user_id: String,
    pub inventory_item_id: Uuid,
    /// 投入的材料
    pub materials: BTreeMap<String, i64>,
    pub idempotency_key: Option<String>,
}

/// 强化结果
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancementOutcome {
    pub attempt: EnhancementAttempt,
    pub attempts: u32,
    pub replayed: bool,
    /// 提交后的物品状态（回放时为当前状态）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<InventoryItem>,
}

/// 审计重放结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub record_id: Uuid,
    pub banner_id: String,
    pub banner_version: i64,
    pub matches: bool,
    /// 与重放结果不一致的单抽序号
    pub mismatched_indices: Vec<u32>,
    /// 重放得到的保底计数是否与记录一致
    pub pity_matches: bool,
}

/// 档位概率
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierRate {
    pub tier_id: String,
    pub rank: u32,
    /// 基础概率（不含保底修正）
    pub rate: f64,
}

/// UP 物品
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeaturedItem {
    pub item_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ItemMetadata>,
}

/// 卡池信息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerInfo {
    pub id: String,
    pub version: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub active: bool,
    pub rates: Vec<TierRate>,
    pub soft_pity_start: u32,
    pub hard_pity_limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub featured_guarantee_window: Option<u32>,
    pub featured_rate: f64,
    pub soft_pity_curve: SoftPityCurve,
    pub featured_items: Vec<FeaturedItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl BannerInfo {
    pub fn from_config(
        config: &BannerConfig,
        now: DateTime<Utc>,
        featured_items: Vec<FeaturedItem>,
    ) -> Self {
        let rates = config
            .base_rates()
            .into_iter()
            .map(|(tier_id, rate)| TierRate {
                rank: config.tier(&tier_id).map(|t| t.rank).unwrap_or_default(),
                tier_id,
                rate,
            })
            .collect();

        Self {
            id: config.id.clone(),
            version: config.version,
            name: config.name.clone(),
            description: config.description.clone(),
            active: config.is_active_at(now),
            rates,
            soft_pity_start: config.soft_pity_start,
            hard_pity_limit: config.hard_pity_limit,
            featured_guarantee_window: config.featured_guarantee_window,
            featured_rate: config.featured_rate,
            soft_pity_curve: config.soft_pity_curve,
            featured_items,
            start_time: config.start_time,
            end_time: config.end_time,
        }
    }
}

/// 用户在某卡池的保底进度
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PityStatus {
    pub banner_id: String,
    pub pulls_since_last_top_rarity: u32,
    pub pulls_since_last_featured: u32,
    pub total_pulls: u64,
    /// 距硬保底还差几抽（含触发的那一抽）
    pub next_hard_pity_in: u32,
    /// 距 UP 保底还差几抽，卡池无 UP 保底时为空
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_featured_guarantee_in: Option<u32>,
    /// 下一抽出最高稀有度的概率
    pub next_top_probability: f64,
}

impl PityStatus {
    pub fn new(config: &BannerConfig, state: &PityState, next_top_probability: f64) -> Self {
        let featured_window = config
            .featured_guarantee_window
            .filter(|_| config.top_tier().is_some_and(|t| t.is_featured));

        Self {
            banner_id: config.id.clone(),
            pulls_since_last_top_rarity: state.pulls_since_last_top_rarity,
            pulls_since_last_featured: state.pulls_since_last_featured,
            total_pulls: state.total_pulls,
            next_hard_pity_in: config
                .hard_pity_limit
                .saturating_sub(state.pulls_since_last_top_rarity)
                .max(1),
            next_featured_guarantee_in: featured_window
                .map(|w| w.saturating_sub(state.pulls_since_last_featured).max(1)),
            next_top_probability,
        }
    }
}

/// 背包物品视图
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItemView {
    #[serde(flatten)]
    pub item: InventoryItem,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ItemMetadata>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn banner() -> BannerConfig {
        serde_json::from_value(serde_json::json!({
            "id": "limited",
            "version": 2,
            "name": "Limited",
            "tiers": [
                {"id": "5-star", "rank": 5, "baseWeight": 0.6, "isFeatured": true},
                {"id": "4-star", "rank": 4, "baseWeight": 5.1},
                {"id": "3-star", "rank": 3, "baseWeight": 94.3}
            ],
            "softPityStart": 74,
            "hardPityLimit": 90,
            "featuredGuaranteeWindow": 180,
            "itemPool": {
                "5-star": [
                    {"itemId": "char_001", "weight": 1.0, "featured": true},
                    {"itemId": "char_002", "weight": 1.0}
                ],
                "4-star": [{"itemId": "char_101", "weight": 1.0}],
                "3-star": [{"itemId": "weapon_101", "weight": 1.0}]
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_pity_status_countdown() {
        let config = banner();
        let mut state = PityState::zeroed("user-1", "limited");
        state.pulls_since_last_top_rarity = 89;
        state.pulls_since_last_featured = 120;

        let status = PityStatus::new(&config, &state, 1.0);
        assert_eq!(status.next_hard_pity_in, 1);
        assert_eq!(status.next_featured_guarantee_in, Some(60));
    }

    #[test]
    fn test_banner_info_rates_sorted_by_rank() {
        let info = BannerInfo::from_config(&banner(), Utc::now(), vec![]);
        let ranks: Vec<u32> = info.rates.iter().map(|r| r.rank).collect();
        assert_eq!(ranks, vec![5, 4, 3]);
        assert!((info.rates.iter().map(|r| r.rate).sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(info.active);
    }

    #[test]
    fn test_inventory_view_flattens_item() {
        let item = InventoryItem::granted("user-1", "char_001", "5-star", Uuid::now_v7(), Utc::now());
        let view = InventoryItemView {
            item,
            metadata: None,
        };
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["itemId"], "char_001");
        assert!(json.get("metadata").is_none());
    }
}
