//! 卡池配置实体定义
//!
//! 卡池配置是只读的版本化数据，一次抽卡请求内持有同一个版本

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 稀有度档位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RarityTier {
    /// 档位 ID（如 "5-star"）
    pub id: String,
    /// 排序等级，数值最大的档位为最高稀有度
    pub rank: u32,
    /// 基础权重
    pub base_weight: f64,
    /// 是否存在 UP 物品
    #[serde(default)]
    pub is_featured: bool,
}

/// 物品池条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolEntry {
    pub item_id: String,
    /// 档位内的相对权重
    pub weight: f64,
    /// 是否为 UP 物品
    #[serde(default)]
    pub featured: bool,
}

/// 软保底曲线
///
/// 从 soft_pity_start 到 hard_pity_limit - 1，最高稀有度概率单调上升
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SoftPityCurve {
    /// 线性逼近 1
    #[default]
    Linear,
    /// 幂函数逼近 1，exponent > 1 时前期上升慢、后期上升快
    Power { exponent: f64 },
    /// 每抽固定增加 increment
    Step { increment: f64 },
}

fn default_featured_rate() -> f64 {
    0.5
}

fn default_enabled() -> bool {
    true
}

fn default_version() -> i64 {
    1
}

/// 卡池配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BannerConfig {
    pub id: String,
    /// 配置版本，每次修改规则时递增
    #[serde(default = "default_version")]
    pub version: i64,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub tiers: Vec<RarityTier>,
    /// 软保底起始抽数（1-based）
    pub soft_pity_start: u32,
    /// 硬保底抽数（1-based），达到时必出最高稀有度
    pub hard_pity_limit: u32,
    /// UP 保底窗口：连续这么多抽内必出一次 UP
    #[serde(default)]
    pub featured_guarantee_window: Option<u32>,
    /// 未触发 UP 保底时，最高稀有度落在 UP 物品上的概率
    #[serde(default = "default_featured_rate")]
    pub featured_rate: f64,
    #[serde(default)]
    pub soft_pity_curve: SoftPityCurve,
    /// 档位 ID -> 物品池
    pub item_pool: BTreeMap<String, Vec<PoolEntry>>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl BannerConfig {
    /// 最高稀有度档位
    pub fn top_tier(&self) -> Option<&RarityTier> {
        self.tiers.iter().max_by_key(|t| t.rank)
    }

    pub fn tier(&self, tier_id: &str) -> Option<&RarityTier> {
        self.tiers.iter().find(|t| t.id == tier_id)
    }

    pub fn pool(&self, tier_id: &str) -> &[PoolEntry] {
        self.item_pool
            .get(tier_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn total_base_weight(&self) -> f64 {
        self.tiers.iter().map(|t| t.base_weight).sum()
    }

    /// 检查卡池在指定时间是否开放
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        if !self.enabled {
            return false;
        }
        if self.start_time.is_some_and(|t| now < t) {
            return false;
        }
        if self.end_time.is_some_and(|t| now >= t) {
            return false;
        }
        true
    }

    /// 各档位的基础概率（不含保底修正），按 rank 从高到低
    pub fn base_rates(&self) -> Vec<(String, f64)> {
        let total = self.total_base_weight();
        let mut tiers: Vec<&RarityTier> = self.tiers.iter().collect();
        tiers.sort_by(|a, b| b.rank.cmp(&a.rank));
        tiers
            .into_iter()
            .map(|t| {
                let rate = if total > 0.0 { t.base_weight / total } else { 0.0 };
                (t.id.clone(), rate)
            })
            .collect()
    }

    /// 卡池中全部 UP 物品
    pub fn featured_items(&self) -> Vec<&PoolEntry> {
        self.item_pool
            .values()
            .flatten()
            .filter(|e| e.featured)
            .collect()
    }
}
