//! 保底状态实体定义

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 保底计数器
///
/// 解析器只读写这三个计数，版本号由存储层维护
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PityCounters {
    /// 距上次最高稀有度的抽数
    pub pulls_since_last_top_rarity: u32,
    /// 距上次 UP 物品的抽数
    pub pulls_since_last_featured: u32,
    /// 该卡池累计抽数，只增不减
    pub total_pulls: u64,
}

/// 用户在某个卡池的保底状态
///
/// 以 (user_id, banner_id) 为键，首次读取时惰性创建为全零状态（version = 0）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PityState {
    pub user_id: String,
    pub banner_id: String,
    pub pulls_since_last_top_rarity: u32,
    pub pulls_since_last_featured: u32,
    pub total_pulls: u64,
    /// 乐观并发版本号，0 表示从未提交过
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl PityState {
    /// 创建全零状态
    pub fn zeroed(user_id: &str, banner_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            banner_id: banner_id.to_string(),
            pulls_since_last_top_rarity: 0,
            pulls_since_last_featured: 0,
            total_pulls: 0,
            version: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn counters(&self) -> PityCounters {
        PityCounters {
            pulls_since_last_top_rarity: self.pulls_since_last_top_rarity,
            pulls_since_last_featured: self.pulls_since_last_featured,
            total_pulls: self.total_pulls,
        }
    }

    /// 基于当前状态生成下一个版本
    pub fn advance(&self, counters: PityCounters) -> Self {
        Self {
            user_id: self.user_id.clone(),
            banner_id: self.banner_id.clone(),
            pulls_since_last_top_rarity: counters.pulls_since_last_top_rarity,
            pulls_since_last_featured: counters.pulls_since_last_featured,
            total_pulls: counters.total_pulls,
            version: self.version + 1,
            updated_at: Utc::now(),
        }
    }
}
