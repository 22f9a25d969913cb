//! 集成测试公共工具
//!
//! 基于进程内存储组装服务，无需外部依赖

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use gacha_service::models::{BannerConfig, BatchSize, PityCounters, PityState};
use gacha_service::repository::{PityCommit, PityRepositoryTrait};
use gacha_service::service::{
    EnhancementPolicy, EnhancementService, FailurePolicy, PullRequest, SuccessCurve,
};
use gacha_service::{BannerService, DrawSourceFactory, MemoryStore, PullEngine};
use gacha_shared::retry::RetryPolicy;

pub const USER: &str = "user-1";
pub const ORE: &str = "enhancement_ore";

/// 三档常驻卡池：5 星 0.6%，74 抽起软保底，90 抽硬保底
pub fn standard_banner() -> BannerConfig {
    serde_json::from_value(serde_json::json!({
        "id": "standard",
        "version": 1,
        "name": "Standard",
        "tiers": [
            {"id": "5-star", "rank": 5, "baseWeight": 0.6},
            {"id": "4-star", "rank": 4, "baseWeight": 5.1},
            {"id": "3-star", "rank": 3, "baseWeight": 94.3}
        ],
        "softPityStart": 74,
        "hardPityLimit": 90,
        "itemPool": {
            "5-star": [{"itemId": "char_101", "weight": 1.0}, {"itemId": "char_102", "weight": 1.0}],
            "4-star": [{"itemId": "char_201", "weight": 1.0}],
            "3-star": [{"itemId": "weapon_701", "weight": 1.0}, {"itemId": "weapon_702", "weight": 1.0}]
        }
    }))
    .unwrap()
}

/// 带 UP 保底的限定卡池
pub fn limited_banner(window: u32) -> BannerConfig {
    serde_json::from_value(serde_json::json!({
        "id": "limited",
        "version": 1,
        "name": "Limited",
        "tiers": [
            {"id": "5-star", "rank": 5, "baseWeight": 0.6, "isFeatured": true},
            {"id": "4-star", "rank": 4, "baseWeight": 5.1},
            {"id": "3-star", "rank": 3, "baseWeight": 94.3}
        ],
        "softPityStart": 74,
        "hardPityLimit": 90,
        "featuredGuaranteeWindow": window,
        "featuredRate": 0.5,
        "itemPool": {
            "5-star": [
                {"itemId": "char_001", "weight": 1.0, "featured": true},
                {"itemId": "char_101", "weight": 1.0}
            ],
            "4-star": [{"itemId": "char_201", "weight": 1.0}],
            "3-star": [{"itemId": "weapon_701", "weight": 1.0}]
        }
    }))
    .unwrap()
}

pub fn pull_request(banner_id: &str, batch: BatchSize, key: &str) -> PullRequest {
    PullRequest {
        user_id: USER.to_string(),
        banner_id: banner_id.to_string(),
        batch_size: batch,
        idempotency_key: key.to_string(),
    }
}

/// 强化规则：每级消耗 10 + 5 * level 个矿石，失败返还一半（向上取整后扣除）
pub fn enhancement_policy(curve: SuccessCurve) -> EnhancementPolicy {
    EnhancementPolicy {
        max_level: 3,
        curve,
        material_id: ORE.to_string(),
        base_cost: 10,
        cost_per_level: 5,
        failure: FailurePolicy::ConsumeFraction(0.5),
    }
}

pub fn materials(qty: i64) -> BTreeMap<String, i64> {
    BTreeMap::from([(ORE.to_string(), qty)])
}

/// 测试用服务组合
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub banners: Arc<BannerService>,
    pub engine: PullEngine,
}

impl Harness {
    pub async fn new(draws: Arc<dyn DrawSourceFactory>, policy: RetryPolicy) -> Self {
        let store = Arc::new(MemoryStore::new());
        let banners = Arc::new(BannerService::new(store.clone()));
        banners.publish(standard_banner()).await.unwrap();
        let engine = PullEngine::new(banners.clone(), store.clone(), store.clone(), draws, policy);
        Self {
            store,
            banners,
            engine,
        }
    }

    pub fn enhancement(
        &self,
        draws: Arc<dyn DrawSourceFactory>,
        policy: EnhancementPolicy,
    ) -> EnhancementService {
        EnhancementService::new(self.store.clone(), policy, draws, RetryPolicy::immediate(5))
    }

    /// 直接写入保底计数
    pub async fn set_pity(&self, banner_id: &str, since_top: u32, since_featured: u32) -> PityState {
        let current = self.store.load(USER, banner_id).await.unwrap();
        let counters = PityCounters {
            pulls_since_last_top_rarity: since_top,
            pulls_since_last_featured: since_featured,
            total_pulls: u64::from(since_top.max(since_featured)),
        };
        self.store
            .commit(&PityCommit::new(&current, counters))
            .await
            .unwrap()
    }
}
