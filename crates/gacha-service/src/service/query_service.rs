//! 查询服务
//!
//! 只读操作：卡池信息、保底进度、抽卡历史、背包与钱包

use std::sync::Arc;

use chrono::Utc;
use tracing::instrument;
use uuid::Uuid;

use crate::banner::BannerService;
use crate::catalog::ItemCatalog;
use crate::error::{GachaError, Result};
use crate::models::{
    BannerConfig, EnhancementAttempt, InventoryFilter, InventoryItem, ItemType, MaterialWallet,
    PullRecord,
};
use crate::repository::{InventoryRepositoryTrait, PityRepositoryTrait, PullRepositoryTrait};
use crate::resolver::top_probability;
use crate::service::dto::{BannerInfo, FeaturedItem, InventoryItemView, PityStatus};

/// 历史查询条数上限
const MAX_HISTORY_LIMIT: i64 = 200;

/// 查询服务
pub struct GachaQueryService {
    banners: Arc<BannerService>,
    pity_repo: Arc<dyn PityRepositoryTrait>,
    pull_repo: Arc<dyn PullRepositoryTrait>,
    inventory: Arc<dyn InventoryRepositoryTrait>,
    catalog: Arc<dyn ItemCatalog>,
    default_limit: i64,
}

impl GachaQueryService {
    pub fn new(
        banners: Arc<BannerService>,
        pity_repo: Arc<dyn PityRepositoryTrait>,
        pull_repo: Arc<dyn PullRepositoryTrait>,
        inventory: Arc<dyn InventoryRepositoryTrait>,
        catalog: Arc<dyn ItemCatalog>,
        default_limit: i64,
    ) -> Self {
        Self {
            banners,
            pity_repo,
            pull_repo,
            inventory,
            catalog,
            default_limit: default_limit.clamp(1, MAX_HISTORY_LIMIT),
        }
    }

    // ==================== 卡池 ====================

    pub async fn list_banners(&self) -> Result<Vec<BannerInfo>> {
        let now = Utc::now();
        let banners = self.banners.list_banners().await?;
        Ok(banners
            .iter()
            .map(|b| BannerInfo::from_config(b, now, self.featured_items(b)))
            .collect())
    }

    pub async fn get_banner_info(&self, banner_id: &str) -> Result<BannerInfo> {
        let banner = self.banners.get_banner(banner_id).await?;
        Ok(BannerInfo::from_config(
            &banner,
            Utc::now(),
            self.featured_items(&banner),
        ))
    }

    fn featured_items(&self, banner: &BannerConfig) -> Vec<FeaturedItem> {
        banner
            .featured_items()
            .into_iter()
            .map(|e| FeaturedItem {
                item_id: e.item_id.clone(),
                metadata: self.catalog.get_item_metadata(&e.item_id),
            })
            .collect()
    }

    // ==================== 保底与历史 ====================

    #[instrument(skip(self))]
    pub async fn pity_status(&self, user_id: &str, banner_id: &str) -> Result<PityStatus> {
        let banner = self.banners.get_banner(banner_id).await?;
        let state = self.pity_repo.load(user_id, banner_id).await?;
        let next = top_probability(&banner, state.pulls_since_last_top_rarity.saturating_add(1));
        Ok(PityStatus::new(&banner, &state, next))
    }

    pub async fn history(&self, user_id: &str, limit: Option<i64>) -> Result<Vec<PullRecord>> {
        let limit = self.clamp_limit(limit);
        self.pull_repo.list_by_user(user_id, limit).await
    }

    /// 读取用户自己的抽卡记录
    pub async fn get_record(&self, user_id: &str, record_id: Uuid) -> Result<PullRecord> {
        self.pull_repo
            .get_record(record_id)
            .await?
            .filter(|r| r.user_id == user_id)
            .ok_or(GachaError::RecordNotFound(record_id))
    }

    // ==================== 背包 ====================

    pub async fn list_inventory(
        &self,
        user_id: &str,
        tier_id: Option<String>,
        item_type: Option<ItemType>,
    ) -> Result<Vec<InventoryItemView>> {
        let filter = InventoryFilter {
            tier_id,
            item_ids: item_type.map(|t| self.catalog.item_ids_of_type(t)),
        };
        let items = self.inventory.list_items(user_id, &filter).await?;
        Ok(items.into_iter().map(|item| self.view(item)).collect())
    }

    pub async fn get_inventory_item(&self, user_id: &str, id: Uuid) -> Result<InventoryItemView> {
        let item = self
            .inventory
            .get_item(id)
            .await?
            .filter(|item| item.user_id == user_id)
            .ok_or(GachaError::NotOwned(id))?;
        Ok(self.view(item))
    }

    pub async fn wallet(&self, user_id: &str) -> Result<MaterialWallet> {
        self.inventory.load_wallet(user_id).await
    }

    pub async fn list_enhancements(
        &self,
        user_id: &str,
        limit: Option<i64>,
    ) -> Result<Vec<EnhancementAttempt>> {
        let limit = self.clamp_limit(limit);
        self.inventory.list_attempts(user_id, limit).await
    }

    fn view(&self, item: InventoryItem) -> InventoryItemView {
        let metadata = self.catalog.get_item_metadata(&item.item_id);
        InventoryItemView { item, metadata }
    }

    fn clamp_limit(&self, limit: Option<i64>) -> i64 {
        limit
            .unwrap_or(self.default_limit)
            .clamp(1, MAX_HISTORY_LIMIT)
    }
}
