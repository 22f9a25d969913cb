//! 应用状态定义
//!
//! 包含 Axum 路由共享的服务实例，通过 Arc 在 handler 间共享

use std::sync::Arc;

use sqlx::PgPool;

use gacha_shared::config::AppConfig;
use gacha_shared::retry::RetryPolicy;

use crate::banner::BannerService;
use crate::catalog::ItemCatalog;
use crate::error::Result;
use crate::identity::IdentityVerifier;
use crate::middleware::hash_api_key;
use crate::repository::{
    BannerRepository, BannerRepositoryTrait, InventoryRepository, InventoryRepositoryTrait,
    MemoryStore, PityRepository, PityRepositoryTrait, PullRepository, PullRepositoryTrait,
};
use crate::resolver::DrawSourceFactory;
use crate::service::{EnhancementPolicy, EnhancementService, GachaQueryService, PullEngine};

/// 一组仓储实现
#[derive(Clone)]
pub struct Repositories {
    pub banners: Arc<dyn BannerRepositoryTrait>,
    pub pity: Arc<dyn PityRepositoryTrait>,
    pub pulls: Arc<dyn PullRepositoryTrait>,
    pub inventory: Arc<dyn InventoryRepositoryTrait>,
}

impl Repositories {
    /// PostgreSQL 仓储
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            banners: Arc::new(BannerRepository::new(pool.clone())),
            pity: Arc::new(PityRepository::new(pool.clone())),
            pulls: Arc::new(PullRepository::new(pool.clone())),
            inventory: Arc::new(InventoryRepository::new(pool)),
        }
    }

    /// 进程内存储，四个接口共用同一个实例
    pub fn memory(store: Arc<MemoryStore>) -> Self {
        Self {
            banners: store.clone(),
            pity: store.clone(),
            pulls: store.clone(),
            inventory: store,
        }
    }
}

/// Axum 应用共享状态
#[derive(Clone)]
pub struct AppState {
    pub banners: Arc<BannerService>,
    pub pull_engine: Arc<PullEngine>,
    pub enhancement: Arc<EnhancementService>,
    pub queries: Arc<GachaQueryService>,
    pub catalog: Arc<dyn ItemCatalog>,
    pub identity: Arc<dyn IdentityVerifier>,
    /// 管理接口 API Key 的 SHA256 摘要，未配置时管理接口全部拒绝
    pub admin_api_key_hash: Option<Arc<str>>,
}

impl AppState {
    /// 按配置组装全部服务
    pub fn build(
        config: &AppConfig,
        repos: Repositories,
        catalog: Arc<dyn ItemCatalog>,
        identity: Arc<dyn IdentityVerifier>,
        draws: Arc<dyn DrawSourceFactory>,
    ) -> Result<Self> {
        let retry_policy = RetryPolicy::from(&config.gacha);
        let banners = Arc::new(BannerService::new(repos.banners.clone()));

        let pull_engine = Arc::new(PullEngine::new(
            banners.clone(),
            repos.pity.clone(),
            repos.pulls.clone(),
            draws.clone(),
            retry_policy.clone(),
        ));

        let policy = EnhancementPolicy::try_from(&config.enhancement)?;
        let enhancement = Arc::new(EnhancementService::new(
            repos.inventory.clone(),
            policy,
            draws,
            retry_policy,
        ));

        let queries = Arc::new(GachaQueryService::new(
            banners.clone(),
            repos.pity,
            repos.pulls,
            repos.inventory,
            catalog.clone(),
            config.gacha.history_default_limit,
        ));

        Ok(Self {
            banners,
            pull_engine,
            enhancement,
            queries,
            catalog,
            identity,
            admin_api_key_hash: config
                .auth
                .admin_api_key
                .as_deref()
                .filter(|key| !key.is_empty())
                .map(|key| Arc::from(hash_api_key(key))),
        })
    }
}
