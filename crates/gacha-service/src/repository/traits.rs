//! 仓储 Trait 定义
//!
//! 服务层依赖抽象而非具体实现，PostgreSQL 与进程内存储实现同一组接口。
//! 所有写操作都是带版本校验的整体提交：版本不符返回 `Conflict`，且不落任何数据。

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    BannerConfig, EnhancementAttempt, InventoryFilter, InventoryItem, MaterialWallet, PityCounters,
    PityState, PullRecord,
};

/// 保底状态提交
///
/// 存储中的版本必须等于 `expected.version`，否则返回 `Conflict`
#[derive(Debug, Clone, PartialEq)]
pub struct PityCommit {
    pub user_id: String,
    pub banner_id: String,
    pub expected: PityState,
    pub next: PityState,
}

impl PityCommit {
    pub fn new(expected: &PityState, counters: PityCounters) -> Self {
        Self {
            user_id: expected.user_id.clone(),
            banner_id: expected.banner_id.clone(),
            expected: expected.clone(),
            next: expected.advance(counters),
        }
    }
}

/// 一次抽卡的整体提交：保底状态 + 发放物品 + 抽卡记录
#[derive(Debug, Clone)]
pub struct PullCommit {
    pub pity: PityCommit,
    pub items: Vec<InventoryItem>,
    pub record: PullRecord,
}

/// 一次强化的整体提交：物品等级 + 材料钱包 + 强化记录
#[derive(Debug, Clone)]
pub struct EnhancementCommit {
    pub item_expected_version: i64,
    pub item_next: InventoryItem,
    pub wallet_expected_version: i64,
    pub wallet_next: MaterialWallet,
    pub attempt: EnhancementAttempt,
}

/// 材料钱包提交（运维发放材料）
#[derive(Debug, Clone)]
pub struct WalletCommit {
    pub expected_version: i64,
    pub next: MaterialWallet,
}

/// 卡池配置仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BannerRepositoryTrait: Send + Sync {
    /// 卡池的最新版本
    async fn get_banner(&self, banner_id: &str) -> Result<Option<BannerConfig>>;
    /// 卡池的指定版本（审计重放）
    async fn get_banner_version(&self, banner_id: &str, version: i64)
    -> Result<Option<BannerConfig>>;
    /// 全部卡池的最新版本
    async fn list_banners(&self) -> Result<Vec<BannerConfig>>;
    /// 写入一个新版本
    ///
    /// 已发布的版本不可修改：(id, version) 已存在时不写入并返回 false
    async fn insert_banner(&self, config: &BannerConfig) -> Result<bool>;
}

/// 保底状态仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PityRepositoryTrait: Send + Sync {
    /// 读取保底状态，不存在时返回全零状态（version = 0）
    async fn load(&self, user_id: &str, banner_id: &str) -> Result<PityState>;
    /// 单独提交保底状态
    async fn commit(&self, commit: &PityCommit) -> Result<PityState>;
    /// 重置某卡池下所有用户的计数（版本号递增），返回受影响的用户数
    async fn reset_banner(&self, banner_id: &str) -> Result<u64>;
}

/// 抽卡记录仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PullRepositoryTrait: Send + Sync {
    async fn find_by_idempotency_key(
        &self,
        user_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<PullRecord>>;
    async fn get_record(&self, id: Uuid) -> Result<Option<PullRecord>>;
    async fn list_by_user(&self, user_id: &str, limit: i64) -> Result<Vec<PullRecord>>;
    /// 原子提交保底、物品与记录
    ///
    /// 保底版本不符返回 `Conflict`，幂等键已存在返回 `DuplicateIdempotencyKey`
    async fn commit_pull(&self, commit: &PullCommit) -> Result<()>;
}

/// 背包与养成仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InventoryRepositoryTrait: Send + Sync {
    async fn get_item(&self, id: Uuid) -> Result<Option<InventoryItem>>;
    async fn list_items(
        &self,
        user_id: &str,
        filter: &InventoryFilter,
    ) -> Result<Vec<InventoryItem>>;
    /// 读取材料钱包，不存在时返回空钱包（version = 0）
    async fn load_wallet(&self, user_id: &str) -> Result<MaterialWallet>;
    async fn find_attempt_by_idempotency_key(
        &self,
        user_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<EnhancementAttempt>>;
    async fn list_attempts(&self, user_id: &str, limit: i64) -> Result<Vec<EnhancementAttempt>>;
    /// 原子提交物品、钱包与强化记录
    async fn commit_enhancement(&self, commit: &EnhancementCommit) -> Result<()>;
    async fn commit_wallet(&self, commit: &WalletCommit) -> Result<MaterialWallet>;
}

