//! 进程内存储
//!
//! 用于本地开发与测试，实现与 PostgreSQL 仓储相同的接口和提交语义。
//! 全部状态由一把锁保护，提交在锁内先校验所有版本再整体写入，锁内不做任何 await。
//! 记录类数据按追加顺序存放在 Vec 中，通过 HashMap 索引定位。

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use super::traits::{
    BannerRepositoryTrait, EnhancementCommit, InventoryRepositoryTrait, PityCommit,
    PityRepositoryTrait, PullCommit, PullRepositoryTrait, WalletCommit,
};
use crate::error::{GachaError, Result};
use crate::models::{
    BannerConfig, EnhancementAttempt, InventoryFilter, InventoryItem, MaterialWallet, PityState,
    PullRecord,
};

type UserKey = (String, String);

#[derive(Default)]
struct MemoryState {
    /// banner_id -> 按版本排序的配置
    banners: HashMap<String, Vec<BannerConfig>>,
    /// (user_id, banner_id) -> 保底状态
    pity: HashMap<UserKey, PityState>,
    records: Vec<PullRecord>,
    record_index: HashMap<Uuid, usize>,
    /// (user_id, idempotency_key) -> records 下标
    record_keys: HashMap<UserKey, usize>,
    items: Vec<InventoryItem>,
    item_index: HashMap<Uuid, usize>,
    wallets: HashMap<String, MaterialWallet>,
    attempts: Vec<EnhancementAttempt>,
    attempt_keys: HashMap<UserKey, usize>,
}

impl MemoryState {
    fn pity_version(&self, user_id: &str, banner_id: &str) -> i64 {
        self.pity
            .get(&(user_id.to_string(), banner_id.to_string()))
            .map(|s| s.version)
            .unwrap_or(0)
    }

    fn check_pity(&self, commit: &PityCommit) -> Result<()> {
        let stored = self.pity_version(&commit.user_id, &commit.banner_id);
        if stored != commit.expected.version {
            return Err(GachaError::Conflict(format!(
                "pity user={} banner={} expected_version={} stored_version={}",
                commit.user_id, commit.banner_id, commit.expected.version, stored
            )));
        }
        Ok(())
    }

    fn wallet_version(&self, user_id: &str) -> i64 {
        self.wallets.get(user_id).map(|w| w.version).unwrap_or(0)
    }

    fn check_wallet(&self, user_id: &str, expected_version: i64) -> Result<()> {
        let stored = self.wallet_version(user_id);
        if stored != expected_version {
            return Err(GachaError::Conflict(format!(
                "wallet user={} expected_version={} stored_version={}",
                user_id, expected_version, stored
            )));
        }
        Ok(())
    }
}

/// 进程内存储
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BannerRepositoryTrait for MemoryStore {
    async fn get_banner(&self, banner_id: &str) -> Result<Option<BannerConfig>> {
        let state = self.state.lock();
        Ok(state
            .banners
            .get(banner_id)
            .and_then(|versions| versions.last().cloned()))
    }

    async fn get_banner_version(
        &self,
        banner_id: &str,
        version: i64,
    ) -> Result<Option<BannerConfig>> {
        let state = self.state.lock();
        Ok(state
            .banners
            .get(banner_id)
            .and_then(|versions| versions.iter().find(|b| b.version == version).cloned()))
    }

    async fn list_banners(&self) -> Result<Vec<BannerConfig>> {
        let state = self.state.lock();
        let mut banners: Vec<BannerConfig> = state
            .banners
            .values()
            .filter_map(|versions| versions.last().cloned())
            .collect();
        banners.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(banners)
    }

    async fn insert_banner(&self, config: &BannerConfig) -> Result<bool> {
        let mut state = self.state.lock();
        let versions = state.banners.entry(config.id.clone()).or_default();
        if versions.iter().any(|b| b.version == config.version) {
            return Ok(false);
        }
        versions.push(config.clone());
        versions.sort_by_key(|b| b.version);
        Ok(true)
    }
}

#[async_trait]
impl PityRepositoryTrait for MemoryStore {
    async fn load(&self, user_id: &str, banner_id: &str) -> Result<PityState> {
        let state = self.state.lock();
        Ok(state
            .pity
            .get(&(user_id.to_string(), banner_id.to_string()))
            .cloned()
            .unwrap_or_else(|| PityState::zeroed(user_id, banner_id)))
    }

    async fn commit(&self, commit: &PityCommit) -> Result<PityState> {
        let mut state = self.state.lock();
        state.check_pity(commit)?;
        state.pity.insert(
            (commit.user_id.clone(), commit.banner_id.clone()),
            commit.next.clone(),
        );
        Ok(commit.next.clone())
    }

    async fn reset_banner(&self, banner_id: &str) -> Result<u64> {
        let mut state = self.state.lock();
        let now = Utc::now();
        let mut affected = 0;
        for (key, pity) in state.pity.iter_mut() {
            if key.1 == banner_id {
                pity.pulls_since_last_top_rarity = 0;
                pity.pulls_since_last_featured = 0;
                pity.version += 1;
                pity.updated_at = now;
                affected += 1;
            }
        }
        Ok(affected)
    }
}

#[async_trait]
impl PullRepositoryTrait for MemoryStore {
    async fn find_by_idempotency_key(
        &self,
        user_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<PullRecord>> {
        let state = self.state.lock();
        Ok(state
            .record_keys
            .get(&(user_id.to_string(), idempotency_key.to_string()))
            .map(|&idx| state.records[idx].clone()))
    }

    async fn get_record(&self, id: Uuid) -> Result<Option<PullRecord>> {
        let state = self.state.lock();
        Ok(state
            .record_index
            .get(&id)
            .map(|&idx| state.records[idx].clone()))
    }

    async fn list_by_user(&self, user_id: &str, limit: i64) -> Result<Vec<PullRecord>> {
        let state = self.state.lock();
        Ok(state
            .records
            .iter()
            .rev()
            .filter(|r| r.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn commit_pull(&self, commit: &PullCommit) -> Result<()> {
        let mut state = self.state.lock();

        let key = (
            commit.record.user_id.clone(),
            commit.record.idempotency_key.clone(),
        );
        if state.record_keys.contains_key(&key) {
            return Err(GachaError::DuplicateIdempotencyKey(
                commit.record.idempotency_key.clone(),
            ));
        }
        state.check_pity(&commit.pity)?;

        // 校验全部通过后才写入
        state.pity.insert(
            (commit.pity.user_id.clone(), commit.pity.banner_id.clone()),
            commit.pity.next.clone(),
        );
        for item in &commit.items {
            let idx = state.items.len();
            state.items.push(item.clone());
            state.item_index.insert(item.id, idx);
        }
        let idx = state.records.len();
        state.records.push(commit.record.clone());
        state.record_index.insert(commit.record.id, idx);
        state.record_keys.insert(key, idx);

        Ok(())
    }
}

#[async_trait]
impl InventoryRepositoryTrait for MemoryStore {
    async fn get_item(&self, id: Uuid) -> Result<Option<InventoryItem>> {
        let state = self.state.lock();
        Ok(state.item_index.get(&id).map(|&idx| state.items[idx].clone()))
    }

    async fn list_items(
        &self,
        user_id: &str,
        filter: &InventoryFilter,
    ) -> Result<Vec<InventoryItem>> {
        let state = self.state.lock();
        Ok(state
            .items
            .iter()
            .rev()
            .filter(|item| item.user_id == user_id && filter.matches(item))
            .cloned()
            .collect())
    }

    async fn load_wallet(&self, user_id: &str) -> Result<MaterialWallet> {
        let state = self.state.lock();
        Ok(state
            .wallets
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| MaterialWallet::empty(user_id)))
    }

    async fn find_attempt_by_idempotency_key(
        &self,
        user_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<EnhancementAttempt>> {
        let state = self.state.lock();
        Ok(state
            .attempt_keys
            .get(&(user_id.to_string(), idempotency_key.to_string()))
            .map(|&idx| state.attempts[idx].clone()))
    }

    async fn list_attempts(&self, user_id: &str, limit: i64) -> Result<Vec<EnhancementAttempt>> {
        let state = self.state.lock();
        Ok(state
            .attempts
            .iter()
            .rev()
            .filter(|a| a.user_id == user_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn commit_enhancement(&self, commit: &EnhancementCommit) -> Result<()> {
        let mut state = self.state.lock();

        let attempt_key = commit
            .attempt
            .idempotency_key
            .as_ref()
            .map(|k| (commit.attempt.user_id.clone(), k.clone()));
        if let Some(key) = &attempt_key
            && state.attempt_keys.contains_key(key)
        {
            return Err(GachaError::DuplicateIdempotencyKey(key.1.clone()));
        }

        let item_idx = *state
            .item_index
            .get(&commit.item_next.id)
            .ok_or(GachaError::NotOwned(commit.item_next.id))?;
        let stored_item_version = state.items[item_idx].version;
        if stored_item_version != commit.item_expected_version {
            return Err(GachaError::Conflict(format!(
                "inventory item={} expected_version={} stored_version={}",
                commit.item_next.id, commit.item_expected_version, stored_item_version
            )));
        }
        state.check_wallet(&commit.wallet_next.user_id, commit.wallet_expected_version)?;

        state.items[item_idx] = commit.item_next.clone();
        state
            .wallets
            .insert(commit.wallet_next.user_id.clone(), commit.wallet_next.clone());
        let idx = state.attempts.len();
        state.attempts.push(commit.attempt.clone());
        if let Some(key) = attempt_key {
            state.attempt_keys.insert(key, idx);
        }

        Ok(())
    }

    async fn commit_wallet(&self, commit: &WalletCommit) -> Result<MaterialWallet> {
        let mut state = self.state.lock();
        state.check_wallet(&commit.next.user_id, commit.expected_version)?;
        state
            .wallets
            .insert(commit.next.user_id.clone(), commit.next.clone());
        Ok(commit.next.clone())
    }
}
