//! 抽卡引擎集成测试
//!
//! 基于进程内存储验证保底、幂等、并发提交与审计重放

mod common;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use uuid::Uuid;

use gacha_service::models::{BatchSize, GuaranteeKind, PullRecord};
use gacha_service::repository::{PityRepositoryTrait, PullCommit, PullRepositoryTrait};
use gacha_service::{
    BannerService, ChaChaDrawFactory, GachaError, MemoryStore, PullEngine, Result,
    ScriptedDrawFactory,
};
use gacha_shared::retry::RetryPolicy;

use common::{Harness, USER, limited_banner, pull_request, standard_banner};

/// 恒定 0.99 的随机流：软保底阶段也不会出最高稀有度，只有硬保底会触发
fn never_lucky() -> Arc<ScriptedDrawFactory> {
    Arc::new(ScriptedDrawFactory::new(vec![0.99]))
}

// ==================== 保底 ====================

#[tokio::test]
async fn test_ninetieth_pull_is_guaranteed_top_tier() {
    let harness = Harness::new(never_lucky(), RetryPolicy::immediate(5)).await;
    harness.set_pity("standard", 89, 89).await;

    let outcome = harness
        .engine
        .execute_pull(pull_request("standard", BatchSize::Single, "k-90"))
        .await
        .unwrap();

    let result = &outcome.record.results[0];
    assert_eq!(result.tier_id, "5-star");
    assert_eq!(result.guarantee, Some(GuaranteeKind::HardPity));
    assert_eq!(result.pity_counter_at_draw, 90);
    assert_eq!(outcome.record.pity_after.pulls_since_last_top_rarity, 0);

    let state = harness.store.load(USER, "standard").await.unwrap();
    assert_eq!(state.pulls_since_last_top_rarity, 0);
    assert_eq!(state.total_pulls, 90);
}

#[tokio::test]
async fn test_hard_pity_triggers_mid_batch() {
    let harness = Harness::new(never_lucky(), RetryPolicy::immediate(5)).await;
    harness.set_pity("standard", 85, 85).await;

    let outcome = harness
        .engine
        .execute_pull(pull_request("standard", BatchSize::Ten, "k-ten"))
        .await
        .unwrap();
    let results = &outcome.record.results;
    assert_eq!(results.len(), 10);

    // 第 5 抽是周期内第 90 抽
    for (index, result) in results.iter().enumerate() {
        if index == 4 {
            assert_eq!(result.rank, 5);
            assert_eq!(result.guarantee, Some(GuaranteeKind::HardPity));
            assert_eq!(result.pity_counter_at_draw, 90);
        } else {
            assert!(result.rank < 5, "index {} should not be top tier", index);
            assert!(result.guarantee.is_none());
        }
    }
    assert_eq!(results[5].pity_counter_at_draw, 1);
    assert_eq!(outcome.record.pity_after.pulls_since_last_top_rarity, 5);
    assert_eq!(outcome.record.pity_after.total_pulls, 95);
}

#[tokio::test]
async fn test_featured_window_forces_featured_item() {
    let harness = Harness::new(never_lucky(), RetryPolicy::immediate(5)).await;
    harness.banners.publish(limited_banner(100)).await.unwrap();
    harness.set_pity("limited", 10, 99).await;

    let outcome = harness
        .engine
        .execute_pull(pull_request("limited", BatchSize::Single, "k-featured"))
        .await
        .unwrap();

    let result = &outcome.record.results[0];
    assert_eq!(result.item_id, "char_001");
    assert!(result.featured);
    assert_eq!(result.guarantee, Some(GuaranteeKind::FeaturedGuarantee));
    assert_eq!(outcome.record.pity_after.pulls_since_last_featured, 0);
    assert_eq!(outcome.record.pity_after.pulls_since_last_top_rarity, 0);
}

#[tokio::test]
async fn test_pity_bounds_hold_over_many_pulls() {
    let harness = Harness::new(Arc::new(ChaChaDrawFactory), RetryPolicy::immediate(5)).await;
    harness.banners.publish(limited_banner(180)).await.unwrap();

    let mut since_featured = 0u32;
    let mut top_drops = 0;
    for i in 0..150 {
        let outcome = harness
            .engine
            .execute_pull(pull_request("limited", BatchSize::Ten, &format!("k-{}", i)))
            .await
            .unwrap();
        for result in &outcome.record.results {
            assert!(result.pity_counter_at_draw <= 90);
            since_featured += 1;
            if result.rank == 5 {
                top_drops += 1;
                if result.featured {
                    assert!(since_featured <= 180);
                    since_featured = 0;
                }
            }
        }
    }

    // 1500 抽至少经过 16 次硬保底周期
    assert!(top_drops >= 16);
    let state = harness.store.load(USER, "limited").await.unwrap();
    assert_eq!(state.total_pulls, 1500);
}

// ==================== 幂等 ====================

#[tokio::test]
async fn test_same_key_replays_without_side_effects() {
    let harness = Harness::new(Arc::new(ChaChaDrawFactory), RetryPolicy::immediate(5)).await;

    let first = harness
        .engine
        .execute_pull(pull_request("standard", BatchSize::Ten, "same-key"))
        .await
        .unwrap();
    let second = harness
        .engine
        .execute_pull(pull_request("standard", BatchSize::Ten, "same-key"))
        .await
        .unwrap();

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(second.attempts, 0);
    assert_eq!(first.record, second.record);

    let state = harness.store.load(USER, "standard").await.unwrap();
    assert_eq!(state.total_pulls, 10);
    let history = harness.store.list_by_user(USER, 50).await.unwrap();
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn test_same_key_with_different_request_is_rejected() {
    let harness = Harness::new(Arc::new(ChaChaDrawFactory), RetryPolicy::immediate(5)).await;
    harness.banners.publish(limited_banner(180)).await.unwrap();

    harness
        .engine
        .execute_pull(pull_request("standard", BatchSize::Single, "reused-key"))
        .await
        .unwrap();

    let err = harness
        .engine
        .execute_pull(pull_request("standard", BatchSize::Ten, "reused-key"))
        .await
        .unwrap_err();
    assert!(matches!(err, GachaError::Validation(_)));

    let err = harness
        .engine
        .execute_pull(pull_request("limited", BatchSize::Single, "reused-key"))
        .await
        .unwrap_err();
    assert!(matches!(err, GachaError::Validation(_)));

    // 没有产生新的抽卡
    let state = harness.store.load(USER, "standard").await.unwrap();
    assert_eq!(state.total_pulls, 1);
    let limited = harness.store.load(USER, "limited").await.unwrap();
    assert_eq!(limited.total_pulls, 0);
}

#[tokio::test]
async fn test_same_key_for_other_user_is_independent() {
    let harness = Harness::new(Arc::new(ChaChaDrawFactory), RetryPolicy::immediate(5)).await;

    harness
        .engine
        .execute_pull(pull_request("standard", BatchSize::Single, "shared-key"))
        .await
        .unwrap();
    let mut other = pull_request("standard", BatchSize::Single, "shared-key");
    other.user_id = "user-2".to_string();
    let outcome = harness.engine.execute_pull(other).await.unwrap();

    assert!(!outcome.replayed);
    assert_eq!(outcome.record.user_id, "user-2");
}

// ==================== 并发 ====================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_pulls_lose_no_updates() {
    let harness = Harness::new(Arc::new(ChaChaDrawFactory), RetryPolicy::immediate(64)).await;
    let engine = Arc::new(harness.engine);

    let mut handles = Vec::new();
    for task in 0..8 {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..5 {
                engine
                    .execute_pull(pull_request(
                        "standard",
                        BatchSize::Single,
                        &format!("task-{}-{}", task, i),
                    ))
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let state = harness.store.load(USER, "standard").await.unwrap();
    assert_eq!(state.total_pulls, 40);

    // 每条记录的起始计数各不相同，说明没有两次提交基于同一快照
    let records = harness.store.list_by_user(USER, 200).await.unwrap();
    assert_eq!(records.len(), 40);
    let starts: BTreeSet<u64> = records.iter().map(|r| r.pity_before.total_pulls).collect();
    assert_eq!(starts, (0..40).collect());
}

/// 前 k 次提交返回版本冲突的记录仓储
struct FlakyPullRepository {
    inner: Arc<MemoryStore>,
    conflicts: u32,
    calls: AtomicU32,
}

impl FlakyPullRepository {
    fn new(inner: Arc<MemoryStore>, conflicts: u32) -> Self {
        Self {
            inner,
            conflicts,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl PullRepositoryTrait for FlakyPullRepository {
    async fn find_by_idempotency_key(
        &self,
        user_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<PullRecord>> {
        self.inner
            .find_by_idempotency_key(user_id, idempotency_key)
            .await
    }

    async fn get_record(&self, id: Uuid) -> Result<Option<PullRecord>> {
        self.inner.get_record(id).await
    }

    async fn list_by_user(&self, user_id: &str, limit: i64) -> Result<Vec<PullRecord>> {
        self.inner.list_by_user(user_id, limit).await
    }

    async fn commit_pull(&self, commit: &PullCommit) -> Result<()> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.conflicts {
            return Err(GachaError::Conflict("pity version changed".to_string()));
        }
        self.inner.commit_pull(commit).await
    }
}

async fn flaky_engine(conflicts: u32, max_attempts: u32) -> (Arc<MemoryStore>, PullEngine) {
    let store = Arc::new(MemoryStore::new());
    let banners = Arc::new(BannerService::new(store.clone()));
    banners.publish(standard_banner()).await.unwrap();
    let engine = PullEngine::new(
        banners,
        store.clone(),
        Arc::new(FlakyPullRepository::new(store.clone(), conflicts)),
        Arc::new(ChaChaDrawFactory),
        RetryPolicy::immediate(max_attempts),
    );
    (store, engine)
}

#[tokio::test]
async fn test_conflicts_within_budget_are_retried() {
    let (store, engine) = flaky_engine(2, 5).await;

    let outcome = engine
        .execute_pull(pull_request("standard", BatchSize::Ten, "k-flaky"))
        .await
        .unwrap();

    assert_eq!(outcome.attempts, 3);
    assert!(!outcome.replayed);
    let state = store.load(USER, "standard").await.unwrap();
    assert_eq!(state.total_pulls, 10);
}

#[tokio::test]
async fn test_exhausted_retries_report_busy_and_change_nothing() {
    let (store, engine) = flaky_engine(5, 5).await;

    let err = engine
        .execute_pull(pull_request("standard", BatchSize::Ten, "k-busy"))
        .await
        .unwrap_err();

    assert!(matches!(err, GachaError::PullEngineBusy { attempts: 5 }));
    let state = store.load(USER, "standard").await.unwrap();
    assert_eq!(state.total_pulls, 0);
    assert_eq!(state.version, 0);
    assert!(store.list_by_user(USER, 50).await.unwrap().is_empty());
}

// ==================== 卡池状态 ====================

#[tokio::test]
async fn test_unknown_banner_is_not_found() {
    let harness = Harness::new(never_lucky(), RetryPolicy::immediate(5)).await;

    let err = harness
        .engine
        .execute_pull(pull_request("missing", BatchSize::Single, "k-missing"))
        .await
        .unwrap_err();
    assert!(matches!(err, GachaError::BannerNotFound(_)));
}

#[tokio::test]
async fn test_disabled_banner_is_inactive() {
    let harness = Harness::new(never_lucky(), RetryPolicy::immediate(5)).await;
    let mut banner = standard_banner();
    banner.version = 2;
    banner.enabled = false;
    harness.banners.publish(banner).await.unwrap();

    let err = harness
        .engine
        .execute_pull(pull_request("standard", BatchSize::Single, "k-disabled"))
        .await
        .unwrap_err();
    assert!(matches!(err, GachaError::BannerInactive(_)));
    let state = harness.store.load(USER, "standard").await.unwrap();
    assert_eq!(state.total_pulls, 0);
}

#[tokio::test]
async fn test_reset_pity_keeps_total_pulls() {
    let harness = Harness::new(never_lucky(), RetryPolicy::immediate(5)).await;
    harness
        .engine
        .execute_pull(pull_request("standard", BatchSize::Ten, "k-before-reset"))
        .await
        .unwrap();

    let affected = harness.engine.reset_pity_for_banner("standard").await.unwrap();
    assert_eq!(affected, 1);

    let state = harness.store.load(USER, "standard").await.unwrap();
    assert_eq!(state.pulls_since_last_top_rarity, 0);
    assert_eq!(state.pulls_since_last_featured, 0);
    assert_eq!(state.total_pulls, 10);
}

// ==================== 审计 ====================

#[tokio::test]
async fn test_audit_replays_record_against_its_banner_version() {
    let harness = Harness::new(Arc::new(ChaChaDrawFactory), RetryPolicy::immediate(5)).await;
    let outcome = harness
        .engine
        .execute_pull(pull_request("standard", BatchSize::Ten, "k-audit"))
        .await
        .unwrap();

    // 发布新版本后，旧记录仍按旧版本重放
    let mut v2 = standard_banner();
    v2.version = 2;
    v2.item_pool.insert(
        "3-star".to_string(),
        vec![gacha_service::models::PoolEntry {
            item_id: "weapon_999".to_string(),
            weight: 1.0,
            featured: false,
        }],
    );
    harness.banners.publish(v2).await.unwrap();

    let report = harness
        .engine
        .audit_record_by_id(outcome.record.id)
        .await
        .unwrap();
    assert!(report.matches);
    assert!(report.pity_matches);
    assert_eq!(report.banner_version, 1);

    let mut tampered = outcome.record.clone();
    tampered.results[3].item_id = "forged".to_string();
    let report = harness.engine.audit_record(&tampered).await.unwrap();
    assert!(!report.matches);
    assert_eq!(report.mismatched_indices, vec![3]);
}

#[tokio::test]
async fn test_published_version_cannot_be_rewritten() {
    let harness = Harness::new(Arc::new(ChaChaDrawFactory), RetryPolicy::immediate(5)).await;
    let outcome = harness
        .engine
        .execute_pull(pull_request("standard", BatchSize::Ten, "k-rewrite"))
        .await
        .unwrap();

    // 同一版本改规则后重新发布
    let mut rewritten = standard_banner();
    rewritten.item_pool.insert(
        "3-star".to_string(),
        vec![gacha_service::models::PoolEntry {
            item_id: "weapon_999".to_string(),
            weight: 1.0,
            featured: false,
        }],
    );
    let err = harness.banners.publish(rewritten).await.unwrap_err();
    assert!(matches!(err, GachaError::BannerVersionExists { version: 1, .. }));

    // 原样重复发布不受影响
    harness.banners.publish(standard_banner()).await.unwrap();

    // 不带缓存的新实例读到的仍是原配置
    let fresh = BannerService::new(harness.store.clone());
    let stored = fresh.get_banner_version("standard", 1).await.unwrap();
    assert_eq!(*stored, standard_banner());

    let report = harness
        .engine
        .audit_record_by_id(outcome.record.id)
        .await
        .unwrap();
    assert!(report.matches);
    assert!(report.mismatched_indices.is_empty());
}

#[tokio::test]
async fn test_audit_unknown_record_is_not_found() {
    let harness = Harness::new(never_lucky(), RetryPolicy::immediate(5)).await;
    let err = harness
        .engine
        .audit_record_by_id(Uuid::now_v7())
        .await
        .unwrap_err();
    assert!(matches!(err, GachaError::RecordNotFound(_)));
}
