//! 抽卡引擎
//!
//! 一次抽卡请求的完整流程：
//!
//! 1. 幂等检查：同一用户同一幂等键已有记录则原样返回
//! 2. 加载卡池配置，整个调用（含重试）只加载一次
//! 3. 读取保底快照
//! 4. 批量解析：每次提交尝试使用新种子的随机流，批内计数逐抽传递
//! 5. 整体提交：保底（版本校验）+ 背包发放 + 抽卡记录
//! 6. 版本冲突回到第 3 步，按尝试次数封顶；提交时发现幂等键冲突则回读并回放

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use gacha_shared::observability::metrics;
use gacha_shared::retry::RetryPolicy;

use crate::banner::BannerService;
use crate::error::{GachaError, Result};
use crate::models::{BannerConfig, InventoryItem, PityState, PullRecord, PullResult};
use crate::repository::{PityCommit, PityRepositoryTrait, PullCommit, PullRepositoryTrait};
use crate::resolver::{DrawSourceFactory, resolve_batch};
use crate::service::dto::{AuditReport, PullOutcome, PullRequest};

/// 幂等键最大长度
const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// 抽卡引擎
pub struct PullEngine {
    banners: Arc<BannerService>,
    pity_repo: Arc<dyn PityRepositoryTrait>,
    pull_repo: Arc<dyn PullRepositoryTrait>,
    draws: Arc<dyn DrawSourceFactory>,
    retry_policy: RetryPolicy,
}

impl PullEngine {
    pub fn new(
        banners: Arc<BannerService>,
        pity_repo: Arc<dyn PityRepositoryTrait>,
        pull_repo: Arc<dyn PullRepositoryTrait>,
        draws: Arc<dyn DrawSourceFactory>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            banners,
            pity_repo,
            pull_repo,
            draws,
            retry_policy,
        }
    }

    /// 执行一次抽卡（单抽或十连）
    #[instrument(
        skip(self, request),
        fields(
            user_id = %request.user_id,
            banner_id = %request.banner_id,
            batch_size = request.batch_size.count()
        )
    )]
    pub async fn execute_pull(&self, request: PullRequest) -> Result<PullOutcome> {
        let started = Instant::now();
        let result = self.execute_pull_inner(&request).await;

        let status = match &result {
            Ok(outcome) if outcome.replayed => "replayed",
            Ok(_) => "success",
            Err(e) => e.error_code(),
        };
        metrics::record_pull(
            &request.banner_id,
            request.batch_size.count(),
            status,
            started.elapsed().as_secs_f64(),
        );

        result
    }

    async fn execute_pull_inner(&self, request: &PullRequest) -> Result<PullOutcome> {
        validate_idempotency_key(&request.idempotency_key)?;

        // 1. 幂等检查
        if let Some(record) = self
            .pull_repo
            .find_by_idempotency_key(&request.user_id, &request.idempotency_key)
            .await?
        {
            ensure_same_request(&record, request)?;
            info!(idempotency_key = %request.idempotency_key, "幂等请求，返回已存在的抽卡记录");
            return Ok(PullOutcome {
                record,
                attempts: 0,
                replayed: true,
            });
        }

        // 2. 卡池配置在本次调用内保持不变
        let banner = self.banners.get_active_banner(&request.banner_id).await?;

        let mut attempts: u32 = 0;
        loop {
            attempts += 1;

            // 3. 保底快照
            let snapshot = self
                .pity_repo
                .load(&request.user_id, &request.banner_id)
                .await?;

            // 4. 批量解析
            let commit = self.build_commit(request, &banner, &snapshot)?;

            // 5. 整体提交
            match self.pull_repo.commit_pull(&commit).await {
                Ok(()) => {
                    self.record_drops(&banner, &commit.record);
                    info!(
                        record_id = %commit.record.id,
                        attempts,
                        since_top = commit.record.pity_after.pulls_since_last_top_rarity,
                        "抽卡提交成功"
                    );
                    return Ok(PullOutcome {
                        record: commit.record,
                        attempts,
                        replayed: false,
                    });
                }
                Err(GachaError::Conflict(detail)) => {
                    metrics::record_commit_conflict("pull");
                    // 6. 冲突重试
                    if !self.retry_policy.should_retry(attempts) {
                        warn!(attempts, detail = %detail, "保底提交冲突次数达到上限");
                        return Err(GachaError::PullEngineBusy { attempts });
                    }
                    let delay = self.retry_policy.delay_for_attempt(attempts - 1);
                    warn!(
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        detail = %detail,
                        "保底提交冲突，重新读取后重试"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(GachaError::DuplicateIdempotencyKey(key)) => {
                    // 并发的同键请求已先提交，回放它的结果
                    let record = self
                        .pull_repo
                        .find_by_idempotency_key(&request.user_id, &key)
                        .await?
                        .ok_or_else(|| {
                            GachaError::Internal(format!("幂等键 {} 冲突但未找到已有记录", key))
                        })?;
                    ensure_same_request(&record, request)?;
                    info!(idempotency_key = %key, "并发幂等请求，回放已提交的抽卡记录");
                    return Ok(PullOutcome {
                        record,
                        attempts,
                        replayed: true,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// 基于保底快照解析整个批次并组装提交内容
    fn build_commit(
        &self,
        request: &PullRequest,
        banner: &BannerConfig,
        snapshot: &PityState,
    ) -> Result<PullCommit> {
        let seed = self.draws.next_seed();
        let mut stream = self.draws.draws(seed);
        let pity_before = snapshot.counters();
        let resolutions = resolve_batch(
            banner,
            &pity_before,
            request.batch_size.count(),
            stream.as_mut(),
        )?;

        let now = Utc::now();
        let record_id = Uuid::now_v7();
        let mut items = Vec::with_capacity(resolutions.len());
        let mut results = Vec::with_capacity(resolutions.len());
        let mut pity_after = pity_before;

        for (index, resolution) in resolutions.into_iter().enumerate() {
            let item = InventoryItem::granted(
                &request.user_id,
                &resolution.item_id,
                &resolution.tier_id,
                record_id,
                now,
            );
            pity_after = resolution.counters;
            results.push(PullResult {
                index: index as u32,
                tier_id: resolution.tier_id,
                rank: resolution.rank,
                item_id: resolution.item_id,
                featured: resolution.featured,
                pity_counter_at_draw: resolution.pity_counter_at_draw,
                guarantee: resolution.guarantee,
                inventory_item_id: item.id,
            });
            items.push(item);
        }

        let record = PullRecord {
            id: record_id,
            user_id: request.user_id.clone(),
            banner_id: banner.id.clone(),
            banner_version: banner.version,
            batch_size: request.batch_size.count(),
            results,
            pity_before,
            pity_after,
            rng_seed: seed,
            idempotency_key: request.idempotency_key.clone(),
            created_at: now,
        };

        Ok(PullCommit {
            pity: PityCommit::new(snapshot, pity_after),
            items,
            record,
        })
    }

    fn record_drops(&self, banner: &BannerConfig, record: &PullRecord) {
        let Some(top) = banner.top_tier() else {
            return;
        };
        for result in record.results.iter().filter(|r| r.rank == top.rank) {
            metrics::record_top_tier_drop(&banner.id, result.featured, result.guarantee.is_some());
        }
    }

    /// 审计重放
    ///
    /// 用记录中的卡池版本、起始保底与种子重新解析，逐抽比对
    #[instrument(skip(self, record), fields(record_id = %record.id))]
    pub async fn audit_record(&self, record: &PullRecord) -> Result<AuditReport> {
        let banner = self
            .banners
            .get_banner_version(&record.banner_id, record.banner_version)
            .await?;

        let mut stream = self.draws.draws(record.rng_seed);
        let replayed = resolve_batch(
            &banner,
            &record.pity_before,
            record.batch_size,
            stream.as_mut(),
        )?;

        let mut mismatched_indices = Vec::new();
        for (index, stored) in record.results.iter().enumerate() {
            let same = replayed.get(index).is_some_and(|r| {
                r.tier_id == stored.tier_id
                    && r.item_id == stored.item_id
                    && r.featured == stored.featured
                    && r.guarantee == stored.guarantee
                    && r.pity_counter_at_draw == stored.pity_counter_at_draw
            });
            if !same {
                mismatched_indices.push(index as u32);
            }
        }
        if replayed.len() != record.results.len() {
            for index in record.results.len()..replayed.len() {
                mismatched_indices.push(index as u32);
            }
        }

        let pity_matches = replayed
            .last()
            .map(|r| r.counters == record.pity_after)
            .unwrap_or(record.pity_before == record.pity_after);
        let matches = mismatched_indices.is_empty() && pity_matches;

        if !matches {
            warn!(mismatched = ?mismatched_indices, pity_matches, "抽卡记录审计不一致");
        }

        Ok(AuditReport {
            record_id: record.id,
            banner_id: record.banner_id.clone(),
            banner_version: record.banner_version,
            matches,
            mismatched_indices,
            pity_matches,
        })
    }

    /// 按记录 ID 审计
    pub async fn audit_record_by_id(&self, record_id: Uuid) -> Result<AuditReport> {
        let record = self
            .pull_repo
            .get_record(record_id)
            .await?
            .ok_or(GachaError::RecordNotFound(record_id))?;
        self.audit_record(&record).await
    }

    /// 卡池迁移：清零该卡池下所有用户的保底计数
    ///
    /// 累计抽数保留，版本号递增使进行中的旧快照提交失败并重试
    #[instrument(skip(self))]
    pub async fn reset_pity_for_banner(&self, banner_id: &str) -> Result<u64> {
        // 确认卡池存在
        self.banners.get_banner(banner_id).await?;

        let affected = self.pity_repo.reset_banner(banner_id).await?;
        info!(affected, "卡池保底计数已重置");
        Ok(affected)
    }
}

/// 幂等键只能回放同一卡池、同一抽数的请求
fn ensure_same_request(record: &PullRecord, request: &PullRequest) -> Result<()> {
    let batch_size = request.batch_size.count();
    if record.banner_id != request.banner_id || record.batch_size != batch_size {
        return Err(GachaError::Validation(format!(
            "幂等键 {} 已用于卡池 {} 的 {} 抽，与本次请求（卡池 {}，{} 抽）不一致",
            request.idempotency_key,
            record.banner_id,
            record.batch_size,
            request.banner_id,
            batch_size
        )));
    }
    Ok(())
}

fn validate_idempotency_key(key: &str) -> Result<()> {
    if key.trim().is_empty() {
        return Err(GachaError::Validation("幂等键不能为空".to_string()));
    }
    if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(GachaError::Validation(format!(
            "幂等键长度不能超过 {}",
            MAX_IDEMPOTENCY_KEY_LEN
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::models::{BatchSize, PityCounters};
    use crate::repository::{
        MockBannerRepositoryTrait, MockPityRepositoryTrait, MockPullRepositoryTrait,
    };
    use crate::resolver::ScriptedDrawFactory;

    fn banner() -> BannerConfig {
        serde_json::from_value(serde_json::json!({
            "id": "standard",
            "version": 1,
            "name": "Standard",
            "tiers": [
                {"id": "5-star", "rank": 5, "baseWeight": 0.6},
                {"id": "3-star", "rank": 3, "baseWeight": 99.4}
            ],
            "softPityStart": 74,
            "hardPityLimit": 90,
            "itemPool": {
                "5-star": [{"itemId": "char_a", "weight": 1.0}],
                "3-star": [{"itemId": "weapon_a", "weight": 1.0}]
            }
        }))
        .unwrap()
    }

    fn banner_service() -> Arc<BannerService> {
        let mut repo = MockBannerRepositoryTrait::new();
        repo.expect_get_banner().returning(|_| Ok(Some(banner())));
        repo.expect_get_banner_version()
            .returning(|_, _| Ok(Some(banner())));
        Arc::new(BannerService::new(Arc::new(repo)))
    }

    fn request(key: &str) -> PullRequest {
        PullRequest {
            user_id: "user-1".to_string(),
            banner_id: "standard".to_string(),
            batch_size: BatchSize::Single,
            idempotency_key: key.to_string(),
        }
    }

    fn engine(
        banners: Arc<BannerService>,
        pity: MockPityRepositoryTrait,
        pulls: MockPullRepositoryTrait,
        max_attempts: u32,
    ) -> PullEngine {
        PullEngine::new(
            banners,
            Arc::new(pity),
            Arc::new(pulls),
            Arc::new(ScriptedDrawFactory::new(vec![0.99])),
            RetryPolicy::immediate(max_attempts),
        )
    }

    fn stored_record(key: &str) -> PullRecord {
        PullRecord {
            id: Uuid::now_v7(),
            user_id: "user-1".to_string(),
            banner_id: "standard".to_string(),
            banner_version: 1,
            batch_size: 1,
            results: vec![],
            pity_before: PityCounters::default(),
            pity_after: PityCounters::default(),
            rng_seed: 0,
            idempotency_key: key.to_string(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_existing_key_is_replayed_without_loading_banner() {
        let record = stored_record("k1");
        let expected_id = record.id;

        let mut banners = MockBannerRepositoryTrait::new();
        banners.expect_get_banner().never();
        let mut pity = MockPityRepositoryTrait::new();
        pity.expect_load().never();
        let mut pulls = MockPullRepositoryTrait::new();
        pulls
            .expect_find_by_idempotency_key()
            .returning(move |_, _| Ok(Some(record.clone())));
        pulls.expect_commit_pull().never();

        let engine = engine(
            Arc::new(BannerService::new(Arc::new(banners))),
            pity,
            pulls,
            3,
        );
        let outcome = engine.execute_pull(request("k1")).await.unwrap();
        assert!(outcome.replayed);
        assert_eq!(outcome.attempts, 0);
        assert_eq!(outcome.record.id, expected_id);
    }

    #[tokio::test]
    async fn test_conflict_exhaustion_returns_busy() {
        let mut pity = MockPityRepositoryTrait::new();
        pity.expect_load()
            .times(3)
            .returning(|user, banner| Ok(PityState::zeroed(user, banner)));
        let mut pulls = MockPullRepositoryTrait::new();
        pulls
            .expect_find_by_idempotency_key()
            .returning(|_, _| Ok(None));
        pulls
            .expect_commit_pull()
            .times(3)
            .returning(|_| Err(GachaError::Conflict("pity".to_string())));

        let engine = engine(banner_service(), pity, pulls, 3);
        let err = engine.execute_pull(request("k1")).await.unwrap_err();
        assert!(matches!(err, GachaError::PullEngineBusy { attempts: 3 }));
    }

    #[tokio::test]
    async fn test_conflict_then_success_reports_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut pity = MockPityRepositoryTrait::new();
        pity.expect_load()
            .returning(|user, banner| Ok(PityState::zeroed(user, banner)));
        let mut pulls = MockPullRepositoryTrait::new();
        pulls
            .expect_find_by_idempotency_key()
            .returning(|_, _| Ok(None));
        pulls.expect_commit_pull().returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(GachaError::Conflict("pity".to_string()))
            } else {
                Ok(())
            }
        });

        let engine = engine(banner_service(), pity, pulls, 5);
        let outcome = engine.execute_pull(request("k1")).await.unwrap();
        assert_eq!(outcome.attempts, 3);
        assert!(!outcome.replayed);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.record.results.len(), 1);
        assert_eq!(outcome.record.pity_after.total_pulls, 1);
    }

    #[tokio::test]
    async fn test_duplicate_key_at_commit_replays_winner() {
        let winner = stored_record("k1");
        let winner_id = winner.id;
        let lookups = Arc::new(AtomicUsize::new(0));
        let counter = lookups.clone();

        let mut pity = MockPityRepositoryTrait::new();
        pity.expect_load()
            .returning(|user, banner| Ok(PityState::zeroed(user, banner)));
        let mut pulls = MockPullRepositoryTrait::new();
        pulls.expect_find_by_idempotency_key().returning(move |_, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(None)
            } else {
                Ok(Some(winner.clone()))
            }
        });
        pulls
            .expect_commit_pull()
            .times(1)
            .returning(|c| Err(GachaError::DuplicateIdempotencyKey(c.record.idempotency_key.clone())));

        let engine = engine(banner_service(), pity, pulls, 3);
        let outcome = engine.execute_pull(request("k1")).await.unwrap();
        assert!(outcome.replayed);
        assert_eq!(outcome.record.id, winner_id);
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_surfaced() {
        let mut pity = MockPityRepositoryTrait::new();
        pity.expect_load()
            .times(1)
            .returning(|user, banner| Ok(PityState::zeroed(user, banner)));
        let mut pulls = MockPullRepositoryTrait::new();
        pulls
            .expect_find_by_idempotency_key()
            .returning(|_, _| Ok(None));
        pulls
            .expect_commit_pull()
            .times(1)
            .returning(|_| Err(GachaError::Internal("disk full".to_string())));

        let engine = engine(banner_service(), pity, pulls, 5);
        let err = engine.execute_pull(request("k1")).await.unwrap_err();
        assert!(matches!(err, GachaError::Internal(_)));
    }

    #[tokio::test]
    async fn test_empty_idempotency_key_rejected() {
        let engine = engine(
            banner_service(),
            MockPityRepositoryTrait::new(),
            MockPullRepositoryTrait::new(),
            3,
        );
        let err = engine.execute_pull(request("  ")).await.unwrap_err();
        assert!(matches!(err, GachaError::Validation(_)));
    }

    #[tokio::test]
    async fn test_commit_carries_snapshot_version() {
        let mut pity = MockPityRepositoryTrait::new();
        pity.expect_load().returning(|user, banner| {
            let mut state = PityState::zeroed(user, banner);
            state.version = 7;
            state.pulls_since_last_top_rarity = 89;
            state.pulls_since_last_featured = 89;
            state.total_pulls = 89;
            Ok(state)
        });
        let mut pulls = MockPullRepositoryTrait::new();
        pulls
            .expect_find_by_idempotency_key()
            .returning(|_, _| Ok(None));
        pulls
            .expect_commit_pull()
            .withf(|c| {
                c.pity.expected.version == 7
                    && c.pity.next.version == 8
                    && c.items.len() == 1
                    && c.items[0].id == c.record.results[0].inventory_item_id
            })
            .times(1)
            .returning(|_| Ok(()));

        let engine = engine(banner_service(), pity, pulls, 3);
        let outcome = engine.execute_pull(request("k1")).await.unwrap();
        let result = &outcome.record.results[0];
        assert_eq!(result.tier_id, "5-star");
        assert_eq!(result.pity_counter_at_draw, 90);
        assert_eq!(outcome.record.pity_after.pulls_since_last_top_rarity, 0);
    }
}
