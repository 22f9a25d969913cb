//! 养成（强化）服务
//!
//! 强化流程：
//!
//! 1. 幂等检查（带幂等键时）
//! 2. 物品归属检查，不存在与不属于当前用户同样返回 `NotOwned`
//! 3. 等级上限检查
//! 4. 投入材料是否覆盖下一级消耗
//! 5. 钱包余额检查
//! 6. 按成功率抽一次随机数
//! 7. 物品、钱包、强化记录在版本校验下整体提交，冲突时重试

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use gacha_shared::config::EnhancementConfig;
use gacha_shared::observability::metrics;
use gacha_shared::retry::{RetryPolicy, retry_with_policy};

use crate::error::{GachaError, Result};
use crate::models::{EnhancementAttempt, InventoryItem, MaterialWallet};
use crate::repository::{EnhancementCommit, InventoryRepositoryTrait, WalletCommit};
use crate::resolver::DrawSourceFactory;
use crate::service::dto::{EnhanceRequest, EnhancementOutcome};

/// 成功率曲线，随等级不升
#[derive(Debug, Clone, PartialEq)]
pub enum SuccessCurve {
    /// base - decay_per_level * level，不低于 floor
    Linear {
        base: f64,
        decay_per_level: f64,
        floor: f64,
    },
    /// 按等级查表，超出表长使用最后一项
    Table(Vec<f64>),
}

impl SuccessCurve {
    pub fn rate(&self, level: i32) -> f64 {
        let level = level.max(0);
        let rate = match self {
            Self::Linear {
                base,
                decay_per_level,
                floor,
            } => (base - decay_per_level * level as f64).max(*floor),
            Self::Table(rates) => rates
                .get(level as usize)
                .or_else(|| rates.last())
                .copied()
                .unwrap_or(0.0),
        };
        rate.clamp(0.0, 1.0)
    }
}

/// 失败时的材料处理
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FailurePolicy {
    ConsumeAll,
    /// 按比例消耗，向上取整
    ConsumeFraction(f64),
    Refund,
}

impl FailurePolicy {
    /// 失败时实际消耗的材料
    pub fn consumed(&self, offered: &BTreeMap<String, i64>) -> BTreeMap<String, i64> {
        match self {
            Self::ConsumeAll => offered.clone(),
            Self::Refund => BTreeMap::new(),
            Self::ConsumeFraction(fraction) => offered
                .iter()
                .map(|(id, qty)| (id.clone(), ((*qty as f64) * fraction).ceil() as i64))
                .filter(|(_, qty)| *qty > 0)
                .collect(),
        }
    }
}

/// 强化规则
#[derive(Debug, Clone, PartialEq)]
pub struct EnhancementPolicy {
    pub max_level: i32,
    pub curve: SuccessCurve,
    /// 计价材料
    pub material_id: String,
    pub base_cost: i64,
    pub cost_per_level: i64,
    pub failure: FailurePolicy,
}

impl EnhancementPolicy {
    /// 从当前等级强化到下一级所需的计价材料数量
    pub fn level_cost(&self, level: i32) -> i64 {
        self.base_cost + self.cost_per_level * i64::from(level.max(0))
    }
}

impl TryFrom<&EnhancementConfig> for EnhancementPolicy {
    type Error = GachaError;

    fn try_from(config: &EnhancementConfig) -> Result<Self> {
        if config.max_level < 1 {
            return Err(GachaError::Validation(format!(
                "enhancement.max_level 至少为 1: {}",
                config.max_level
            )));
        }
        if config.base_cost < 0 || config.cost_per_level < 0 {
            return Err(GachaError::Validation("强化消耗不能为负数".to_string()));
        }

        let curve = if config.success_rate_table.is_empty() {
            if config.decay_per_level < 0.0 {
                return Err(GachaError::Validation(
                    "decay_per_level 不能为负数，成功率不可随等级上升".to_string(),
                ));
            }
            SuccessCurve::Linear {
                base: config.base_success_rate,
                decay_per_level: config.decay_per_level,
                floor: config.min_success_rate,
            }
        } else {
            let table = &config.success_rate_table;
            if table.iter().any(|r| !(0.0..=1.0).contains(r)) {
                return Err(GachaError::Validation("成功率表的取值必须在 [0, 1] 内".to_string()));
            }
            if table.windows(2).any(|w| w[1] > w[0]) {
                return Err(GachaError::Validation("成功率表不可随等级上升".to_string()));
            }
            SuccessCurve::Table(table.clone())
        };

        let failure = if config.failure_consume_ratio >= 1.0 {
            FailurePolicy::ConsumeAll
        } else if config.failure_consume_ratio <= 0.0 {
            FailurePolicy::Refund
        } else {
            FailurePolicy::ConsumeFraction(config.failure_consume_ratio)
        };

        Ok(Self {
            max_level: config.max_level,
            curve,
            material_id: config.material_id.clone(),
            base_cost: config.base_cost,
            cost_per_level: config.cost_per_level,
            failure,
        })
    }
}

/// 养成服务
pub struct EnhancementService {
    inventory: Arc<dyn InventoryRepositoryTrait>,
    policy: EnhancementPolicy,
    draws: Arc<dyn DrawSourceFactory>,
    retry_policy: RetryPolicy,
}

impl EnhancementService {
    pub fn new(
        inventory: Arc<dyn InventoryRepositoryTrait>,
        policy: EnhancementPolicy,
        draws: Arc<dyn DrawSourceFactory>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            inventory,
            policy,
            draws,
            retry_policy,
        }
    }

    pub fn policy(&self) -> &EnhancementPolicy {
        &self.policy
    }

    /// 强化一件物品
    #[instrument(
        skip(self, request),
        fields(user_id = %request.user_id, inventory_item_id = %request.inventory_item_id)
    )]
    pub async fn enhance(&self, request: EnhanceRequest) -> Result<EnhancementOutcome> {
        validate_materials(&request.materials)?;

        // 1. 幂等检查
        if let Some(key) = &request.idempotency_key
            && let Some(attempt) = self
                .inventory
                .find_attempt_by_idempotency_key(&request.user_id, key)
                .await?
        {
            info!(idempotency_key = %key, "幂等请求，返回已存在的强化记录");
            return self.replay(attempt, 0).await;
        }

        let mut attempts: u32 = 0;
        loop {
            attempts += 1;

            let commit = self.prepare(&request).await?;
            match self.inventory.commit_enhancement(&commit).await {
                Ok(()) => {
                    let outcome = if commit.attempt.success {
                        "success"
                    } else {
                        "failure"
                    };
                    metrics::record_enhancement(outcome);
                    info!(
                        attempt_id = %commit.attempt.id,
                        success = commit.attempt.success,
                        level_after = commit.attempt.level_after,
                        attempts,
                        "强化提交成功"
                    );
                    return Ok(EnhancementOutcome {
                        attempt: commit.attempt,
                        attempts,
                        replayed: false,
                        item: Some(commit.item_next),
                    });
                }
                Err(GachaError::Conflict(detail)) => {
                    metrics::record_commit_conflict("enhance");
                    if !self.retry_policy.should_retry(attempts) {
                        warn!(attempts, detail = %detail, "强化提交冲突次数达到上限");
                        return Err(GachaError::PullEngineBusy { attempts });
                    }
                    let delay = self.retry_policy.delay_for_attempt(attempts - 1);
                    warn!(attempts, detail = %detail, "强化提交冲突，重新读取后重试");
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(GachaError::DuplicateIdempotencyKey(key)) => {
                    let attempt = self
                        .inventory
                        .find_attempt_by_idempotency_key(&request.user_id, &key)
                        .await?
                        .ok_or_else(|| {
                            GachaError::Internal(format!("幂等键 {} 冲突但未找到已有记录", key))
                        })?;
                    return self.replay(attempt, attempts).await;
                }
                Err(e) => {
                    metrics::record_enhancement(e.error_code());
                    return Err(e);
                }
            }
        }
    }

    /// 读取当前状态、完成全部检查并决定结果
    async fn prepare(&self, request: &EnhanceRequest) -> Result<EnhancementCommit> {
        // 2. 归属
        let item = self
            .inventory
            .get_item(request.inventory_item_id)
            .await?
            .filter(|item| item.user_id == request.user_id)
            .ok_or(GachaError::NotOwned(request.inventory_item_id))?;

        // 3. 等级上限
        if item.level >= self.policy.max_level {
            return Err(GachaError::MaxLevelReached {
                level: item.level,
                max_level: self.policy.max_level,
            });
        }

        // 4. 投入是否覆盖下一级消耗
        let cost = self.policy.level_cost(item.level);
        let offered = request
            .materials
            .get(&self.policy.material_id)
            .copied()
            .unwrap_or(0);
        if offered < cost {
            return Err(GachaError::Validation(format!(
                "强化到 {} 级需要 {} 个 {}，实际投入 {}",
                item.level + 1,
                cost,
                self.policy.material_id,
                offered
            )));
        }

        // 5. 钱包余额
        let wallet = self.inventory.load_wallet(&request.user_id).await?;
        for (material_id, required) in &request.materials {
            let available = wallet.balance(material_id);
            if available < *required {
                return Err(GachaError::InsufficientMaterials {
                    material_id: material_id.clone(),
                    required: *required,
                    available,
                });
            }
        }

        // 6. 判定
        let success_rate = self.policy.curve.rate(item.level);
        let success = {
            let mut stream = self.draws.draws(self.draws.next_seed());
            stream.next_unit() < success_rate
        };
        let consumed = if success {
            request.materials.clone()
        } else {
            self.policy.failure.consumed(&request.materials)
        };

        let level_after = if success { item.level + 1 } else { item.level };
        let item_next = InventoryItem {
            level: level_after,
            version: item.version + 1,
            ..item.clone()
        };
        let deltas: BTreeMap<String, i64> = consumed
            .iter()
            .map(|(id, qty)| (id.clone(), -qty))
            .collect();
        let wallet_next = wallet.apply(&deltas)?;

        let attempt = EnhancementAttempt {
            id: Uuid::now_v7(),
            user_id: request.user_id.clone(),
            inventory_item_id: item.id,
            item_id: item.item_id.clone(),
            materials_consumed: consumed,
            success,
            success_rate,
            level_before: item.level,
            level_after,
            idempotency_key: request.idempotency_key.clone(),
            created_at: Utc::now(),
        };

        Ok(EnhancementCommit {
            item_expected_version: item.version,
            item_next,
            wallet_expected_version: wallet.version,
            wallet_next,
            attempt,
        })
    }

    async fn replay(&self, attempt: EnhancementAttempt, attempts: u32) -> Result<EnhancementOutcome> {
        let item = self.inventory.get_item(attempt.inventory_item_id).await?;
        Ok(EnhancementOutcome {
            attempt,
            attempts,
            replayed: true,
            item,
        })
    }

    /// 运维发放材料
    #[instrument(skip(self, materials))]
    pub async fn grant_materials(
        &self,
        user_id: &str,
        materials: BTreeMap<String, i64>,
    ) -> Result<MaterialWallet> {
        validate_materials(&materials)?;

        let inventory = self.inventory.clone();
        let user_id = user_id.to_string();
        let result = retry_with_policy(
            &self.retry_policy,
            "grant_materials",
            |e: &GachaError| matches!(e, GachaError::Conflict(_)),
            || {
                let inventory = inventory.clone();
                let user_id = user_id.clone();
                let materials = materials.clone();
                async move {
                    let wallet = inventory.load_wallet(&user_id).await?;
                    let next = wallet.apply(&materials)?;
                    inventory
                        .commit_wallet(&WalletCommit {
                            expected_version: wallet.version,
                            next,
                        })
                        .await
                }
            },
        )
        .await;

        match result {
            Ok(wallet) => {
                info!(user_id = %wallet.user_id, version = wallet.version, "材料发放成功");
                Ok(wallet)
            }
            Err(GachaError::Conflict(_)) => Err(GachaError::PullEngineBusy {
                attempts: self.retry_policy.max_attempts,
            }),
            Err(e) => Err(e),
        }
    }
}

fn validate_materials(materials: &BTreeMap<String, i64>) -> Result<()> {
    if materials.is_empty() {
        return Err(GachaError::Validation("材料列表不能为空".to_string()));
    }
    if let Some((id, qty)) = materials.iter().find(|(_, qty)| **qty <= 0) {
        return Err(GachaError::Validation(format!("材料 {} 的数量必须大于 0: {}", id, qty)));
    }
    if materials.keys().any(|id| id.trim().is_empty()) {
        return Err(GachaError::Validation("材料 ID 不能为空".to_string()));
    }
    Ok(())
}
