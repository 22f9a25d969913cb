//! 重试策略与执行器
//!
//! 提供按尝试次数封顶的指数退避重试。是否重试由调用方通过 `is_retryable` 闭包决定，
//! 业务错误（如参数无效）直接向上传播。
//!
//! 上限只看次数不看墙钟时间，测试里可以精确断言尝试了几次。

use std::future::Future;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::GachaConfig;

// ---------------------------------------------------------------------------
// RetryPolicy: 重试策略配置
// ---------------------------------------------------------------------------

/// 重试策略配置
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 最大尝试次数（含首次执行），至少为 1
    pub max_attempts: u32,
    /// 首次重试前的等待时间
    pub initial_delay: Duration,
    /// 退避时间上限
    pub max_delay: Duration,
    /// 每次重试的退避倍数
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    /// 默认策略：最多尝试 4 次，初始等待 1 秒，最大等待 30 秒，倍数 2.0
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl From<&GachaConfig> for RetryPolicy {
    fn from(config: &GachaConfig) -> Self {
        Self {
            max_attempts: config.max_commit_attempts.max(1),
            initial_delay: Duration::from_millis(config.retry_initial_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// 不等待、只限次数的策略
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            multiplier: 1.0,
        }
    }

    /// 计算第 N 次重试的等待时间（retry 从 0 开始）
    ///
    /// 公式: initial_delay * multiplier^retry，结果不超过 max_delay。
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let base_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = base_ms * self.multiplier.powi(retry as i32);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// 已经执行了 `attempts` 次后是否还能再试
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

// ---------------------------------------------------------------------------
// retry_with_policy: 带重试的异步执行器
// ---------------------------------------------------------------------------

/// 带重试的异步执行器
///
/// 仅在操作返回可重试错误时才重试，其他错误直接返回。
pub async fn retry_with_policy<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    is_retryable: impl Fn(&E) -> bool,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        match operation().await {
            Ok(value) => {
                if attempts > 1 {
                    info!(operation = operation_name, attempts, "操作在重试后成功");
                }
                return Ok(value);
            }
            Err(err) => {
                if !is_retryable(&err) {
                    warn!(
                        operation = operation_name,
                        error = %err,
                        "操作失败且不可重试，直接返回错误"
                    );
                    return Err(err);
                }

                if !policy.should_retry(attempts) {
                    warn!(
                        operation = operation_name,
                        attempts,
                        max_attempts = policy.max_attempts,
                        error = %err,
                        "已达最大尝试次数，放弃重试"
                    );
                    return Err(err);
                }

                let delay = policy.delay_for_attempt(attempts - 1);
                warn!(
                    operation = operation_name,
                    attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "操作失败，将在退避后重试"
                );

                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// 单元测试
// ---------------------------------------------------------------------------
