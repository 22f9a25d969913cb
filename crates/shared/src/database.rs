//! 数据库连接管理模块
//!
//! 提供 PostgreSQL 连接池管理，支持健康检查、启动期重连和迁移执行。

use crate::config::DatabaseConfig;
use crate::error::{Result, SharedError};
use crate::retry::{RetryPolicy, retry_with_policy};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};

/// 数据库连接池包装
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 创建数据库连接池
    #[instrument(skip(config))]
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await?;

        info!("Database connection pool created");

        Ok(Self { pool })
    }

    /// 带重试的连接
    ///
    /// 容器编排场景下数据库往往晚于服务就绪，连接类错误按策略退避重试。
    pub async fn connect_with_retry(config: &DatabaseConfig, policy: &RetryPolicy) -> Result<Self> {
        retry_with_policy(policy, "database_connect", SharedError::is_retryable, || {
            Self::connect(config)
        })
        .await
    }

    /// 获取连接池引用
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// 健康检查
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(SharedError::from)
    }

    /// 运行迁移
    ///
    /// `migrate!` 宏需要在编译期定位迁移目录，因此由持有 migrations 目录的服务 crate 传入 Migrator。
    #[instrument(skip(self, migrator))]
    pub async fn run_migrations(&self, migrator: &Migrator) -> Result<()> {
        info!("Running database migrations...");
        migrator.run(&self.pool).await?;
        info!("Database migrations applied");
        Ok(())
    }
}
