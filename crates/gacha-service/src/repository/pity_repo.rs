//! 保底状态仓储
//!
//! 以 (user_id, banner_id) 为主键，写入使用版本号做比较并交换：
//! 首次提交（expected.version = 0）走 INSERT ... ON CONFLICT DO NOTHING，
//! 之后走 UPDATE ... WHERE version = expected，受影响行数为 0 即为冲突。

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};

use super::traits::{PityCommit, PityRepositoryTrait};
use crate::error::{GachaError, Result};
use crate::models::PityState;

/// 保底状态仓储
pub struct PityRepository {
    pool: PgPool,
}

impl PityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &PgRow) -> Result<PityState> {
        let since_top: i32 = row.try_get("pulls_since_last_top_rarity")?;
        let since_featured: i32 = row.try_get("pulls_since_last_featured")?;
        let total: i64 = row.try_get("total_pulls")?;

        Ok(PityState {
            user_id: row.try_get("user_id")?,
            banner_id: row.try_get("banner_id")?,
            pulls_since_last_top_rarity: to_u32(since_top, "pulls_since_last_top_rarity")?,
            pulls_since_last_featured: to_u32(since_featured, "pulls_since_last_featured")?,
            total_pulls: u64::try_from(total)
                .map_err(|_| GachaError::Internal(format!("total_pulls 为负数: {}", total)))?,
            version: row.try_get("version")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    // ==================== 事务操作 ====================

    /// 在事务中提交保底状态
    ///
    /// 版本不符返回 `Conflict`
    pub async fn commit_in_tx(tx: &mut PgConnection, commit: &PityCommit) -> Result<()> {
        let next = &commit.next;
        let since_top = to_i32(next.pulls_since_last_top_rarity)?;
        let since_featured = to_i32(next.pulls_since_last_featured)?;
        let total = i64::try_from(next.total_pulls)
            .map_err(|_| GachaError::Internal(format!("total_pulls 溢出: {}", next.total_pulls)))?;

        let result = if commit.expected.version == 0 {
            sqlx::query(
                r#"
                INSERT INTO pity_states (user_id, banner_id, pulls_since_last_top_rarity,
                                         pulls_since_last_featured, total_pulls, version, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (user_id, banner_id) DO NOTHING
                "#,
            )
            .bind(&commit.user_id)
            .bind(&commit.banner_id)
            .bind(since_top)
            .bind(since_featured)
            .bind(total)
            .bind(next.version)
            .bind(next.updated_at)
            .execute(&mut *tx)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE pity_states
                SET pulls_since_last_top_rarity = $3, pulls_since_last_featured = $4,
                    total_pulls = $5, version = $6, updated_at = $7
                WHERE user_id = $1 AND banner_id = $2 AND version = $8
                "#,
            )
            .bind(&commit.user_id)
            .bind(&commit.banner_id)
            .bind(since_top)
            .bind(since_featured)
            .bind(total)
            .bind(next.version)
            .bind(next.updated_at)
            .bind(commit.expected.version)
            .execute(&mut *tx)
            .await?
        };

        if result.rows_affected() == 0 {
            return Err(GachaError::Conflict(format!(
                "pity user={} banner={} expected_version={}",
                commit.user_id, commit.banner_id, commit.expected.version
            )));
        }

        Ok(())
    }
}

fn to_u32(value: i32, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| GachaError::Internal(format!("{} 为负数: {}", column, value)))
}

fn to_i32(value: u32) -> Result<i32> {
    i32::try_from(value).map_err(|_| GachaError::Internal(format!("保底计数溢出: {}", value)))
}

#[async_trait]
impl PityRepositoryTrait for PityRepository {
    async fn load(&self, user_id: &str, banner_id: &str) -> Result<PityState> {
        let row = sqlx::query(
            r#"
            SELECT user_id, banner_id, pulls_since_last_top_rarity, pulls_since_last_featured,
                   total_pulls, version, updated_at
            FROM pity_states
            WHERE user_id = $1 AND banner_id = $2
            "#,
        )
        .bind(user_id)
        .bind(banner_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::from_row(&row),
            None => Ok(PityState::zeroed(user_id, banner_id)),
        }
    }

    async fn commit(&self, commit: &PityCommit) -> Result<PityState> {
        let mut tx = self.pool.begin().await?;
        Self::commit_in_tx(&mut tx, commit).await?;
        tx.commit().await?;
        Ok(commit.next.clone())
    }

    async fn reset_banner(&self, banner_id: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE pity_states
            SET pulls_since_last_top_rarity = 0, pulls_since_last_featured = 0,
                version = version + 1, updated_at = NOW()
            WHERE banner_id = $1
            "#,
        )
        .bind(banner_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
