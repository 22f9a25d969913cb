//! 抽卡记录仓储
//!
//! 一次抽卡在同一个事务内写入抽卡记录、保底状态与背包物品。
//! 记录先于保底写入：同一幂等键的并发请求会在唯一索引上排队，
//! 后到者在先到者提交后得到唯一约束冲突，由服务层回放已有结果。

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use super::inventory_repo::InventoryRepository;
use super::pity_repo::PityRepository;
use super::traits::{PullCommit, PullRepositoryTrait};
use crate::error::{GachaError, Result};
use crate::models::{PityCounters, PullRecord, PullResult};

const RECORD_COLUMNS: &str = "id, user_id, banner_id, banner_version, batch_size, results, \
                              pity_before, pity_after, rng_seed, idempotency_key, created_at";

/// 抽卡记录仓储
pub struct PullRepository {
    pool: PgPool,
}

impl PullRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn from_row(row: &PgRow) -> Result<PullRecord> {
        let batch_size: i32 = row.try_get("batch_size")?;
        let rng_seed: i64 = row.try_get("rng_seed")?;
        let results: Json<Vec<PullResult>> = row.try_get("results")?;
        let pity_before: Json<PityCounters> = row.try_get("pity_before")?;
        let pity_after: Json<PityCounters> = row.try_get("pity_after")?;

        Ok(PullRecord {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            banner_id: row.try_get("banner_id")?,
            banner_version: row.try_get("banner_version")?,
            batch_size: u32::try_from(batch_size)
                .map_err(|_| GachaError::Internal(format!("batch_size 非法: {}", batch_size)))?,
            results: results.0,
            pity_before: pity_before.0,
            pity_after: pity_after.0,
            // 种子按位存储为 BIGINT
            rng_seed: rng_seed as u64,
            idempotency_key: row.try_get("idempotency_key")?,
            created_at: row.try_get("created_at")?,
        })
    }

    // ==================== 事务操作 ====================

    /// 在事务中写入抽卡记录
    ///
    /// (user_id, idempotency_key) 已存在时返回 `DuplicateIdempotencyKey`
    pub async fn insert_record_in_tx(tx: &mut PgConnection, record: &PullRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pull_records (id, user_id, banner_id, banner_version, batch_size, results,
                                      pity_before, pity_after, rng_seed, idempotency_key, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.id)
        .bind(&record.user_id)
        .bind(&record.banner_id)
        .bind(record.banner_version)
        .bind(record.batch_size as i32)
        .bind(Json(&record.results))
        .bind(Json(&record.pity_before))
        .bind(Json(&record.pity_after))
        .bind(record.rng_seed as i64)
        .bind(&record.idempotency_key)
        .bind(record.created_at)
        .execute(tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                GachaError::DuplicateIdempotencyKey(record.idempotency_key.clone())
            }
            other => GachaError::Database(other),
        })?;

        Ok(())
    }
}

#[async_trait]
impl PullRepositoryTrait for PullRepository {
    async fn find_by_idempotency_key(
        &self,
        user_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<PullRecord>> {
        let sql = format!(
            "SELECT {} FROM pull_records WHERE user_id = $1 AND idempotency_key = $2",
            RECORD_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(idempotency_key)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn get_record(&self, id: Uuid) -> Result<Option<PullRecord>> {
        let sql = format!("SELECT {} FROM pull_records WHERE id = $1", RECORD_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn list_by_user(&self, user_id: &str, limit: i64) -> Result<Vec<PullRecord>> {
        let sql = format!(
            "SELECT {} FROM pull_records WHERE user_id = $1 ORDER BY created_at DESC, id DESC LIMIT $2",
            RECORD_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::from_row).collect()
    }

    async fn commit_pull(&self, commit: &PullCommit) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        Self::insert_record_in_tx(&mut tx, &commit.record).await?;
        PityRepository::commit_in_tx(&mut tx, &commit.pity).await?;
        for item in &commit.items {
            InventoryRepository::insert_item_in_tx(&mut tx, item).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
