//! 背包与养成仓储
//!
//! 物品实例、材料钱包与强化记录。物品和钱包都带版本号，写入时按版本做比较并交换。

use std::collections::BTreeMap;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use super::traits::{EnhancementCommit, InventoryRepositoryTrait, WalletCommit};
use crate::error::{GachaError, Result};
use crate::models::{EnhancementAttempt, InventoryFilter, InventoryItem, MaterialWallet};

const ITEM_COLUMNS: &str =
    "id, user_id, item_id, tier_id, level, version, source_pull_id, acquired_at";

const ATTEMPT_COLUMNS: &str = "id, user_id, inventory_item_id, item_id, materials_consumed, \
                               success, success_rate, level_before, level_after, \
                               idempotency_key, created_at";

/// 背包与养成仓储
pub struct InventoryRepository {
    pool: PgPool,
}

impl InventoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn item_from_row(row: &PgRow) -> Result<InventoryItem> {
        Ok(InventoryItem {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            item_id: row.try_get("item_id")?,
            tier_id: row.try_get("tier_id")?,
            level: row.try_get("level")?,
            version: row.try_get("version")?,
            source_pull_id: row.try_get("source_pull_id")?,
            acquired_at: row.try_get("acquired_at")?,
        })
    }

    fn wallet_from_row(row: &PgRow) -> Result<MaterialWallet> {
        let balances: Json<BTreeMap<String, i64>> = row.try_get("balances")?;
        Ok(MaterialWallet {
            user_id: row.try_get("user_id")?,
            balances: balances.0,
            version: row.try_get("version")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn attempt_from_row(row: &PgRow) -> Result<EnhancementAttempt> {
        let materials: Json<BTreeMap<String, i64>> = row.try_get("materials_consumed")?;
        Ok(EnhancementAttempt {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            inventory_item_id: row.try_get("inventory_item_id")?,
            item_id: row.try_get("item_id")?,
            materials_consumed: materials.0,
            success: row.try_get("success")?,
            success_rate: row.try_get("success_rate")?,
            level_before: row.try_get("level_before")?,
            level_after: row.try_get("level_after")?,
            idempotency_key: row.try_get("idempotency_key")?,
            created_at: row.try_get("created_at")?,
        })
    }

    // ==================== 事务操作 ====================

    /// 在事务中写入新发放的物品
    pub async fn insert_item_in_tx(tx: &mut PgConnection, item: &InventoryItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inventory_items (id, user_id, item_id, tier_id, level, version,
                                         source_pull_id, acquired_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(item.id)
        .bind(&item.user_id)
        .bind(&item.item_id)
        .bind(&item.tier_id)
        .bind(item.level)
        .bind(item.version)
        .bind(item.source_pull_id)
        .bind(item.acquired_at)
        .execute(tx)
        .await?;

        Ok(())
    }

    /// 在事务中按版本更新物品等级
    async fn update_item_in_tx(
        tx: &mut PgConnection,
        expected_version: i64,
        item: &InventoryItem,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE inventory_items
            SET level = $2, version = $3
            WHERE id = $1 AND version = $4
            "#,
        )
        .bind(item.id)
        .bind(item.level)
        .bind(item.version)
        .bind(expected_version)
        .execute(tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(GachaError::Conflict(format!(
                "inventory item={} expected_version={}",
                item.id, expected_version
            )));
        }
        Ok(())
    }

    /// 在事务中按版本写入钱包
    ///
    /// 首次写入（expected_version = 0）走 INSERT ... ON CONFLICT DO NOTHING
    async fn write_wallet_in_tx(
        tx: &mut PgConnection,
        expected_version: i64,
        wallet: &MaterialWallet,
    ) -> Result<()> {
        let result = if expected_version == 0 {
            sqlx::query(
                r#"
                INSERT INTO material_wallets (user_id, balances, version, updated_at)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (user_id) DO NOTHING
                "#,
            )
            .bind(&wallet.user_id)
            .bind(Json(&wallet.balances))
            .bind(wallet.version)
            .bind(wallet.updated_at)
            .execute(&mut *tx)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE material_wallets
                SET balances = $2, version = $3, updated_at = $4
                WHERE user_id = $1 AND version = $5
                "#,
            )
            .bind(&wallet.user_id)
            .bind(Json(&wallet.balances))
            .bind(wallet.version)
            .bind(wallet.updated_at)
            .bind(expected_version)
            .execute(&mut *tx)
            .await?
        };

        if result.rows_affected() == 0 {
            return Err(GachaError::Conflict(format!(
                "wallet user={} expected_version={}",
                wallet.user_id, expected_version
            )));
        }
        Ok(())
    }

    /// 在事务中写入强化记录
    async fn insert_attempt_in_tx(
        tx: &mut PgConnection,
        attempt: &EnhancementAttempt,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO enhancement_attempts (id, user_id, inventory_item_id, item_id,
                                              materials_consumed, success, success_rate,
                                              level_before, level_after, idempotency_key, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(attempt.id)
        .bind(&attempt.user_id)
        .bind(attempt.inventory_item_id)
        .bind(&attempt.item_id)
        .bind(Json(&attempt.materials_consumed))
        .bind(attempt.success)
        .bind(attempt.success_rate)
        .bind(attempt.level_before)
        .bind(attempt.level_after)
        .bind(&attempt.idempotency_key)
        .bind(attempt.created_at)
        .execute(tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                GachaError::DuplicateIdempotencyKey(
                    attempt.idempotency_key.clone().unwrap_or_default(),
                )
            }
            other => GachaError::Database(other),
        })?;

        Ok(())
    }
}

#[async_trait]
impl InventoryRepositoryTrait for InventoryRepository {
    async fn get_item(&self, id: Uuid) -> Result<Option<InventoryItem>> {
        let sql = format!("SELECT {} FROM inventory_items WHERE id = $1", ITEM_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::item_from_row).transpose()
    }

    async fn list_items(
        &self,
        user_id: &str,
        filter: &InventoryFilter,
    ) -> Result<Vec<InventoryItem>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM inventory_items
            WHERE user_id = $1
              AND ($2::TEXT IS NULL OR tier_id = $2)
              AND ($3::TEXT[] IS NULL OR item_id = ANY($3))
            ORDER BY acquired_at DESC, id DESC
            "#,
            ITEM_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(&filter.tier_id)
            .bind(&filter.item_ids)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::item_from_row).collect()
    }

    async fn load_wallet(&self, user_id: &str) -> Result<MaterialWallet> {
        let row = sqlx::query(
            r#"
            SELECT user_id, balances, version, updated_at
            FROM material_wallets
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::wallet_from_row(&row),
            None => Ok(MaterialWallet::empty(user_id)),
        }
    }

    async fn find_attempt_by_idempotency_key(
        &self,
        user_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<EnhancementAttempt>> {
        let sql = format!(
            "SELECT {} FROM enhancement_attempts WHERE user_id = $1 AND idempotency_key = $2",
            ATTEMPT_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(user_id)
            .bind(idempotency_key)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::attempt_from_row).transpose()
    }

    async fn list_attempts(&self, user_id: &str, limit: i64) -> Result<Vec<EnhancementAttempt>> {
        let sql = format!(
            "SELECT {} FROM enhancement_attempts WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC LIMIT $2",
            ATTEMPT_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::attempt_from_row).collect()
    }

    async fn commit_enhancement(&self, commit: &EnhancementCommit) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        Self::insert_attempt_in_tx(&mut tx, &commit.attempt).await?;
        Self::update_item_in_tx(&mut tx, commit.item_expected_version, &commit.item_next).await?;
        Self::write_wallet_in_tx(&mut tx, commit.wallet_expected_version, &commit.wallet_next)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn commit_wallet(&self, commit: &WalletCommit) -> Result<MaterialWallet> {
        let mut tx = self.pool.begin().await?;
        Self::write_wallet_in_tx(&mut tx, commit.expected_version, &commit.next).await?;
        tx.commit().await?;
        Ok(commit.next.clone())
    }
}
