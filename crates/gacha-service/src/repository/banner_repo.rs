//! 卡池配置仓储
//!
//! 配置以 JSONB 整体存储，按 (banner_id, version) 保留全部历史版本，已写入的版本只读

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use super::traits::BannerRepositoryTrait;
use crate::error::Result;
use crate::models::BannerConfig;

/// 卡池配置仓储
pub struct BannerRepository {
    pool: PgPool,
}

impl BannerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn decode_config(row: PgRow) -> Result<BannerConfig> {
    let config: Json<BannerConfig> = row.try_get("config")?;
    Ok(config.0)
}

#[async_trait]
impl BannerRepositoryTrait for BannerRepository {
    async fn get_banner(&self, banner_id: &str) -> Result<Option<BannerConfig>> {
        let row = sqlx::query(
            r#"
            SELECT config
            FROM banner_configs
            WHERE banner_id = $1
            ORDER BY version DESC
            LIMIT 1
            "#,
        )
        .bind(banner_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_config).transpose()
    }

    async fn get_banner_version(
        &self,
        banner_id: &str,
        version: i64,
    ) -> Result<Option<BannerConfig>> {
        let row = sqlx::query(
            r#"
            SELECT config
            FROM banner_configs
            WHERE banner_id = $1 AND version = $2
            "#,
        )
        .bind(banner_id)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;

        row.map(decode_config).transpose()
    }

    async fn list_banners(&self) -> Result<Vec<BannerConfig>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT ON (banner_id) config
            FROM banner_configs
            ORDER BY banner_id, version DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(decode_config).collect()
    }

    async fn insert_banner(&self, config: &BannerConfig) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO banner_configs (banner_id, version, name, config, created_at, updated_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            ON CONFLICT (banner_id, version) DO NOTHING
            "#,
        )
        .bind(&config.id)
        .bind(config.version)
        .bind(&config.name)
        .bind(Json(config))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
