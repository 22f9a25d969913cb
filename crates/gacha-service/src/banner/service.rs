//! 卡池配置服务
//!
//! 从仓储读取卡池配置，校验通过后按 (banner_id, version) 缓存。
//! 同一版本的配置不可变，缓存无需失效；发布新版本只会产生新的缓存键。

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{info, instrument, warn};

use super::validation::validate_banner;
use crate::error::{GachaError, Result};
use crate::models::BannerConfig;
use crate::repository::BannerRepositoryTrait;

/// 卡池配置服务
pub struct BannerService {
    repo: Arc<dyn BannerRepositoryTrait>,
    cache: DashMap<(String, i64), Arc<BannerConfig>>,
}

impl BannerService {
    pub fn new(repo: Arc<dyn BannerRepositoryTrait>) -> Self {
        Self {
            repo,
            cache: DashMap::new(),
        }
    }

    /// 获取当前可用于抽卡的卡池
    ///
    /// 卡池不存在返回 `BannerNotFound`，未启用或不在开放时间内返回 `BannerInactive`，
    /// 配置非法返回 `ConfigError`
    #[instrument(skip(self))]
    pub async fn get_active_banner(&self, banner_id: &str) -> Result<Arc<BannerConfig>> {
        let banner = self.get_banner(banner_id).await?;
        if !banner.is_active_at(Utc::now()) {
            return Err(GachaError::BannerInactive(banner_id.to_string()));
        }
        Ok(banner)
    }

    /// 获取卡池最新版本（不检查开放时间）
    pub async fn get_banner(&self, banner_id: &str) -> Result<Arc<BannerConfig>> {
        let config = self
            .repo
            .get_banner(banner_id)
            .await?
            .ok_or_else(|| GachaError::BannerNotFound(banner_id.to_string()))?;
        self.validated(config)
    }

    /// 获取卡池的指定版本，用于审计重放
    pub async fn get_banner_version(
        &self,
        banner_id: &str,
        version: i64,
    ) -> Result<Arc<BannerConfig>> {
        let key = (banner_id.to_string(), version);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.clone());
        }

        let config = self
            .repo
            .get_banner_version(banner_id, version)
            .await?
            .ok_or_else(|| {
                GachaError::BannerNotFound(format!("{} (version {})", banner_id, version))
            })?;
        self.validated(config)
    }

    /// 列出所有配置合法的卡池，非法配置跳过并记录告警
    pub async fn list_banners(&self) -> Result<Vec<Arc<BannerConfig>>> {
        let configs = self.repo.list_banners().await?;
        let mut banners = Vec::with_capacity(configs.len());
        for config in configs {
            let banner_id = config.id.clone();
            match self.validated(config) {
                Ok(banner) => banners.push(banner),
                Err(e) => warn!(banner_id = %banner_id, error = %e, "卡池配置非法，已跳过"),
            }
        }
        Ok(banners)
    }

    /// 发布卡池配置
    ///
    /// 校验失败时不落库。已发布的版本不可修改：内容相同的重复发布直接返回已有配置，
    /// 内容不同返回 `BannerVersionExists`
    #[instrument(skip(self, config), fields(banner_id = %config.id, version = config.version))]
    pub async fn publish(&self, config: BannerConfig) -> Result<Arc<BannerConfig>> {
        validate_banner(&config)?;

        if !self.repo.insert_banner(&config).await? {
            let existing = self
                .repo
                .get_banner_version(&config.id, config.version)
                .await?
                .ok_or_else(|| {
                    GachaError::Internal(format!(
                        "卡池 {} 版本 {} 写入冲突但未找到已有配置",
                        config.id, config.version
                    ))
                })?;
            if existing != config {
                warn!("卡池版本已发布，拒绝修改已有版本");
                return Err(GachaError::BannerVersionExists {
                    banner_id: config.id,
                    version: config.version,
                });
            }
            info!("卡池版本已存在且内容一致，按重复发布处理");
            return self.validated(existing);
        }

        let banner = Arc::new(config);
        self.cache
            .insert((banner.id.clone(), banner.version), banner.clone());

        info!("卡池配置已发布");
        Ok(banner)
    }

    fn validated(&self, config: BannerConfig) -> Result<Arc<BannerConfig>> {
        let key = (config.id.clone(), config.version);
        if let Some(cached) = self.cache.get(&key) {
            return Ok(cached.clone());
        }

        validate_banner(&config)?;
        let banner = Arc::new(config);
        self.cache.insert(key, banner.clone());
        Ok(banner)
    }
}
