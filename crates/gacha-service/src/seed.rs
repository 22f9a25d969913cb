//! 种子数据
//!
//! 启动时从 JSON 文件加载卡池配置、物品目录与初始材料，用于本地开发和演示环境

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::banner::BannerService;
use crate::catalog::{ItemMetadata, StaticItemCatalog};
use crate::error::{GachaError, Result};
use crate::models::BannerConfig;
use crate::service::EnhancementService;

/// 种子文件内容
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeedData {
    pub banners: Vec<BannerConfig>,
    /// 物品 ID -> 展示信息
    pub items: HashMap<String, ItemMetadata>,
    /// 用户 ID -> 初始材料
    pub materials: BTreeMap<String, BTreeMap<String, i64>>,
}

impl SeedData {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            GachaError::Internal(format!("读取种子文件 {} 失败: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn catalog(&self) -> StaticItemCatalog {
        StaticItemCatalog::new(self.items.clone())
    }

    /// 发布种子卡池并发放初始材料
    ///
    /// 单个卡池校验失败只记录告警，不影响其他卡池
    pub async fn apply(
        &self,
        banners: &BannerService,
        enhancement: &EnhancementService,
    ) -> Result<()> {
        let mut published = 0;
        for banner in &self.banners {
            match banners.publish(banner.clone()).await {
                Ok(_) => published += 1,
                Err(GachaError::ConfigError(message)) => {
                    warn!(banner_id = %banner.id, error = %message, "种子卡池配置非法，已跳过");
                }
                Err(e @ GachaError::BannerVersionExists { .. }) => {
                    warn!(banner_id = %banner.id, error = %e, "种子卡池与已发布版本不一致，已跳过");
                }
                Err(e) => return Err(e),
            }
        }

        for (user_id, materials) in &self.materials {
            enhancement
                .grant_materials(user_id, materials.clone())
                .await?;
        }

        info!(
            banners = published,
            items = self.items.len(),
            wallets = self.materials.len(),
            "种子数据已加载"
        );
        Ok(())
    }
}
