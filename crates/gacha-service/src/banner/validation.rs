//! 卡池配置校验
//!
//! 配置在加载时整体校验，任何一条不满足都视为配置错误，卡池不可用于抽卡。

use std::collections::HashSet;

use crate::error::{GachaError, Result};
use crate::models::BannerConfig;

/// 校验卡池配置
pub fn validate_banner(config: &BannerConfig) -> Result<()> {
    let fail = |message: String| -> Result<()> {
        Err(GachaError::ConfigError(format!(
            "banner={} version={}: {}",
            config.id, config.version, message
        )))
    };

    if config.tiers.is_empty() {
        return fail("至少需要一个稀有度档位".to_string());
    }

    let mut tier_ids = HashSet::new();
    let mut ranks = HashSet::new();
    for tier in &config.tiers {
        if !tier_ids.insert(tier.id.as_str()) {
            return fail(format!("档位 ID 重复: {}", tier.id));
        }
        if !ranks.insert(tier.rank) {
            return fail(format!("档位 rank 重复: {}", tier.rank));
        }
        if !tier.base_weight.is_finite() || tier.base_weight < 0.0 {
            return fail(format!("档位 {} 的基础权重非法: {}", tier.id, tier.base_weight));
        }
    }

    if config.total_base_weight() <= 0.0 {
        return fail("基础权重之和必须大于 0".to_string());
    }

    if config.soft_pity_start == 0 || config.soft_pity_start >= config.hard_pity_limit {
        return fail(format!(
            "需要 0 < soft_pity_start < hard_pity_limit，实际为 {} / {}",
            config.soft_pity_start, config.hard_pity_limit
        ));
    }

    if let Err(message) = config.soft_pity_curve.validate() {
        return fail(message);
    }

    if !config.featured_rate.is_finite() || !(0.0..=1.0).contains(&config.featured_rate) {
        return fail(format!("featured_rate 必须在 [0, 1] 内: {}", config.featured_rate));
    }

    for tier_id in config.item_pool.keys() {
        if !tier_ids.contains(tier_id.as_str()) {
            return fail(format!("物品池引用了未声明的档位: {}", tier_id));
        }
    }

    for tier in &config.tiers {
        let pool = config.pool(&tier.id);
        if pool.is_empty() {
            return fail(format!("档位 {} 没有物品", tier.id));
        }
        if pool.iter().any(|e| !e.weight.is_finite() || e.weight < 0.0) {
            return fail(format!("档位 {} 存在非法的物品权重", tier.id));
        }
        if pool.iter().map(|e| e.weight).sum::<f64>() <= 0.0 {
            return fail(format!("档位 {} 的物品权重之和必须大于 0", tier.id));
        }
    }

    let Some(top) = config.top_tier() else {
        return fail("缺少最高稀有度档位".to_string());
    };

    if let Some(window) = config.featured_guarantee_window {
        if window == 0 {
            return fail("featured_guarantee_window 至少为 1".to_string());
        }
        if !top.is_featured {
            return fail(format!("UP 保底要求最高档位 {} 标记为 is_featured", top.id));
        }
    }

    // 最高档位同时带 UP 与常驻条目时，解析器会先分流再选物品，两侧都必须可选
    if top.is_featured {
        let top_pool = config.pool(&top.id);
        let has_featured = top_pool.iter().any(|e| e.featured);
        let has_standard = top_pool.iter().any(|e| !e.featured);

        if config.featured_guarantee_window.is_some() && !(has_featured && has_standard) {
            return fail(format!(
                "UP 保底要求档位 {} 同时包含 UP 与常驻物品",
                top.id
            ));
        }

        if has_featured && has_standard {
            let featured_weight: f64 =
                top_pool.iter().filter(|e| e.featured).map(|e| e.weight).sum();
            let standard_weight: f64 =
                top_pool.iter().filter(|e| !e.featured).map(|e| e.weight).sum();
            if featured_weight <= 0.0 || standard_weight <= 0.0 {
                return fail(format!(
                    "档位 {} 的 UP 物品与常驻物品权重之和都必须大于 0",
                    top.id
                ));
            }
        }
    }

    Ok(())
}
