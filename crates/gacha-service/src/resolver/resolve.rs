//! 单抽解析
//!
//! 纯函数：输入卡池配置、保底计数和随机数来源，输出结果与新的计数。
//! 相同的 (配置, 计数, 随机序列) 必然得到相同输出。
//!
//! 随机数消耗规则（审计重放依赖此顺序）：
//! 1. 档位判定固定消耗 1 个，即使被保底强制
//! 2. 出最高稀有度且存在 UP 分流时，UP 保底未到期则再消耗 1 个决定是否 UP
//! 3. 物品选择消耗 1 个

use crate::error::{GachaError, Result};
use crate::models::{BannerConfig, GuaranteeKind, PityCounters, PoolEntry, RarityTier};

use super::draw::DrawSource;

/// 单抽解析结果
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub tier_id: String,
    pub rank: u32,
    pub item_id: String,
    pub featured: bool,
    pub guarantee: Option<GuaranteeKind>,
    /// 抽取时处于保底周期的第几抽（1-based）
    pub pity_counter_at_draw: u32,
    /// 本抽之后的计数
    pub counters: PityCounters,
}

/// 解析一抽
pub fn resolve<D: DrawSource + ?Sized>(
    config: &BannerConfig,
    pity: &PityCounters,
    draws: &mut D,
) -> Result<Resolution> {
    let top = config
        .top_tier()
        .ok_or_else(|| GachaError::ConfigError(format!("卡池 {} 没有稀有度档位", config.id)))?;

    let n = pity.pulls_since_last_top_rarity.saturating_add(1);
    let hard_due = n >= config.hard_pity_limit;
    let featured_due = featured_window(config, top)
        .is_some_and(|window| pity.pulls_since_last_featured.saturating_add(1) >= window);

    let tier_unit = draws.next_unit();
    let tier = if hard_due || featured_due {
        top
    } else {
        pick_tier(config, top, n, tier_unit)
    };
    let is_top = tier.id == top.id;

    let pool = config.pool(&tier.id);
    let (candidates, featured_forced): (Vec<&PoolEntry>, bool) =
        if is_top && has_featured_split(top, pool) {
            let want_featured = featured_due || draws.next_unit() < config.featured_rate;
            let subset = pool.iter().filter(|e| e.featured == want_featured).collect();
            (subset, featured_due)
        } else {
            (pool.iter().collect(), false)
        };

    let entry = pick_item(&candidates, draws.next_unit()).ok_or_else(|| {
        GachaError::ConfigError(format!("卡池 {} 档位 {} 没有可选物品", config.id, tier.id))
    })?;

    let guarantee = if featured_forced {
        Some(GuaranteeKind::FeaturedGuarantee)
    } else if hard_due {
        Some(GuaranteeKind::HardPity)
    } else {
        None
    };

    let featured_top = is_top && entry.featured;
    let counters = PityCounters {
        pulls_since_last_top_rarity: if is_top { 0 } else { n },
        pulls_since_last_featured: if featured_top {
            0
        } else {
            pity.pulls_since_last_featured.saturating_add(1)
        },
        total_pulls: pity.total_pulls.saturating_add(1),
    };

    Ok(Resolution {
        tier_id: tier.id.clone(),
        rank: tier.rank,
        item_id: entry.item_id.clone(),
        featured: entry.featured,
        guarantee,
        pity_counter_at_draw: n,
        counters,
    })
}

/// 按顺序解析一个批次，批内计数逐抽向后传递
pub fn resolve_batch<D: DrawSource + ?Sized>(
    config: &BannerConfig,
    start: &PityCounters,
    count: u32,
    draws: &mut D,
) -> Result<Vec<Resolution>> {
    let mut counters = *start;
    let mut resolutions = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let resolution = resolve(config, &counters, draws)?;
        counters = resolution.counters;
        resolutions.push(resolution);
    }
    Ok(resolutions)
}

/// 第 n 抽（1-based）出最高稀有度的概率
pub fn top_probability(config: &BannerConfig, n: u32) -> f64 {
    let total = config.total_base_weight();
    let base = match config.top_tier() {
        Some(top) if total > 0.0 => top.base_weight / total,
        _ => 0.0,
    };
    config
        .soft_pity_curve
        .top_probability(base, n, config.soft_pity_start, config.hard_pity_limit)
}

/// 生效的 UP 保底窗口（只有最高档位带 UP 时才生效）
fn featured_window(config: &BannerConfig, top: &RarityTier) -> Option<u32> {
    config
        .featured_guarantee_window
        .filter(|_| top.is_featured)
}

fn has_featured_split(top: &RarityTier, pool: &[PoolEntry]) -> bool {
    top.is_featured && pool.iter().any(|e| e.featured) && pool.iter().any(|e| !e.featured)
}

/// 档位判定：最高档位取曲线概率，其余档位按基础权重瓜分剩余概率
fn pick_tier<'a>(config: &'a BannerConfig, top: &'a RarityTier, n: u32, u: f64) -> &'a RarityTier {
    let p_top = top_probability(config, n);
    if u < p_top {
        return top;
    }

    let mut others: Vec<&RarityTier> = config.tiers.iter().filter(|t| t.id != top.id).collect();
    others.sort_by(|a, b| b.rank.cmp(&a.rank));
    let others_weight: f64 = others.iter().map(|t| t.base_weight).sum();
    if others_weight <= 0.0 {
        return top;
    }

    let mut cumulative = p_top;
    for tier in &others {
        cumulative += (1.0 - p_top) * tier.base_weight / others_weight;
        if u < cumulative {
            return tier;
        }
    }

    // 浮点累加误差落在末尾时取最后一个有权重的档位
    others
        .iter()
        .rev()
        .find(|t| t.base_weight > 0.0)
        .copied()
        .unwrap_or(top)
}

fn pick_item<'a>(entries: &[&'a PoolEntry], u: f64) -> Option<&'a PoolEntry> {
    let total: f64 = entries.iter().map(|e| e.weight).sum();
    if total <= 0.0 {
        return None;
    }

    let target = u * total;
    let mut cumulative = 0.0;
    for entry in entries {
        cumulative += entry.weight;
        if target < cumulative {
            return Some(entry);
        }
    }

    entries.iter().rev().find(|e| e.weight > 0.0).copied()
}
