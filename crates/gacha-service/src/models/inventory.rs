//! 背包与养成实体定义

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GachaError, Result};

/// 背包物品实例
///
/// 由抽卡发放创建，只有养成流程会修改 level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub id: Uuid,
    pub user_id: String,
    /// 目录中的物品 ID
    pub item_id: String,
    pub tier_id: String,
    pub level: i32,
    /// 乐观并发版本号
    pub version: i64,
    /// 来源抽卡记录
    pub source_pull_id: Option<Uuid>,
    pub acquired_at: DateTime<Utc>,
}

impl InventoryItem {
    /// 抽卡发放的新物品
    pub fn granted(
        user_id: &str,
        item_id: &str,
        tier_id: &str,
        source_pull_id: Uuid,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id: user_id.to_string(),
            item_id: item_id.to_string(),
            tier_id: tier_id.to_string(),
            level: 0,
            version: 1,
            source_pull_id: Some(source_pull_id),
            acquired_at: now,
        }
    }
}

/// 用户的养成材料钱包
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaterialWallet {
    pub user_id: String,
    /// 材料 ID -> 数量
    pub balances: BTreeMap<String, i64>,
    /// 乐观并发版本号，0 表示从未提交过
    pub version: i64,
    pub updated_at: DateTime<Utc>,
}

impl MaterialWallet {
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            balances: BTreeMap::new(),
            version: 0,
            updated_at: Utc::now(),
        }
    }

    pub fn balance(&self, material_id: &str) -> i64 {
        self.balances.get(material_id).copied().unwrap_or(0)
    }

    /// 按差值生成下一个版本（delta 为负表示扣减），数量为 0 的材料从钱包移除
    ///
    /// 数量溢出返回 `Validation`
    pub fn apply(&self, deltas: &BTreeMap<String, i64>) -> Result<Self> {
        let mut balances = self.balances.clone();
        for (material_id, delta) in deltas {
            let entry = balances.entry(material_id.clone()).or_insert(0);
            *entry = entry.checked_add(*delta).ok_or_else(|| {
                GachaError::Validation(format!(
                    "材料 {} 数量溢出: 当前 {}，变动 {}",
                    material_id, entry, delta
                ))
            })?;
        }
        balances.retain(|_, qty| *qty != 0);

        Ok(Self {
            user_id: self.user_id.clone(),
            balances,
            version: self.version + 1,
            updated_at: Utc::now(),
        })
    }
}

/// 强化尝试记录（只追加）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancementAttempt {
    pub id: Uuid,
    pub user_id: String,
    pub inventory_item_id: Uuid,
    pub item_id: String,
    pub materials_consumed: BTreeMap<String, i64>,
    pub success: bool,
    pub success_rate: f64,
    pub level_before: i32,
    pub level_after: i32,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 背包查询过滤条件
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InventoryFilter {
    pub tier_id: Option<String>,
    /// 限定目录物品 ID（由目录按物品类型展开）
    pub item_ids: Option<Vec<String>>,
}

impl InventoryFilter {
    pub fn matches(&self, item: &InventoryItem) -> bool {
        if let Some(tier_id) = &self.tier_id
            && &item.tier_id != tier_id
        {
            return false;
        }
        if let Some(item_ids) = &self.item_ids
            && !item_ids.contains(&item.item_id)
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wallet_apply_adds_and_removes() {
        let wallet = MaterialWallet::empty("user-1");
        let granted = wallet
            .apply(&BTreeMap::from([("ore".to_string(), 5)]))
            .unwrap();
        assert_eq!(granted.balance("ore"), 5);
        assert_eq!(granted.version, 1);

        let spent = granted
            .apply(&BTreeMap::from([("ore".to_string(), -5)]))
            .unwrap();
        assert_eq!(spent.balance("ore"), 0);
        assert!(spent.balances.is_empty());
        assert_eq!(spent.version, 2);
    }

    #[test]
    fn test_wallet_apply_rejects_overflow() {
        let wallet = MaterialWallet::empty("user-1")
            .apply(&BTreeMap::from([("ore".to_string(), i64::MAX)]))
            .unwrap();

        let err = wallet
            .apply(&BTreeMap::from([("ore".to_string(), 1)]))
            .unwrap_err();
        assert!(matches!(err, GachaError::Validation(_)));
        assert_eq!(wallet.balance("ore"), i64::MAX);
    }

    #[test]
    fn test_inventory_filter() {
        let item = InventoryItem::granted("user-1", "char_001", "5-star", Uuid::now_v7(), Utc::now());

        assert!(InventoryFilter::default().matches(&item));
        assert!(
            InventoryFilter {
                tier_id: Some("5-star".to_string()),
                item_ids: None
            }
            .matches(&item)
        );
        assert!(
            !InventoryFilter {
                tier_id: None,
                item_ids: Some(vec!["weapon_101".to_string()])
            }
            .matches(&item)
        );
    }
}
