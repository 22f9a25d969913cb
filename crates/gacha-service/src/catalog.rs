//! 物品目录
//!
//! 只用于响应中的展示信息补全，不参与抽卡或强化的判定。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::models::ItemType;

/// 物品展示信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemMetadata {
    pub name: String,
    pub rarity: u32,
    pub item_type: ItemType,
}

/// 物品目录接口
#[cfg_attr(test, mockall::automock)]
pub trait ItemCatalog: Send + Sync {
    fn get_item_metadata(&self, item_id: &str) -> Option<ItemMetadata>;

    /// 某类型下的全部物品 ID
    fn item_ids_of_type(&self, item_type: ItemType) -> Vec<String>;
}

/// 静态物品目录
#[derive(Debug, Clone, Default)]
pub struct StaticItemCatalog {
    items: HashMap<String, ItemMetadata>,
}

impl StaticItemCatalog {
    pub fn new(items: HashMap<String, ItemMetadata>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl ItemCatalog for StaticItemCatalog {
    fn get_item_metadata(&self, item_id: &str) -> Option<ItemMetadata> {
        self.items.get(item_id).cloned()
    }

    fn item_ids_of_type(&self, item_type: ItemType) -> Vec<String> {
        let mut ids: Vec<String> = self
            .items
            .iter()
            .filter(|(_, meta)| meta.item_type == item_type)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }
}
