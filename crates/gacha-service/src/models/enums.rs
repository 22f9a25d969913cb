//! 抽卡服务枚举类型定义

use serde::{Deserialize, Serialize};

use crate::error::GachaError;

/// 保底触发类型
///
/// 记录单抽结果是被哪种保底强制出来的，概率自然出货时为空
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuaranteeKind {
    /// 硬保底 - 距上次最高稀有度的抽数达到上限
    HardPity,
    /// UP 保底 - 距上次 UP 物品的抽数达到窗口
    FeaturedGuarantee,
}

/// 单次请求的抽卡次数
///
/// 只允许单抽和十连
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum BatchSize {
    Single,
    Ten,
}

impl BatchSize {
    pub fn count(&self) -> u32 {
        match self {
            Self::Single => 1,
            Self::Ten => 10,
        }
    }
}

impl TryFrom<u32> for BatchSize {
    type Error = GachaError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Single),
            10 => Ok(Self::Ten),
            other => Err(GachaError::InvalidBatchSize(other)),
        }
    }
}

impl From<BatchSize> for u32 {
    fn from(value: BatchSize) -> Self {
        value.count()
    }
}

/// 物品类型（目录元数据）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemType {
    Character,
    Weapon,
    Material,
}

impl std::str::FromStr for ItemType {
    type Err = GachaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "character" => Ok(Self::Character),
            "weapon" => Ok(Self::Weapon),
            "material" => Ok(Self::Material),
            other => Err(GachaError::Validation(format!("未知的物品类型: {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_size_accepts_single_and_ten() {
        assert_eq!(BatchSize::try_from(1).unwrap(), BatchSize::Single);
        assert_eq!(BatchSize::try_from(10).unwrap().count(), 10);
    }

    #[test]
    fn test_batch_size_rejects_other_counts() {
        for n in [0, 2, 5, 11, 100] {
            let err = BatchSize::try_from(n).unwrap_err();
            assert!(matches!(err, GachaError::InvalidBatchSize(v) if v == n));
        }
    }

    #[test]
    fn test_batch_size_serde() {
        let size: BatchSize = serde_json::from_str("10").unwrap();
        assert_eq!(size, BatchSize::Ten);
        assert!(serde_json::from_str::<BatchSize>("3").is_err());
        assert_eq!(serde_json::to_string(&BatchSize::Single).unwrap(), "1");
    }

    #[test]
    fn test_guarantee_kind_serde() {
        let json = serde_json::to_string(&GuaranteeKind::HardPity).unwrap();
        assert_eq!(json, "\"HARD_PITY\"");
    }

    #[test]
    fn test_item_type_from_str() {
        assert_eq!("Weapon".parse::<ItemType>().unwrap(), ItemType::Weapon);
        assert!("pet".parse::<ItemType>().is_err());
    }
}
