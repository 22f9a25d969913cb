//! 抽卡服务领域模型
//!
//! 包含卡池、保底、抽卡记录与背包养成的核心实体定义

pub mod banner;
pub mod enums;
pub mod inventory;
pub mod pity;
pub mod pull;

pub use banner::{BannerConfig, PoolEntry, RarityTier, SoftPityCurve};
pub use enums::{BatchSize, GuaranteeKind, ItemType};
pub use inventory::{EnhancementAttempt, InventoryFilter, InventoryItem, MaterialWallet};
pub use pity::{PityCounters, PityState};
pub use pull::{PullRecord, PullResult};
