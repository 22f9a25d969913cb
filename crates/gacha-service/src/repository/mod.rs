//! 数据仓储层
//!
//! 提供卡池配置、保底状态、抽卡记录与背包养成的数据访问接口。
//!
//! ## 设计原则
//!
//! - 仓储只负责持久化，不包含业务逻辑
//! - 每个写接口都是一次整体提交，带版本校验，失败时不落任何数据
//! - PostgreSQL 与进程内存储实现同一组 trait，服务层只依赖 trait

mod banner_repo;
mod inventory_repo;
mod memory;
mod pity_repo;
mod pull_repo;
mod traits;

pub use banner_repo::BannerRepository;
pub use inventory_repo::InventoryRepository;
pub use memory::MemoryStore;
pub use pity_repo::PityRepository;
pub use pull_repo::PullRepository;
pub use traits::*;
