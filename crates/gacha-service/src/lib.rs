//! 抽卡服务
//!
//! 提供带保底的抽卡、背包与养成功能的 REST API。
//!
//! ## 核心功能
//!
//! - **卡池配置**：多档位权重、软/硬保底、UP 保底窗口，配置按版本保留
//! - **保底计数**：按 (用户, 卡池) 维护，乐观锁版本号保护并发写
//! - **抽卡引擎**：幂等键去重，冲突时有界重试，记录/保底/背包整体提交
//! - **随机解析**：纯计算，随机流由种子展开，可按记录审计重放
//! - **养成**：消耗材料强化背包物品，成功率随等级递减
//!
//! ## 模块结构
//!
//! - `models`: 领域模型定义
//! - `error`: 错误类型定义
//! - `banner`: 卡池配置校验与缓存
//! - `resolver`: 随机结果解析
//! - `repository`: 数据仓储层（PostgreSQL 与进程内实现）
//! - `service`: 业务服务层
//! - `catalog`: 物品目录
//! - `identity`: 调用方身份校验
//! - `handlers` / `routes` / `middleware` / `dto`: HTTP 接口
//! - `seed`: 种子数据加载

pub mod banner;
pub mod catalog;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod resolver;
pub mod routes;
pub mod seed;
pub mod service;
pub mod state;

pub use banner::{BannerService, validate_banner};
pub use catalog::{ItemCatalog, ItemMetadata, StaticItemCatalog};
pub use error::{GachaError, Result};
pub use identity::{Claims, IdentityVerifier, JwtIdentityVerifier};
pub use models::*;
pub use repository::{
    BannerRepository, InventoryRepository, MemoryStore, PityRepository, PullRepository,
};
pub use resolver::{ChaChaDrawFactory, DrawSource, DrawSourceFactory, ScriptedDrawFactory};
pub use seed::SeedData;
pub use service::{EnhancementService, GachaQueryService, PullEngine};
pub use state::{AppState, Repositories};
