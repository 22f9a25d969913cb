//! 服务层
//!
//! 实现抽卡、养成与查询业务逻辑，只依赖仓储 trait。
//!
//! ## 模块结构
//!
//! - `dto`: 服务层输入输出
//! - `pull_engine`: 抽卡引擎（幂等、乐观并发、有界重试）
//! - `enhancement_service`: 养成（强化）服务
//! - `query_service`: 只读查询

pub mod dto;
pub mod enhancement_service;
pub mod pull_engine;
pub mod query_service;

pub use dto::*;
pub use enhancement_service::{
    EnhancementPolicy, EnhancementService, FailurePolicy, SuccessCurve,
};
pub use pull_engine::PullEngine;
pub use query_service::GachaQueryService;
