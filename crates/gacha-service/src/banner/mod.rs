//! 卡池配置模块
//!
//! 负责卡池配置的加载、校验与版本缓存

mod service;
mod validation;

pub use service::BannerService;
pub use validation::validate_banner;
