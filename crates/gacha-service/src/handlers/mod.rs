//! HTTP 请求处理器模块

pub mod admin;
pub mod gacha;
pub mod health;
pub mod inventory;
