//! 随机结果解析模块
//!
//! 只做 CPU 计算，不做任何 I/O：
//!
//! - `draw`: 随机数来源与随机流工厂
//! - `curve`: 软保底曲线
//! - `resolve`: 单抽解析与批次折叠

mod curve;
pub mod draw;
mod resolve;

pub use draw::{
    ChaChaDrawFactory, DrawSource, DrawSourceFactory, RngDraws, ScriptedDrawFactory,
    ScriptedDraws,
};
pub use resolve::{Resolution, resolve, resolve_batch, top_probability};
