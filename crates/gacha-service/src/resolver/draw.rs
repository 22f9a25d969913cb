//! 随机数来源
//!
//! 解析器只通过 `DrawSource` 取 [0, 1) 的随机数，生产环境使用带种子的 ChaCha8 流，
//! 测试使用预设序列。

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// 随机数来源
pub trait DrawSource {
    /// 取下一个 [0, 1) 的均匀随机数
    fn next_unit(&mut self) -> f64;
}

/// 基于 RNG 的随机数来源
pub struct RngDraws<R> {
    rng: R,
    consumed: usize,
}

impl<R: Rng> RngDraws<R> {
    pub fn new(rng: R) -> Self {
        Self { rng, consumed: 0 }
    }

    /// 已消耗的随机数个数
    pub fn consumed(&self) -> usize {
        self.consumed
    }
}

impl RngDraws<ChaCha8Rng> {
    /// 由 u64 种子构造可复现的随机流
    pub fn seeded(seed: u64) -> Self {
        Self::new(ChaCha8Rng::seed_from_u64(seed))
    }
}

impl<R: Rng> DrawSource for RngDraws<R> {
    fn next_unit(&mut self) -> f64 {
        self.consumed += 1;
        self.rng.random::<f64>()
    }
}

/// 预设序列的随机数来源
///
/// 序列耗尽后从头循环，空序列恒返回 0.0
#[derive(Debug, Clone, Default)]
pub struct ScriptedDraws {
    values: Vec<f64>,
    consumed: usize,
}

impl ScriptedDraws {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            consumed: 0,
        }
    }

    pub fn consumed(&self) -> usize {
        self.consumed
    }
}

impl DrawSource for ScriptedDraws {
    fn next_unit(&mut self) -> f64 {
        let value = if self.values.is_empty() {
            0.0
        } else {
            self.values[self.consumed % self.values.len()]
        };
        self.consumed += 1;
        value
    }
}

/// 随机流工厂
///
/// 每次提交尝试取一个新种子，种子写入抽卡记录，审计时用同一种子重建随机流
pub trait DrawSourceFactory: Send + Sync {
    fn next_seed(&self) -> u64;

    fn draws(&self, seed: u64) -> Box<dyn DrawSource + Send>;
}

/// 生产环境的随机流工厂：线程 RNG 取种子，ChaCha8 展开
#[derive(Debug, Clone, Copy, Default)]
pub struct ChaChaDrawFactory;

impl DrawSourceFactory for ChaChaDrawFactory {
    fn next_seed(&self) -> u64 {
        rand::random()
    }

    fn draws(&self, seed: u64) -> Box<dyn DrawSource + Send> {
        Box::new(RngDraws::seeded(seed))
    }
}

/// 固定序列的随机流工厂（测试与演示）
///
/// 每次尝试都从序列开头重放，种子恒为 0
#[derive(Debug, Clone, Default)]
pub struct ScriptedDrawFactory {
    values: Vec<f64>,
}

impl ScriptedDrawFactory {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }
}

impl DrawSourceFactory for ScriptedDrawFactory {
    fn next_seed(&self) -> u64 {
        0
    }

    fn draws(&self, _seed: u64) -> Box<dyn DrawSource + Send> {
        Box::new(ScriptedDraws::new(self.values.clone()))
    }
}
