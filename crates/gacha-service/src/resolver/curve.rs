//! 软保底曲线

use crate::models::SoftPityCurve;

impl SoftPityCurve {
    /// 第 n 抽（1-based）出最高稀有度的概率
    ///
    /// - n < soft_start: 基础概率
    /// - soft_start <= n < hard_limit: 按曲线单调上升，始终小于 1
    /// - n >= hard_limit: 1
    pub fn top_probability(&self, base: f64, n: u32, soft_start: u32, hard_limit: u32) -> f64 {
        if n >= hard_limit {
            return 1.0;
        }
        if n < soft_start {
            return base;
        }

        let steps = f64::from(n - soft_start + 1);
        let span = f64::from(hard_limit - soft_start + 1);
        let t = steps / span;

        let p = match self {
            Self::Linear => base + (1.0 - base) * t,
            Self::Power { exponent } => base + (1.0 - base) * t.powf(*exponent),
            Self::Step { increment } => base + increment * steps,
        };

        p.clamp(base, 1.0)
    }

    /// 曲线参数是否合法
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Linear => Ok(()),
            Self::Power { exponent } if exponent.is_finite() && *exponent > 0.0 => Ok(()),
            Self::Power { exponent } => Err(format!("power 曲线指数必须为正数: {}", exponent)),
            Self::Step { increment } if increment.is_finite() && *increment >= 0.0 => Ok(()),
            Self::Step { increment } => Err(format!("step 曲线增量不能为负: {}", increment)),
        }
    }
}
