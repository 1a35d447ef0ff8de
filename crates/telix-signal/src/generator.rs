use crate::error::{Result, SignalError};
use crate::spec::MetricSpec;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::TAU;

/// 指标基线值（无噪声）
pub fn baseline(spec: &MetricSpec, tick: u64) -> f64 {
    spec.offset + spec.amplitude * (TAU * tick as f64 / spec.period).sin() + spec.drift * tick as f64
}

/// 信号发生器
///
/// 固定种子下完全确定；不同设备用不同种子即得到互不相同的序列。
/// 故障注入不在这里建模，由设备运行时负责。
pub struct SignalGenerator {
    rng: StdRng,
}

impl SignalGenerator {
    /// 以固定种子创建
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// 生成一个指标值：基线 + 有界加性噪声
    ///
    /// 噪声取自 [-1, 1] 均匀分布，按 noise_factor 与指标的噪声幅度缩放。
    /// 非有限结果视为波形参数损坏，属致命配置错误。
    pub fn generate(&mut self, spec: &MetricSpec, tick: u64, noise_factor: f64) -> Result<f64> {
        let base = baseline(spec, tick);
        let noise = (self.rng.gen::<f64>() * 2.0 - 1.0) * noise_factor * spec.noise_span();
        let value = base + noise;

        if !value.is_finite() {
            return Err(SignalError::NonFiniteValue {
                metric: spec.name.clone(),
                tick,
            });
        }
        Ok(value)
    }
}
