use crate::error::{Result, SignalError};
use serde::{Deserialize, Serialize};

/// 单个指标的基线波形参数
///
/// 基线 = offset + amplitude * sin(2π * tick / period) + drift * tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSpec {
    /// 指标名称
    pub name: String,

    /// 基线偏移
    pub offset: f64,

    /// 振幅
    pub amplitude: f64,

    /// 周期（tick 数）
    pub period: f64,

    /// 每 tick 线性漂移（如电池缓慢放电）
    pub drift: f64,

    /// 单位
    pub unit: Option<String>,
}

impl MetricSpec {
    pub fn new(name: impl Into<String>, offset: f64, amplitude: f64, period: f64) -> Self {
        Self {
            name: name.into(),
            offset,
            amplitude,
            period,
            drift: 0.0,
            unit: None,
        }
    }

    pub fn with_drift(mut self, drift: f64) -> Self {
        self.drift = drift;
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// 噪声幅度参考值：有振幅用振幅，纯直流信号退回到偏移的 5%
    pub fn noise_span(&self) -> f64 {
        if self.amplitude != 0.0 {
            self.amplitude.abs()
        } else {
            self.offset.abs() * 0.05
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(SignalError::InvalidSpec("metric name is empty".to_string()));
        }
        if !self.period.is_finite() || self.period <= 0.0 {
            return Err(SignalError::InvalidSpec(format!(
                "metric '{}': period must be finite and positive, got {}",
                self.name, self.period
            )));
        }
        for (field, value) in [
            ("offset", self.offset),
            ("amplitude", self.amplitude),
            ("drift", self.drift),
        ] {
            if !value.is_finite() {
                return Err(SignalError::InvalidSpec(format!(
                    "metric '{}': {} must be finite, got {}",
                    self.name, field, value
                )));
            }
        }
        Ok(())
    }
}

/// 设备类型定义
///
/// 配置时创建，之后不可变。未知指标在配置加载时拒绝，而不是发布时。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceTypeSpec {
    /// 类型名称
    pub name: String,

    /// 指标列表（有序）
    pub metrics: Vec<MetricSpec>,

    /// 默认噪声因子 [0, 1]
    pub noise_factor: f64,

    /// 默认故障率 [0, 1]
    pub failure_rate: f64,
}

impl DeviceTypeSpec {
    pub fn new(name: impl Into<String>, metrics: Vec<MetricSpec>) -> Self {
        Self {
            name: name.into(),
            metrics,
            noise_factor: 0.05,
            failure_rate: 0.01,
        }
    }

    pub fn with_noise_factor(mut self, noise_factor: f64) -> Self {
        self.noise_factor = noise_factor;
        self
    }

    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = failure_rate;
        self
    }

    /// 按名称查找指标
    pub fn metric(&self, name: &str) -> Option<&MetricSpec> {
        self.metrics.iter().find(|m| m.name == name)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(SignalError::InvalidSpec("device type name is empty".to_string()));
        }
        if self.metrics.is_empty() {
            return Err(SignalError::InvalidSpec(format!(
                "device type '{}' declares no metrics",
                self.name
            )));
        }
        for (i, metric) in self.metrics.iter().enumerate() {
            metric.validate()?;
            if self.metrics[..i].iter().any(|m| m.name == metric.name) {
                return Err(SignalError::InvalidSpec(format!(
                    "device type '{}': duplicate metric '{}'",
                    self.name, metric.name
                )));
            }
        }
        for (field, value) in [
            ("noise_factor", self.noise_factor),
            ("failure_rate", self.failure_rate),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SignalError::InvalidSpec(format!(
                    "device type '{}': {} must be in [0, 1], got {}",
                    self.name, field, value
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_spec() {
        let spec = DeviceTypeSpec::new(
            "temperature",
            vec![MetricSpec::new("temperature", 20.5, 3.5, 288.0).with_unit("°C")],
        );
        assert!(spec.validate().is_ok());
        assert!(spec.metric("temperature").is_some());
        assert!(spec.metric("pressure").is_none());
    }

    #[test]
    fn test_duplicate_metric_rejected() {
        let spec = DeviceTypeSpec::new(
            "broken",
            vec![
                MetricSpec::new("temperature", 20.0, 1.0, 10.0),
                MetricSpec::new("temperature", 30.0, 2.0, 10.0),
            ],
        );
        assert!(matches!(spec.validate(), Err(SignalError::InvalidSpec(_))));
    }

    #[test]
    fn test_invalid_period_rejected() {
        let spec = MetricSpec::new("temperature", 20.0, 1.0, 0.0);
        assert!(spec.validate().is_err());

        let spec = MetricSpec::new("temperature", 20.0, 1.0, f64::NAN);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_out_of_range_rates_rejected() {
        let spec = DeviceTypeSpec::new(
            "temperature",
            vec![MetricSpec::new("temperature", 20.0, 1.0, 10.0)],
        )
        .with_failure_rate(1.5);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_noise_span_dc_signal() {
        // 纯直流信号（如电池电量）退回到偏移的 5%
        let spec = MetricSpec::new("battery", 100.0, 0.0, 288.0);
        assert!((spec.noise_span() - 5.0).abs() < 1e-12);
    }
}
