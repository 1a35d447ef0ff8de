use crate::baseline::BaselineWindow;
use crate::error::{IngestError, Result};
use dashmap::DashMap;
use telix_types::{AnomalyEvent, Severity, TelemetryReading};
use tracing::debug;

/// z-score 严重级别阈值（对 |z| 取档）
#[derive(Debug, Clone, Copy)]
pub struct SeverityThresholds {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            low: 1.5,
            medium: 2.0,
            high: 3.0,
            critical: 4.0,
        }
    }
}

impl SeverityThresholds {
    pub fn validate(&self) -> Result<()> {
        let bands = [self.low, self.medium, self.high, self.critical];
        if bands.iter().any(|b| !b.is_finite() || *b <= 0.0) {
            return Err(IngestError::InvalidConfig(
                "severity thresholds must be finite and positive".to_string(),
            ));
        }
        if !(self.low < self.medium && self.medium < self.high && self.high < self.critical) {
            return Err(IngestError::InvalidConfig(
                "severity thresholds must be strictly increasing".to_string(),
            ));
        }
        Ok(())
    }
}

/// 异常引擎配置
#[derive(Debug, Clone)]
pub struct AnomalyConfig {
    /// 窗口容量
    pub window_capacity: usize,

    /// 预热样本数：样本不足时不判定
    pub warmup: usize,

    /// 方差下限：低于此值视为常量信号，不判定
    pub variance_floor: f64,

    /// 严重级别阈值
    pub thresholds: SeverityThresholds,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            window_capacity: 120,
            warmup: 20,
            variance_floor: 1e-9,
            thresholds: SeverityThresholds::default(),
        }
    }
}

impl AnomalyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.warmup < 2 {
            return Err(IngestError::InvalidConfig(
                "warmup must be at least 2".to_string(),
            ));
        }
        if self.window_capacity < self.warmup {
            return Err(IngestError::InvalidConfig(format!(
                "window_capacity ({}) must be >= warmup ({})",
                self.window_capacity, self.warmup
            )));
        }
        if !self.variance_floor.is_finite() || self.variance_floor < 0.0 {
            return Err(IngestError::InvalidConfig(
                "variance_floor must be finite and non-negative".to_string(),
            ));
        }
        self.thresholds.validate()
    }
}

type BaselineKey = (String, String);

/// 异常引擎
///
/// 按 (device_id, metric) 维护滚动基线。窗口表按 key 分片
/// （dashmap entry 独占访问），没有全局锁瓶颈。
///
/// 新值无论是否异常都计入后续基线：持续偏移最终会被当作新常态，
/// 这是有意的漂移容忍策略。
pub struct AnomalyEngine {
    config: AnomalyConfig,
    windows: DashMap<BaselineKey, BaselineWindow>,
}

impl AnomalyEngine {
    pub fn new(config: AnomalyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            windows: DashMap::new(),
        })
    }

    pub fn with_defaults() -> Self {
        Self {
            config: AnomalyConfig::default(),
            windows: DashMap::new(),
        }
    }

    /// 判定一条读数
    ///
    /// 窗口惰性创建，"基线缺失"不是可达的失败路径。
    pub fn classify(&self, reading: &TelemetryReading) -> Option<AnomalyEvent> {
        let key = (reading.device_id.clone(), reading.metric.clone());
        let mut window = self
            .windows
            .entry(key)
            .or_insert_with(|| BaselineWindow::new(self.config.window_capacity));

        // 历史不足，只积累不判定
        if window.len() < self.config.warmup {
            window.push(reading.value);
            return None;
        }

        let mean = window.mean();
        let variance = window.variance();
        let event = if variance <= self.config.variance_floor {
            // 常量信号：不做除零判定
            None
        } else {
            let stddev = variance.sqrt();
            let z = (reading.value - mean) / stddev;
            self.severity_for(z.abs()).map(|severity| {
                debug!(
                    device_id = %reading.device_id,
                    metric = %reading.metric,
                    z = z,
                    severity = severity.as_str(),
                    "Anomaly detected"
                );
                AnomalyEvent::new(
                    reading.device_id.clone(),
                    reading.metric.clone(),
                    severity,
                    reading.value,
                    mean,
                    stddev,
                )
                .with_timestamp(reading.timestamp)
            })
        };

        window.push(reading.value);
        event
    }

    fn severity_for(&self, abs_z: f64) -> Option<Severity> {
        let t = &self.config.thresholds;
        if abs_z >= t.critical {
            Some(Severity::Critical)
        } else if abs_z >= t.high {
            Some(Severity::High)
        } else if abs_z >= t.medium {
            Some(Severity::Medium)
        } else if abs_z >= t.low {
            Some(Severity::Low)
        } else {
            None
        }
    }

    /// 当前跟踪的 (device, metric) 基线数
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }
}
