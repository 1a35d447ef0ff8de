use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 异常严重级别
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

/// 异常事件
///
/// 由异常引擎产生后不可变；确认状态由外部持久层跟踪。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyEvent {
    /// 事件 ID
    pub id: Uuid,

    /// 设备 ID
    pub device_id: String,

    /// 指标名称
    pub metric: String,

    /// 严重级别
    pub severity: Severity,

    /// 观测值
    pub observed: f64,

    /// 检测时的基线均值
    pub baseline_mean: f64,

    /// 检测时的基线标准差
    pub baseline_stddev: f64,

    /// 检测时间
    pub timestamp: DateTime<Utc>,
}

impl AnomalyEvent {
    pub fn new(
        device_id: impl Into<String>,
        metric: impl Into<String>,
        severity: Severity,
        observed: f64,
        baseline_mean: f64,
        baseline_stddev: f64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            device_id: device_id.into(),
            metric: metric.into(),
            severity,
            observed,
            baseline_mean,
            baseline_stddev,
            timestamp: Utc::now(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_serde_lowercase() {
        let json = serde_json::to_string(&Severity::Critical).unwrap();
        assert_eq!(json, "\"critical\"");

        let parsed: Severity = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(parsed, Severity::Medium);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_create_event() {
        let event = AnomalyEvent::new("dev_001", "pressure", Severity::High, 9.2, 3.5, 0.8);

        assert_eq!(event.device_id, "dev_001");
        assert_eq!(event.severity, Severity::High);
        assert_eq!(event.observed, 9.2);
    }
}
