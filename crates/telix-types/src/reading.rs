use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 单条遥测读数
///
/// 序列号按设备单调递增，(device_id, sequence) 可作为下游去重键。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    /// 设备 ID
    pub device_id: String,

    /// 指标名称
    pub metric: String,

    /// 指标值
    pub value: f64,

    /// 采集时间
    pub timestamp: DateTime<Utc>,

    /// 设备级序列号（单调递增）
    pub sequence: u64,
}

impl TelemetryReading {
    pub fn new(device_id: impl Into<String>, metric: impl Into<String>, value: f64, sequence: u64) -> Self {
        Self {
            device_id: device_id.into(),
            metric: metric.into(),
            value,
            timestamp: Utc::now(),
            sequence,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// 编码为 JSON 线上载荷
    pub fn to_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// 从线上载荷解码
    pub fn from_payload(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_round_trip() {
        let reading = TelemetryReading::new("dev_001", "temperature", 21.734982147512345, 42);

        let payload = reading.to_payload().unwrap();
        let decoded = TelemetryReading::from_payload(&payload).unwrap();

        assert_eq!(decoded.device_id, reading.device_id);
        assert_eq!(decoded.metric, reading.metric);
        assert_eq!(decoded.sequence, reading.sequence);
        assert_eq!(decoded.timestamp, reading.timestamp);
        // f64 精度不丢失
        assert_eq!(decoded.value.to_bits(), reading.value.to_bits());
    }

    #[test]
    fn test_malformed_payload_rejected() {
        assert!(TelemetryReading::from_payload(b"not json").is_err());
        assert!(TelemetryReading::from_payload(b"{\"device_id\":\"x\"}").is_err());
    }
}
