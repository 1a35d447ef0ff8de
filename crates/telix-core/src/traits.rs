use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use telix_types::{AnomalyEvent, TelemetryReading};

/// 设备目录条目
///
/// 设备持久化由外部注册表负责，核心只读取。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceEntry {
    /// 设备 ID
    pub id: String,

    /// 设备名称
    pub name: String,

    /// 设备类型名称
    pub device_type: String,

    /// 最后在线时间
    pub last_seen: Option<DateTime<Utc>>,
}

impl DeviceEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>, device_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            device_type: device_type.into(),
            last_seen: None,
        }
    }
}

/// 只读设备目录
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    /// 列出所有设备类型名称
    async fn list_device_types(&self) -> anyhow::Result<Vec<String>>;

    /// 列出所有设备
    async fn list_devices(&self) -> anyhow::Result<Vec<DeviceEntry>>;

    /// 更新设备最后在线时间
    async fn touch(&self, device_id: &str, seen_at: DateTime<Utc>) -> anyhow::Result<()>;
}

/// 遥测写入端
///
/// 假定持久层可安全处理至少一次投递，(device_id, sequence) 为天然去重键。
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// 写入遥测读数
    async fn write_reading(&self, reading: &TelemetryReading) -> anyhow::Result<()>;

    /// 写入异常事件
    async fn write_event(&self, event: &AnomalyEvent) -> anyhow::Result<()>;
}

/// 异常事件发布端（fire-and-forget）
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// 发布异常事件，无响应
    async fn publish(&self, event: AnomalyEvent);
}
