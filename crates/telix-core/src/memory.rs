use crate::traits::{DeviceDirectory, DeviceEntry, TelemetrySink};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use telix_types::{AnomalyEvent, TelemetryReading};
use tokio::sync::RwLock;

/// 内存遥测写入端
///
/// 用于测试与回填演练；生产路径由外部持久层实现 TelemetrySink。
#[derive(Default)]
pub struct MemorySink {
    readings: RwLock<Vec<TelemetryReading>>,
    events: RwLock<Vec<AnomalyEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn readings(&self) -> Vec<TelemetryReading> {
        self.readings.read().await.clone()
    }

    pub async fn events(&self) -> Vec<AnomalyEvent> {
        self.events.read().await.clone()
    }

    pub async fn reading_count(&self) -> usize {
        self.readings.read().await.len()
    }

    pub async fn event_count(&self) -> usize {
        self.events.read().await.len()
    }
}

#[async_trait]
impl TelemetrySink for MemorySink {
    async fn write_reading(&self, reading: &TelemetryReading) -> anyhow::Result<()> {
        self.readings.write().await.push(reading.clone());
        Ok(())
    }

    async fn write_event(&self, event: &AnomalyEvent) -> anyhow::Result<()> {
        self.events.write().await.push(event.clone());
        Ok(())
    }
}

/// 内存设备目录
pub struct MemoryDirectory {
    devices: RwLock<HashMap<String, DeviceEntry>>,
}

impl MemoryDirectory {
    pub fn new(devices: Vec<DeviceEntry>) -> Self {
        let devices = devices.into_iter().map(|d| (d.id.clone(), d)).collect();
        Self {
            devices: RwLock::new(devices),
        }
    }
}

#[async_trait]
impl DeviceDirectory for MemoryDirectory {
    async fn list_device_types(&self) -> anyhow::Result<Vec<String>> {
        let devices = self.devices.read().await;
        let mut types: Vec<String> = devices.values().map(|d| d.device_type.clone()).collect();
        types.sort();
        types.dedup();
        Ok(types)
    }

    async fn list_devices(&self) -> anyhow::Result<Vec<DeviceEntry>> {
        let devices = self.devices.read().await;
        let mut entries: Vec<DeviceEntry> = devices.values().cloned().collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entries)
    }

    async fn touch(&self, device_id: &str, seen_at: DateTime<Utc>) -> anyhow::Result<()> {
        let mut devices = self.devices.write().await;
        if let Some(entry) = devices.get_mut(device_id) {
            entry.last_seen = Some(seen_at);
        }
        Ok(())
    }
}
