/// 设备遥测主题的通配订阅
pub const TELEMETRY_WILDCARD: &str = "devices/+/telemetry";

/// 构建设备遥测主题
pub fn telemetry_topic(device_id: &str) -> String {
    format!("devices/{}/telemetry", device_id)
}

/// 从主题中提取设备 ID
///
/// 主题格式: devices/{device_id}/telemetry
pub fn device_id_from_topic(topic: &str) -> Option<&str> {
    let mut parts = topic.split('/');
    if parts.next() != Some("devices") {
        return None;
    }
    let device_id = parts.next()?;
    if device_id.is_empty() || parts.next() != Some("telemetry") || parts.next().is_some() {
        return None;
    }
    Some(device_id)
}
