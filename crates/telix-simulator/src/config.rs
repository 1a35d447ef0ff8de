use crate::error::{Result, SimulatorError};
use std::collections::HashMap;
use std::time::Duration;

/// 模拟器启动配置
///
/// 所有数值参数越界时在启动阶段拒绝，绝不静默截断。
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// 设备类型名称（须在目录中存在）
    pub device_type: String,

    /// 设备数量
    pub device_count: usize,

    /// 发布周期
    pub publish_interval: Duration,

    /// 噪声因子 [0, 1]；None 时使用设备类型默认值
    pub noise_factor: Option<f64>,

    /// 故障率 [0, 1]；None 时使用设备类型默认值
    pub failure_rate: Option<f64>,

    /// broker 地址
    pub broker_host: String,
    pub broker_port: u16,

    /// 连接握手超时
    pub connect_timeout: Duration,

    /// 单次发布确认超时
    pub publish_timeout: Duration,

    /// 连接重试上限（超出后上报致命设备错误）
    pub max_connect_retries: u32,

    /// 指数退避起点与上限
    pub initial_backoff: Duration,
    pub max_backoff: Duration,

    /// 发布重试上限（超出后进入 disconnected，而不是阻塞整个 fleet）
    pub max_publish_retries: u32,

    /// 持续断连模式：Some 时瞬态故障改为断连该时长后重连
    pub sustained_outage: Option<Duration>,

    /// 优雅停机宽限期，超时后强制取消
    pub stop_grace: Duration,

    /// 随机种子基数（设备 i 派生 seed + i）
    pub seed: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            device_type: "temperature".to_string(),
            device_count: 10,
            publish_interval: Duration::from_secs(1),
            noise_factor: None,
            failure_rate: None,
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            connect_timeout: Duration::from_secs(5),
            publish_timeout: Duration::from_secs(5),
            max_connect_retries: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(30),
            max_publish_retries: 3,
            sustained_outage: None,
            stop_grace: Duration::from_secs(10),
            seed: 0,
        }
    }
}

impl SimulatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.device_type.is_empty() {
            return Err(SimulatorError::InvalidConfig("device_type is empty".to_string()));
        }
        if self.device_count == 0 {
            return Err(SimulatorError::InvalidConfig("device_count must be at least 1".to_string()));
        }
        if self.publish_interval.is_zero() {
            return Err(SimulatorError::InvalidConfig("publish_interval must be positive".to_string()));
        }
        if self.broker_host.is_empty() {
            return Err(SimulatorError::InvalidConfig("broker_host is empty".to_string()));
        }
        if self.max_connect_retries == 0 {
            return Err(SimulatorError::InvalidConfig("max_connect_retries must be at least 1".to_string()));
        }
        validate_unit_range("noise_factor", self.noise_factor)?;
        validate_unit_range("failure_rate", self.failure_rate)?;
        Ok(())
    }
}

/// 单设备参数覆盖，键为设备下标
#[derive(Debug, Clone, Default)]
pub struct DeviceOverride {
    pub noise_factor: Option<f64>,
    pub failure_rate: Option<f64>,
}

impl DeviceOverride {
    pub fn validate(&self) -> Result<()> {
        validate_unit_range("noise_factor", self.noise_factor)?;
        validate_unit_range("failure_rate", self.failure_rate)?;
        Ok(())
    }
}

pub type DeviceOverrides = HashMap<usize, DeviceOverride>;

fn validate_unit_range(field: &str, value: Option<f64>) -> Result<()> {
    if let Some(v) = value {
        if !(0.0..=1.0).contains(&v) {
            return Err(SimulatorError::InvalidConfig(format!(
                "{} must be in [0.0, 1.0], got {}",
                field, v
            )));
        }
    }
    Ok(())
}
