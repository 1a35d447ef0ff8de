use crate::config::{DeviceOverride, SimulatorConfig};
use crate::error::{Result, SimulatorError};
use crate::state::{transition, DeviceState, StateEvent};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use telix_core::DeviceEntry;
use telix_signal::DeviceTypeSpec;

/// 单个模拟设备的可变状态
///
/// 由其设备运行时独占持有，运行时之间不共享可变状态。
#[derive(Debug, Clone)]
pub struct SimulatedDevice {
    /// 设备 ID（稳定）
    pub id: String,

    /// 设备名称
    pub name: String,

    /// 类型定义（不可变）
    pub spec: Arc<DeviceTypeSpec>,

    /// 当前状态
    pub state: DeviceState,

    /// 累计 tick 数
    pub tick: u64,

    /// 下一个读数的序列号（按设备单调）
    pub sequence: u64,

    /// 当前噪声因子
    pub noise_factor: f64,

    /// 当前故障率
    pub failure_rate: f64,

    /// 最后发布时间
    pub last_published: Option<DateTime<Utc>>,
}

impl SimulatedDevice {
    pub fn new(
        index: usize,
        spec: Arc<DeviceTypeSpec>,
        config: &SimulatorConfig,
        device_override: Option<&DeviceOverride>,
    ) -> Self {
        let noise_factor = device_override
            .and_then(|o| o.noise_factor)
            .or(config.noise_factor)
            .unwrap_or(spec.noise_factor);
        let failure_rate = device_override
            .and_then(|o| o.failure_rate)
            .or(config.failure_rate)
            .unwrap_or(spec.failure_rate);

        let id = format!("dev_{}_{:03}", spec.name, index);
        Self {
            name: format!("{}-{}", spec.name, index),
            id,
            spec,
            state: DeviceState::Idle,
            tick: 0,
            sequence: 0,
            noise_factor,
            failure_rate,
            last_published: None,
        }
    }

    /// 应用一次状态迁移，返回 (from, to)
    pub fn apply(&mut self, event: StateEvent) -> Result<(DeviceState, DeviceState)> {
        let from = self.state;
        let to = transition(from, event).ok_or_else(|| SimulatorError::InvalidTransition {
            from: from.as_str().to_string(),
            event: event.as_str().to_string(),
        })?;
        self.state = to;
        Ok((from, to))
    }

    /// 取下一个序列号并递增
    pub fn next_sequence(&mut self) -> u64 {
        let sequence = self.sequence;
        self.sequence += 1;
        sequence
    }

    pub fn entry(&self) -> DeviceEntry {
        DeviceEntry::new(self.id.clone(), self.name.clone(), self.spec.name.clone())
    }
}
