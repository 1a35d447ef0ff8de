use telix_signal::SignalError;
use thiserror::Error;

/// 模拟器错误类型
#[derive(Error, Debug)]
pub enum SimulatorError {
    /// 配置参数越界：启动时拒绝，不静默截断
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// 未知设备类型
    #[error("Unknown device type: {0}")]
    UnknownDeviceType(String),

    /// fleet 中不存在该设备
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// 信号模型错误（视为致命配置错误）
    #[error("Signal error: {0}")]
    Signal(#[from] SignalError),

    /// 传输层错误
    #[error("Transport error: {0}")]
    Transport(String),

    /// 非法状态迁移
    #[error("Invalid state transition from {from} on {event}")]
    InvalidTransition { from: String, event: String },

    /// 其他错误
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// 模拟器结果类型
pub type Result<T> = std::result::Result<T, SimulatorError>;
