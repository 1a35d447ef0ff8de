use telix_signal::SignalError;
use thiserror::Error;

/// 回填错误类型
#[derive(Error, Debug)]
pub enum BackfillError {
    /// 配置参数非法
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// 设备目录引用了未知设备类型
    #[error("Unknown device type: {0}")]
    UnknownDeviceType(String),

    /// 信号生成错误
    #[error("Signal error: {0}")]
    Signal(#[from] SignalError),

    /// 其他错误
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// 回填结果类型
pub type Result<T> = std::result::Result<T, BackfillError>;
