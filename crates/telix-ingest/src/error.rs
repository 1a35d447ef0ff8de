use thiserror::Error;

/// 摄取管线错误类型
#[derive(Error, Debug)]
pub enum IngestError {
    /// 配置参数非法
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// 主题格式不符合 devices/{id}/telemetry
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    /// 载荷解码失败（丢弃并记日志，绝不让消费者崩溃）
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// 载荷里的设备 ID 与主题不一致
    #[error("Device mismatch: topic says '{topic}', payload says '{payload}'")]
    DeviceMismatch { topic: String, payload: String },

    /// MQTT 客户端错误
    #[error("MQTT error: {0}")]
    Mqtt(String),

    /// 其他错误
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// 摄取结果类型
pub type Result<T> = std::result::Result<T, IngestError>;
