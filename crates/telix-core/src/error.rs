use thiserror::Error;

/// Telix 统一错误类型
#[derive(Error, Debug)]
pub enum TelixError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Signal error: {0}")]
    Signal(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Channel send error: {0}")]
    ChannelSend(String),

    #[error("Channel receive error: {0}")]
    ChannelReceive(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, TelixError>;

impl From<anyhow::Error> for TelixError {
    fn from(err: anyhow::Error) -> Self {
        TelixError::Internal(err.to_string())
    }
}

impl<T> From<tokio::sync::broadcast::error::SendError<T>> for TelixError {
    fn from(err: tokio::sync::broadcast::error::SendError<T>) -> Self {
        TelixError::ChannelSend(err.to_string())
    }
}

impl From<tokio::sync::broadcast::error::RecvError> for TelixError {
    fn from(err: tokio::sync::broadcast::error::RecvError) -> Self {
        TelixError::ChannelReceive(err.to_string())
    }
}
