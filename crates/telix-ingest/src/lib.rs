//! 遥测摄取与异常判定管线
//!
//! 订阅模拟器发布的遥测流，按 (device, metric) 维护滚动基线，
//! 用 z-score 判定异常并写入下游。

pub mod anomaly;
pub mod baseline;
pub mod consumer;
pub mod error;

pub use anomaly::{AnomalyConfig, AnomalyEngine, SeverityThresholds};
pub use baseline::BaselineWindow;
pub use consumer::{ConsumerConfig, StreamConsumer};
pub use error::{IngestError, Result};
