//! 确定性历史遥测回填
//!
//! 按固定种子为设备队列生成历史读数，可直接喂给异常引擎，
//! 让基线在真实流量到达前就预热完成。

pub mod error;
pub mod generator;

pub use error::{BackfillError, Result};
pub use generator::{
    BackfillConfig, BackfillDevice, BackfillGenerator, BackfillIter, BackfillReport,
};
