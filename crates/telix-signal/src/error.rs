use thiserror::Error;

/// 信号模型错误类型
///
/// 未知设备类型由调用方（模拟器/回填）在查目录时报告。
#[derive(Error, Debug)]
pub enum SignalError {
    /// 波形参数非法
    #[error("Invalid waveform spec: {0}")]
    InvalidSpec(String),

    /// 产生了非有限值，说明波形参数已损坏
    #[error("Non-finite value generated for metric '{metric}' at tick {tick}")]
    NonFiniteValue { metric: String, tick: u64 },
}

/// 信号模型结果类型
pub type Result<T> = std::result::Result<T, SignalError>;
