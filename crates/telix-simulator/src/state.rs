use serde::{Deserialize, Serialize};

/// 设备运行时状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceState {
    /// 未启动
    Idle,
    /// 正在连接 broker
    Connecting,
    /// 正常发布
    Connected,
    /// 瞬态故障：本 tick 发布被破坏的读数
    Degraded,
    /// 连接丢失
    Disconnected,
    /// 终态
    Stopped,
}

impl DeviceState {
    pub fn as_str(&self) -> &str {
        match self {
            DeviceState::Idle => "idle",
            DeviceState::Connecting => "connecting",
            DeviceState::Connected => "connected",
            DeviceState::Degraded => "degraded",
            DeviceState::Disconnected => "disconnected",
            DeviceState::Stopped => "stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeviceState::Stopped)
    }
}

/// 状态迁移事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    /// 启动
    Start,
    /// 握手成功
    ConnectOk,
    /// 握手失败
    ConnectFailed,
    /// 本 tick 注入瞬态故障
    DegradedTick,
    /// 瞬态故障恢复
    Recovered,
    /// 传输错误
    TransportError,
    /// 重连
    Retry,
    /// 显式关停
    Stop,
}

impl StateEvent {
    pub fn as_str(&self) -> &str {
        match self {
            StateEvent::Start => "start",
            StateEvent::ConnectOk => "connect_ok",
            StateEvent::ConnectFailed => "connect_failed",
            StateEvent::DegradedTick => "degraded_tick",
            StateEvent::Recovered => "recovered",
            StateEvent::TransportError => "transport_error",
            StateEvent::Retry => "retry",
            StateEvent::Stop => "stop",
        }
    }
}

/// 显式迁移表
///
/// 返回 None 表示该事件在当前状态下非法。Stop 对任意状态有效且终止。
pub fn transition(state: DeviceState, event: StateEvent) -> Option<DeviceState> {
    use DeviceState::*;
    use StateEvent::*;

    match (state, event) {
        (_, Stop) => Some(Stopped),
        (Stopped, _) => None,

        (Idle, Start) => Some(Connecting),

        (Connecting, ConnectOk) => Some(Connected),
        (Connecting, ConnectFailed) => Some(Disconnected),

        (Connected, DegradedTick) => Some(Degraded),
        (Connected, TransportError) => Some(Disconnected),

        (Degraded, Recovered) => Some(Connected),
        (Degraded, DegradedTick) => Some(Degraded),
        (Degraded, TransportError) => Some(Disconnected),

        (Disconnected, Retry) => Some(Connecting),

        _ => None,
    }
}
