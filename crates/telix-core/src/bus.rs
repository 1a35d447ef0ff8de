use crate::error::Result;
use crate::traits::EventPublisher;
use async_trait::async_trait;
use std::sync::Arc;
use telix_types::AnomalyEvent;
use tokio::sync::broadcast;
use tracing::debug;

/// 异常事件总线
///
/// 下游实时推送（仪表盘等）通过订阅接收事件。
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AnomalyEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AnomalyEvent> {
        self.sender.subscribe()
    }

    /// 发布事件，返回接收到的订阅者数；没有订阅者时报 ChannelSend
    pub fn publish(&self, event: AnomalyEvent) -> Result<usize> {
        Ok(self.sender.send(event)?)
    }
}

pub type SharedEventBus = Arc<EventBus>;

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish(&self, event: AnomalyEvent) {
        // fire-and-forget：没有订阅者不算错误
        if let Err(e) = self.sender.send(event) {
            debug!(error = %e, "No active subscribers for anomaly event");
        }
    }
}
