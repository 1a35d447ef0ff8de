use anyhow::{anyhow, bail};
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

/// 发布传输层
///
/// 连接可在设备间共享（连接池），只要设备内发布顺序不被打乱。
#[async_trait]
pub trait Transport: Send + Sync {
    /// 建立（或确认）到 broker 的连接
    async fn connect(&self) -> anyhow::Result<()>;

    /// 发布一条消息
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> anyhow::Result<()>;

    /// 释放连接
    async fn close(&self) -> anyhow::Result<()>;
}

/// MQTT 传输（rumqttc）
///
/// 事件循环在后台任务中运行，连接状态通过 watch 通道暴露。
pub struct MqttTransport {
    client: AsyncClient,
    connected: watch::Receiver<bool>,
    connect_timeout: Duration,
}

impl MqttTransport {
    pub fn new(broker_host: &str, broker_port: u16, client_id: &str, connect_timeout: Duration) -> Self {
        let mut mqtt_options = MqttOptions::new(client_id, broker_host, broker_port);
        mqtt_options.set_keep_alive(Duration::from_secs(30));
        mqtt_options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, 64);
        let (tx, rx) = watch::channel(false);

        info!(
            broker = %format!("{}:{}", broker_host, broker_port),
            client_id = %client_id,
            "MQTT transport created"
        );

        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        debug!("MQTT connection acknowledged");
                        let _ = tx.send(true);
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        let _ = tx.send(false);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        let _ = tx.send(false);
                        if tx.is_closed() {
                            // 所有持有者都已释放，结束事件循环
                            break;
                        }
                        error!(error = %e, "MQTT connection error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self {
            client,
            connected: rx,
            connect_timeout,
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&self) -> anyhow::Result<()> {
        let mut rx = self.connected.clone();
        tokio::time::timeout(self.connect_timeout, rx.wait_for(|c| *c))
            .await
            .map_err(|_| anyhow!("connection handshake timed out"))?
            .map_err(|_| anyhow!("transport event loop terminated"))?;
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> anyhow::Result<()> {
        if !*self.connected.borrow() {
            bail!("not connected to broker");
        }
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| anyhow!("publish failed: {}", e))
    }

    async fn close(&self) -> anyhow::Result<()> {
        let _ = self.client.disconnect().await;
        Ok(())
    }
}

/// 进程内通道传输
///
/// 无需 broker 的测试与演练路径；可注入连接/发布故障。
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<(String, Vec<u8>)>,
    fail_connect: AtomicBool,
    fail_publish: AtomicBool,
}

impl ChannelTransport {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(String, Vec<u8>)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                tx,
                fail_connect: AtomicBool::new(false),
                fail_publish: AtomicBool::new(false),
            }),
            rx,
        )
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn connect(&self) -> anyhow::Result<()> {
        if self.fail_connect.load(Ordering::SeqCst) {
            bail!("connection refused");
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> anyhow::Result<()> {
        if self.fail_publish.load(Ordering::SeqCst) {
            bail!("publish rejected");
        }
        self.tx
            .send((topic.to_string(), payload))
            .map_err(|_| anyhow!("channel closed"))
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
