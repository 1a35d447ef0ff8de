use crate::anomaly::AnomalyEngine;
use crate::error::{IngestError, Result};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use telix_core::{DeviceDirectory, EventPublisher, TelemetrySink};
use telix_types::{device_id_from_topic, TelemetryReading, TELEMETRY_WILDCARD};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// 消费者配置
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub topic: String,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: "telix_ingest".to_string(),
            topic: TELEMETRY_WILDCARD.to_string(),
        }
    }
}

/// 遥测流消费者
///
/// 订阅整个设备主题空间，逐条解码并送入异常引擎与写入端。
/// 单任务顺序处理：同一设备的读数绝不乱序，跨设备顺序不保证。
pub struct StreamConsumer {
    engine: Arc<AnomalyEngine>,
    sink: Arc<dyn TelemetrySink>,
    publisher: Arc<dyn EventPublisher>,
    directory: Option<Arc<dyn DeviceDirectory>>,
}

impl StreamConsumer {
    pub fn new(
        engine: Arc<AnomalyEngine>,
        sink: Arc<dyn TelemetrySink>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            engine,
            sink,
            publisher,
            directory: None,
        }
    }

    /// 附加设备目录，摄取时更新设备最后在线时间
    pub fn with_directory(mut self, directory: Arc<dyn DeviceDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// 解码一条入站消息
    pub fn decode(topic: &str, payload: &[u8]) -> Result<TelemetryReading> {
        let device_id = device_id_from_topic(topic)
            .ok_or_else(|| IngestError::InvalidTopic(topic.to_string()))?;
        let reading = TelemetryReading::from_payload(payload)
            .map_err(|e| IngestError::MalformedPayload(e.to_string()))?;
        if reading.device_id != device_id {
            return Err(IngestError::DeviceMismatch {
                topic: device_id.to_string(),
                payload: reading.device_id,
            });
        }
        Ok(reading)
    }

    /// 处理一条已解码的读数
    ///
    /// 顺序固定：先判定，再落库（读数 + 事件），最后对外发布事件。
    pub async fn process(&self, reading: TelemetryReading) -> anyhow::Result<()> {
        let event = self.engine.classify(&reading);

        self.sink.write_reading(&reading).await?;
        if let Some(directory) = &self.directory {
            if let Err(e) = directory.touch(&reading.device_id, reading.timestamp).await {
                warn!(device_id = %reading.device_id, error = %e, "Failed to update last_seen");
            }
        }

        if let Some(event) = event {
            info!(
                device_id = %event.device_id,
                metric = %event.metric,
                severity = event.severity.as_str(),
                observed = event.observed,
                "Anomaly event recorded"
            );
            self.sink.write_event(&event).await?;
            self.publisher.publish(event).await;
        }

        debug!(
            device_id = %reading.device_id,
            metric = %reading.metric,
            sequence = reading.sequence,
            "Reading processed"
        );
        Ok(())
    }

    /// 运行消费循环直到收到停机信号
    ///
    /// 解码失败只丢弃并记日志；连接错误退避后重试，绝不让消费者崩溃。
    pub async fn run(&self, config: ConsumerConfig, mut stop: watch::Receiver<bool>) -> Result<()> {
        let mut mqtt_options =
            MqttOptions::new(&config.client_id, &config.broker_host, config.broker_port);
        mqtt_options.set_keep_alive(Duration::from_secs(30));
        mqtt_options.set_clean_session(true);

        let (client, mut eventloop) = AsyncClient::new(mqtt_options, 64);
        client
            .subscribe(&config.topic, QoS::AtLeastOnce)
            .await
            .map_err(|e| IngestError::Mqtt(e.to_string()))?;

        info!(
            broker = %format!("{}:{}", config.broker_host, config.broker_port),
            topic = %config.topic,
            "Stream consumer started"
        );

        loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                event = eventloop.poll() => {
                    match event {
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            match Self::decode(&publish.topic, &publish.payload) {
                                Ok(reading) => {
                                    if let Err(e) = self.process(reading).await {
                                        // 写入端故障不终止消费，至少一次语义下可安全重放
                                        error!(error = %e, "Failed to process reading");
                                    }
                                }
                                Err(e) => {
                                    warn!(topic = %publish.topic, error = %e, "Dropping undecodable message");
                                }
                            }
                        }
                        Ok(Event::Incoming(Packet::ConnAck(_))) => {
                            // 重连后 broker 不保留订阅，重新订阅
                            if let Err(e) = client.subscribe(&config.topic, QoS::AtLeastOnce).await {
                                error!(error = %e, "Failed to resubscribe");
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            error!(error = %e, "MQTT connection error");
                            if !wait_or_stop(&mut stop, Duration::from_secs(1)).await {
                                break;
                            }
                        }
                    }
                }
            }
        }

        let _ = client.disconnect().await;
        info!("Stream consumer stopped");
        Ok(())
    }
}

async fn wait_or_stop(stop: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        changed = stop.changed() => changed.is_err() || !*stop.borrow(),
    }
}
