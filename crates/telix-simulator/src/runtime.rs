use crate::config::SimulatorConfig;
use crate::device::SimulatedDevice;
use crate::state::{DeviceState, StateEvent};
use crate::transport::Transport;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use telix_signal::{MetricSpec, SignalGenerator};
use telix_types::{telemetry_topic, TelemetryReading};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// 设备运行时上报给 fleet 协调器的生命周期事件
#[derive(Debug, Clone)]
pub enum FleetEvent {
    StateChanged {
        device_id: String,
        from: DeviceState,
        to: DeviceState,
    },
    PublishFailed {
        device_id: String,
        error: String,
    },
    FatalDeviceError {
        device_id: String,
        error: String,
    },
}

/// 运行时参数（从 SimulatorConfig 派生）
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    pub publish_interval: Duration,
    pub connect_timeout: Duration,
    pub publish_timeout: Duration,
    pub max_connect_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_publish_retries: u32,
    pub sustained_outage: Option<Duration>,
}

impl From<&SimulatorConfig> for RuntimeOptions {
    fn from(config: &SimulatorConfig) -> Self {
        Self {
            publish_interval: config.publish_interval,
            connect_timeout: config.connect_timeout,
            publish_timeout: config.publish_timeout,
            max_connect_retries: config.max_connect_retries,
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
            max_publish_retries: config.max_publish_retries,
            sustained_outage: config.sustained_outage,
        }
    }
}

enum TickFlow {
    Continue,
    Reconnect,
    Fatal(String),
}

/// 单设备运行时
///
/// 独占持有设备状态；每个 tick 为声明的每个指标各发布一条读数。
/// 故障注入在这里完成：被破坏的读数仍然发布（越界值），而不是被吞掉。
pub struct DeviceRuntime {
    device: SimulatedDevice,
    signal: SignalGenerator,
    faults: StdRng,
    transport: Arc<dyn Transport>,
    events: mpsc::UnboundedSender<FleetEvent>,
    stop: watch::Receiver<bool>,
    opts: RuntimeOptions,
}

impl DeviceRuntime {
    pub fn new(
        device: SimulatedDevice,
        seed: u64,
        transport: Arc<dyn Transport>,
        events: mpsc::UnboundedSender<FleetEvent>,
        stop: watch::Receiver<bool>,
        opts: RuntimeOptions,
    ) -> Self {
        Self {
            device,
            signal: SignalGenerator::seeded(seed),
            // 故障抽样与信号噪声用独立的随机流
            faults: StdRng::seed_from_u64(seed ^ 0x517c_c1b7_2722_0a95),
            transport,
            events,
            stop,
            opts,
        }
    }

    /// 运行设备直到收到停机信号或发生致命错误
    pub async fn run(mut self) {
        info!(device_id = %self.device.id, "Device runtime started");

        self.shift(StateEvent::Start);
        if !self.connect_with_backoff().await {
            self.finish();
            return;
        }

        let mut stop = self.stop.clone();
        let mut ticker = interval(self.opts.publish_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    match self.on_tick().await {
                        TickFlow::Continue => {}
                        TickFlow::Reconnect => {
                            if !self.reconnect().await {
                                break;
                            }
                        }
                        TickFlow::Fatal(error) => {
                            error!(device_id = %self.device.id, error = %error, "Fatal device error");
                            let _ = self.events.send(FleetEvent::FatalDeviceError {
                                device_id: self.device.id.clone(),
                                error,
                            });
                            break;
                        }
                    }
                }
            }
        }

        self.finish();
    }

    /// 一个发布周期
    async fn on_tick(&mut self) -> TickFlow {
        let degraded = self.faults.gen::<f64>() < self.device.failure_rate;

        if degraded {
            self.shift(StateEvent::DegradedTick);

            // 持续断连模式：不发布，掉线等待后重连
            if self.opts.sustained_outage.is_some() {
                self.shift(StateEvent::TransportError);
                return TickFlow::Reconnect;
            }
        }

        let spec = self.device.spec.clone();
        for metric in &spec.metrics {
            let mut value =
                match self.signal.generate(metric, self.device.tick, self.device.noise_factor) {
                    Ok(v) => v,
                    Err(e) => return TickFlow::Fatal(e.to_string()),
                };
            if degraded {
                value = self.corrupt(metric, value);
            }

            let sequence = self.device.next_sequence();
            let reading = TelemetryReading::new(
                self.device.id.clone(),
                metric.name.clone(),
                value,
                sequence,
            );
            let payload = match reading.to_payload() {
                Ok(p) => p,
                Err(e) => return TickFlow::Fatal(format!("encode failed: {}", e)),
            };

            if !self.publish_with_retry(&telemetry_topic(&self.device.id), payload).await {
                self.shift(StateEvent::TransportError);
                return TickFlow::Reconnect;
            }
            self.device.last_published = Some(reading.timestamp);
        }

        if degraded {
            // 瞬态故障持续一个 tick 后自动恢复
            self.shift(StateEvent::Recovered);
        }
        self.device.tick += 1;
        TickFlow::Continue
    }

    /// 把干净值破坏成越界值，让下游异常引擎能观察到
    fn corrupt(&mut self, metric: &MetricSpec, value: f64) -> f64 {
        let sign = if self.faults.gen_bool(0.5) { 1.0 } else { -1.0 };
        value + sign * 8.0 * metric.noise_span()
    }

    /// 有界重试发布，绝不无限阻塞
    async fn publish_with_retry(&mut self, topic: &str, payload: Vec<u8>) -> bool {
        let mut backoff = self.opts.initial_backoff;
        for attempt in 1..=self.opts.max_publish_retries {
            match timeout(self.opts.publish_timeout, self.transport.publish(topic, payload.clone())).await {
                Ok(Ok(())) => return true,
                Ok(Err(e)) => {
                    debug!(
                        device_id = %self.device.id,
                        attempt = attempt,
                        error = %e,
                        "Publish attempt failed"
                    );
                }
                Err(_) => {
                    debug!(
                        device_id = %self.device.id,
                        attempt = attempt,
                        "Publish attempt timed out"
                    );
                }
            }
            if attempt < self.opts.max_publish_retries {
                if !wait_or_stop(&mut self.stop, backoff).await {
                    return false;
                }
                backoff = (backoff * 2).min(self.opts.max_backoff);
            }
        }

        warn!(device_id = %self.device.id, "Publish failed after bounded retries");
        let _ = self.events.send(FleetEvent::PublishFailed {
            device_id: self.device.id.clone(),
            error: "publish failed after bounded retries".to_string(),
        });
        false
    }

    /// 指数退避连接；重试耗尽后上报致命设备错误
    async fn connect_with_backoff(&mut self) -> bool {
        let mut backoff = self.opts.initial_backoff;
        for attempt in 1..=self.opts.max_connect_retries {
            if *self.stop.borrow() {
                return false;
            }
            match timeout(self.opts.connect_timeout, self.transport.connect()).await {
                Ok(Ok(())) => {
                    self.shift(StateEvent::ConnectOk);
                    return true;
                }
                Ok(Err(e)) => {
                    warn!(
                        device_id = %self.device.id,
                        attempt = attempt,
                        max = self.opts.max_connect_retries,
                        error = %e,
                        "Connect attempt failed"
                    );
                }
                Err(_) => {
                    warn!(
                        device_id = %self.device.id,
                        attempt = attempt,
                        "Connect handshake timed out"
                    );
                }
            }

            self.shift(StateEvent::ConnectFailed);
            if attempt == self.opts.max_connect_retries {
                break;
            }
            if !wait_or_stop(&mut self.stop, backoff).await {
                return false;
            }
            backoff = (backoff * 2).min(self.opts.max_backoff);
            self.shift(StateEvent::Retry);
        }

        let error = format!(
            "gave up connecting after {} attempts",
            self.opts.max_connect_retries
        );
        error!(device_id = %self.device.id, error = %error, "Fatal device error");
        let _ = self.events.send(FleetEvent::FatalDeviceError {
            device_id: self.device.id.clone(),
            error,
        });
        false
    }

    /// 掉线后的恢复路径
    async fn reconnect(&mut self) -> bool {
        if let Some(outage) = self.opts.sustained_outage {
            debug!(
                device_id = %self.device.id,
                outage = ?outage,
                "Holding sustained outage before reconnect"
            );
            if !wait_or_stop(&mut self.stop, outage).await {
                return false;
            }
        }
        if *self.stop.borrow() {
            return false;
        }
        self.shift(StateEvent::Retry);
        self.connect_with_backoff().await
    }

    /// 应用状态迁移并上报
    fn shift(&mut self, event: StateEvent) {
        match self.device.apply(event) {
            Ok((from, to)) => {
                debug!(
                    device_id = %self.device.id,
                    from = from.as_str(),
                    to = to.as_str(),
                    "Device state changed"
                );
                let _ = self.events.send(FleetEvent::StateChanged {
                    device_id: self.device.id.clone(),
                    from,
                    to,
                });
            }
            Err(e) => {
                // 迁移表覆盖了运行时触发的所有事件，走到这里说明有 bug
                error!(device_id = %self.device.id, error = %e, "State transition rejected");
            }
        }
    }

    fn finish(&mut self) {
        if !self.device.state.is_terminal() {
            self.shift(StateEvent::Stop);
        }
        info!(device_id = %self.device.id, "Device runtime stopped");
    }
}

/// 等待一段时间，期间收到停机信号则返回 false
async fn wait_or_stop(stop: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    if *stop.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        changed = stop.changed() => changed.is_err() || !*stop.borrow(),
    }
}
