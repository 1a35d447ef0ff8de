use crate::config::{DeviceOverrides, SimulatorConfig};
use crate::device::SimulatedDevice;
use crate::error::{Result, SimulatorError};
use crate::runtime::{DeviceRuntime, FleetEvent, RuntimeOptions};
use crate::state::DeviceState;
use crate::transport::{MqttTransport, Transport};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use telix_core::DeviceEntry;
use telix_signal::{find_type, DeviceTypeSpec};
use tokio::sync::{mpsc, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{info, warn};

/// fleet 级聚合计数，读数路径无锁
#[derive(Debug, Default)]
pub struct FleetCounters {
    active: AtomicUsize,
    degraded: AtomicUsize,
    disconnected: AtomicUsize,
}

/// 计数快照
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FleetSnapshot {
    pub active: usize,
    pub degraded: usize,
    pub disconnected: usize,
}

impl FleetCounters {
    fn bucket(&self, state: DeviceState) -> Option<&AtomicUsize> {
        match state {
            DeviceState::Connected => Some(&self.active),
            DeviceState::Degraded => Some(&self.degraded),
            DeviceState::Disconnected => Some(&self.disconnected),
            _ => None,
        }
    }

    fn record(&self, from: DeviceState, to: DeviceState) {
        if let Some(bucket) = self.bucket(from) {
            // fetch_update 防止并发下减穿 0
            let _ = bucket.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1));
        }
        if let Some(bucket) = self.bucket(to) {
            bucket.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn snapshot(&self) -> FleetSnapshot {
        FleetSnapshot {
            active: self.active.load(Ordering::SeqCst),
            degraded: self.degraded.load(Ordering::SeqCst),
            disconnected: self.disconnected.load(Ordering::SeqCst),
        }
    }
}

/// 停机报告
#[derive(Debug, Clone, Copy)]
pub struct FleetReport {
    /// 在宽限期内自行到达 stopped 的设备数
    pub stopped: usize,
    /// 超时被强制取消的设备数
    pub aborted: usize,
}

/// 单设备的运行任务与独立停机信号
struct DeviceWorker {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// fleet 协调器
///
/// 并发派生 N 个设备运行时并聚合其生命周期事件。
pub struct FleetCoordinator;

impl FleetCoordinator {
    /// 用 MQTT 传输启动 fleet
    pub async fn start(config: SimulatorConfig, overrides: DeviceOverrides) -> Result<FleetHandle> {
        let transport = Arc::new(MqttTransport::new(
            &config.broker_host,
            config.broker_port,
            &format!("telix_sim_{}", uuid::Uuid::new_v4().simple()),
            config.connect_timeout,
        ));
        Self::start_with_transport(config, overrides, transport).await
    }

    /// 用任意传输启动 fleet（测试与演练用）
    pub async fn start_with_transport(
        config: SimulatorConfig,
        overrides: DeviceOverrides,
        transport: Arc<dyn Transport>,
    ) -> Result<FleetHandle> {
        config.validate()?;
        for device_override in overrides.values() {
            device_override.validate()?;
        }
        let spec = find_type(&config.device_type)
            .ok_or_else(|| SimulatorError::UnknownDeviceType(config.device_type.clone()))?;
        spec.validate()?;
        let spec = Arc::new(spec);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let counters = Arc::new(FleetCounters::default());
        let states = Arc::new(RwLock::new(HashMap::new()));
        let aggregator = tokio::spawn(Self::aggregate(events_rx, counters.clone(), states.clone()));

        let mut handle = FleetHandle {
            counters,
            states,
            devices: Vec::with_capacity(config.device_count),
            workers: HashMap::new(),
            aggregator,
            transport,
            events_tx,
            opts: RuntimeOptions::from(&config),
            spec,
            overrides,
            config: config.clone(),
            next_index: 0,
        };
        for _ in 0..config.device_count {
            handle.add_device().await;
        }

        info!(
            device_type = %config.device_type,
            device_count = config.device_count,
            "Fleet started"
        );
        Ok(handle)
    }

    /// 消费设备生命周期事件，维护状态表与计数；
    /// 不回压设备任务（无界通道 + 纯内存更新）。
    async fn aggregate(
        mut events: mpsc::UnboundedReceiver<FleetEvent>,
        counters: Arc<FleetCounters>,
        states: Arc<RwLock<HashMap<String, DeviceState>>>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                FleetEvent::StateChanged { device_id, from, to } => {
                    counters.record(from, to);
                    states.write().await.insert(device_id, to);
                }
                FleetEvent::PublishFailed { device_id, error } => {
                    warn!(device_id = %device_id, error = %error, "Device publish failed");
                }
                FleetEvent::FatalDeviceError { device_id, error } => {
                    // 单设备持续失败不拖垮整个 fleet
                    warn!(device_id = %device_id, error = %error, "Device failed fatally");
                }
            }
        }
    }
}

/// 运行中 fleet 的句柄
pub struct FleetHandle {
    counters: Arc<FleetCounters>,
    states: Arc<RwLock<HashMap<String, DeviceState>>>,
    devices: Vec<DeviceEntry>,
    workers: HashMap<String, DeviceWorker>,
    aggregator: JoinHandle<()>,
    transport: Arc<dyn Transport>,
    events_tx: mpsc::UnboundedSender<FleetEvent>,
    opts: RuntimeOptions,
    spec: Arc<DeviceTypeSpec>,
    overrides: DeviceOverrides,
    config: SimulatorConfig,
    next_index: usize,
}

impl FleetHandle {
    /// fleet 内的设备清单
    pub fn devices(&self) -> &[DeviceEntry] {
        &self.devices
    }

    /// 聚合计数快照，不阻塞设备 tick
    pub fn counters(&self) -> FleetSnapshot {
        self.counters.snapshot()
    }

    /// 当前各设备状态
    pub async fn states(&self) -> HashMap<String, DeviceState> {
        self.states.read().await.clone()
    }

    /// 当前各设备状态的共享表（停机后仍可读取）
    pub fn shared_states(&self) -> Arc<RwLock<HashMap<String, DeviceState>>> {
        self.states.clone()
    }

    /// 新增一台设备并立即启动其运行时
    ///
    /// 设备下标持续递增，停掉旧设备不会让 ID 被复用。
    pub async fn add_device(&mut self) -> DeviceEntry {
        let index = self.next_index;
        self.next_index += 1;

        let device = SimulatedDevice::new(
            index,
            self.spec.clone(),
            &self.config,
            self.overrides.get(&index),
        );
        let entry = device.entry();
        self.devices.push(entry.clone());
        self.states
            .write()
            .await
            .insert(device.id.clone(), DeviceState::Idle);

        let (stop_tx, stop_rx) = watch::channel(false);
        let runtime = DeviceRuntime::new(
            device,
            self.config.seed.wrapping_add(index as u64),
            self.transport.clone(),
            self.events_tx.clone(),
            stop_rx,
            self.opts.clone(),
        );
        let device_id = entry.id.clone();
        let task = tokio::spawn(runtime.run());
        self.workers.insert(device_id, DeviceWorker { stop_tx, task });
        entry
    }

    /// 停止单台设备，宽限期内等待其自行退出
    pub async fn stop_device(&mut self, device_id: &str) -> Result<()> {
        let worker = self
            .workers
            .remove(device_id)
            .ok_or_else(|| SimulatorError::DeviceNotFound(device_id.to_string()))?;
        let _ = worker.stop_tx.send(true);

        let abort = worker.task.abort_handle();
        if timeout(self.config.stop_grace, worker.task).await.is_err() {
            abort.abort();
            warn!(device_id = %device_id, "Device cancelled at grace deadline");
            // 被取消的任务来不及上报终态，这里补记状态和计数
            let mut states = self.states.write().await;
            if let Some(last) = states.insert(device_id.to_string(), DeviceState::Stopped) {
                self.counters.record(last, DeviceState::Stopped);
            }
        }
        info!(device_id = %device_id, "Device stopped");
        Ok(())
    }

    /// 停止并从清单中移除单台设备
    pub async fn remove_device(&mut self, device_id: &str) -> Result<()> {
        self.stop_device(device_id).await?;
        self.devices.retain(|d| d.id != device_id);
        self.states.write().await.remove(device_id);
        Ok(())
    }

    /// 优雅停机
    ///
    /// 宽限期内等待每个运行时自行到达 stopped 并释放连接；
    /// 到期后强制取消剩余任务。返回时没有设备停留在非 stopped 状态。
    pub async fn stop(self) -> Result<FleetReport> {
        info!("Stopping fleet...");
        for worker in self.workers.values() {
            let _ = worker.stop_tx.send(true);
        }

        let deadline = tokio::time::Instant::now() + self.config.stop_grace;
        let mut stopped = 0usize;
        let mut aborted = 0usize;
        for (_, worker) in self.workers {
            let abort = worker.task.abort_handle();
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match timeout(remaining, worker.task).await {
                Ok(_) => stopped += 1,
                Err(_) => {
                    abort.abort();
                    aborted += 1;
                }
            }
        }

        // 聚合器在所有设备事件发送端释放后退出
        drop(self.events_tx);
        let _ = timeout(Duration::from_secs(1), self.aggregator).await;

        if aborted > 0 {
            warn!(aborted = aborted, "Forcibly cancelled stragglers at grace deadline");
            // 被取消的任务来不及上报终态，这里补记
            let mut states = self.states.write().await;
            for state in states.values_mut() {
                if !state.is_terminal() {
                    *state = DeviceState::Stopped;
                }
            }
        }

        self.transport
            .close()
            .await
            .map_err(|e| SimulatorError::Transport(e.to_string()))?;

        info!(stopped = stopped, aborted = aborted, "Fleet stopped");
        Ok(FleetReport { stopped, aborted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::ChannelTransport;
    use telix_types::TelemetryReading;

    fn test_config(device_count: usize) -> SimulatorConfig {
        SimulatorConfig {
            device_count,
            publish_interval: Duration::from_millis(10),
            failure_rate: Some(0.0),
            max_connect_retries: 2,
            initial_backoff: Duration::from_millis(1),
            stop_grace: Duration::from_secs(5),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let (transport, _rx) = ChannelTransport::new();
        let config = SimulatorConfig {
            failure_rate: Some(1.5),
            ..Default::default()
        };
        let result =
            FleetCoordinator::start_with_transport(config, DeviceOverrides::new(), transport).await;
        assert!(matches!(result, Err(SimulatorError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_start_rejects_unknown_device_type() {
        let (transport, _rx) = ChannelTransport::new();
        let config = SimulatorConfig {
            device_type: "quantum".to_string(),
            ..test_config(1)
        };
        let result =
            FleetCoordinator::start_with_transport(config, DeviceOverrides::new(), transport).await;
        assert!(matches!(result, Err(SimulatorError::UnknownDeviceType(_))));
    }

    #[tokio::test]
    async fn test_fleet_of_100_stops_within_grace() {
        let (transport, mut published) = ChannelTransport::new();
        let handle = FleetCoordinator::start_with_transport(
            test_config(100),
            DeviceOverrides::new(),
            transport,
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(handle.counters().active, 100);

        let started = std::time::Instant::now();
        let report = handle.stop().await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(report.stopped + report.aborted, 100);
        assert_eq!(report.aborted, 0);

        // 有读数被发布
        assert!(published.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_no_device_left_unstopped() {
        let (transport, _published) = ChannelTransport::new();
        let handle = FleetCoordinator::start_with_transport(
            test_config(10),
            DeviceOverrides::new(),
            transport,
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;

        let states = handle.states().await;
        let counters = handle.counters();
        assert_eq!(states.len(), 10);
        assert_eq!(counters.active, 10);

        // stop() 前先取回共享状态表
        let states_ref = handle.shared_states();
        handle.stop().await.unwrap();

        let final_states = states_ref.read().await;
        assert!(final_states.values().all(|s| s.is_terminal()));
    }

    #[tokio::test]
    async fn test_per_device_sequences_are_gap_free() {
        let (transport, mut published) = ChannelTransport::new();
        let handle = FleetCoordinator::start_with_transport(
            test_config(3),
            DeviceOverrides::new(),
            transport,
        )
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.stop().await.unwrap();

        let mut next_expected: HashMap<String, u64> = HashMap::new();
        while let Ok((_, payload)) = published.try_recv() {
            let reading = TelemetryReading::from_payload(&payload).unwrap();
            let expected = next_expected.entry(reading.device_id.clone()).or_insert(0);
            assert_eq!(reading.sequence, *expected);
            *expected += 1;
        }
        assert_eq!(next_expected.len(), 3);
    }

    #[tokio::test]
    async fn test_fleet_survives_failing_devices() {
        let (transport, _published) = ChannelTransport::new();
        transport.set_fail_connect(true);
        let handle = FleetCoordinator::start_with_transport(
            test_config(5),
            DeviceOverrides::new(),
            transport,
        )
        .await
        .unwrap();

        // 所有设备连接失败并自行停止，fleet 句柄仍然可用
        tokio::time::sleep(Duration::from_millis(100)).await;
        let states = handle.states().await;
        assert!(states.values().all(|s| s.is_terminal()));

        let report = handle.stop().await.unwrap();
        assert_eq!(report.stopped, 5);
    }

    #[tokio::test]
    async fn test_aborted_device_releases_counter() {
        let (transport, _published) = ChannelTransport::new();
        let config = SimulatorConfig {
            // 零宽限：停设备时任务必然被强制取消
            stop_grace: Duration::ZERO,
            ..test_config(2)
        };
        let mut handle =
            FleetCoordinator::start_with_transport(config, DeviceOverrides::new(), transport)
                .await
                .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.counters().active, 2);

        handle.stop_device("dev_temperature_000").await.unwrap();

        // 被取消的设备从 active 计数里扣除，状态补记为终态
        assert_eq!(handle.counters().active, 1);
        let states = handle.states().await;
        assert_eq!(states["dev_temperature_000"], DeviceState::Stopped);

        handle.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_add_and_stop_individual_devices() {
        let (transport, _published) = ChannelTransport::new();
        let mut handle = FleetCoordinator::start_with_transport(
            test_config(2),
            DeviceOverrides::new(),
            transport,
        )
        .await
        .unwrap();

        // 动态加一台，下标继续递增
        let added = handle.add_device().await;
        assert_eq!(added.id, "dev_temperature_002");
        assert_eq!(handle.devices().len(), 3);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.counters().active, 3);

        // 单独停掉一台，其余不受影响
        handle.stop_device("dev_temperature_000").await.unwrap();
        // 等聚合器消费完终态事件
        tokio::time::sleep(Duration::from_millis(20)).await;
        let states = handle.states().await;
        assert_eq!(states["dev_temperature_000"], DeviceState::Stopped);
        assert_eq!(states["dev_temperature_001"], DeviceState::Connected);

        // 移除后从清单消失
        handle.remove_device("dev_temperature_002").await.unwrap();
        assert_eq!(handle.devices().len(), 2);
        assert!(!handle.states().await.contains_key("dev_temperature_002"));

        // 对未知设备报错
        assert!(matches!(
            handle.stop_device("dev_temperature_009").await,
            Err(SimulatorError::DeviceNotFound(_))
        ));

        handle.stop().await.unwrap();
    }
}
