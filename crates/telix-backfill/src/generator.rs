use crate::error::{BackfillError, Result};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use telix_core::{DeviceDirectory, TelemetrySink};
use telix_ingest::AnomalyEngine;
use telix_signal::{find_type, DeviceTypeSpec, SignalGenerator};
use telix_types::TelemetryReading;
use tracing::{debug, info};

const MS_PER_DAY: i64 = 86_400_000;

/// 注入 RNG 与信号 RNG 解耦，改动注入概率不影响波形序列
const INJECT_SEED_SALT: u64 = 0x9e37_79b9_7f4a_7c15;

/// 回填配置
#[derive(Debug, Clone)]
pub struct BackfillConfig {
    /// 回填天数
    pub days: u32,

    /// 每设备每天读数条数
    pub readings_per_day: u32,

    /// 每条读数注入异常的概率 [0, 1]
    pub anomaly_probability: f64,

    /// 随机种子：同一配置产出逐位相同的序列
    pub seed: u64,

    /// 第一条读数的时间戳，后续按固定间隔排布
    pub start: DateTime<Utc>,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            days: 7,
            readings_per_day: 288,
            anomaly_probability: 0.02,
            seed: 0,
            start: Utc::now() - Duration::days(7),
        }
    }
}

impl BackfillConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.anomaly_probability.is_finite() || !(0.0..=1.0).contains(&self.anomaly_probability)
        {
            return Err(BackfillError::InvalidConfig(format!(
                "anomaly_probability must be in [0, 1], got {}",
                self.anomaly_probability
            )));
        }
        Ok(())
    }

    fn total_slots(&self) -> u64 {
        self.days as u64 * self.readings_per_day as u64
    }
}

/// 回填中的单个设备
#[derive(Debug, Clone)]
pub struct BackfillDevice {
    pub id: String,
    pub spec: Arc<DeviceTypeSpec>,
}

impl BackfillDevice {
    pub fn new(id: impl Into<String>, spec: Arc<DeviceTypeSpec>) -> Self {
        Self {
            id: id.into(),
            spec,
        }
    }
}

/// 回填运行统计
#[derive(Debug, Clone, Copy, Default)]
pub struct BackfillReport {
    pub readings: usize,
    pub anomalies: usize,
}

/// 历史遥测回填生成器
///
/// 每个时间槽为每台设备生成一条读数，指标在设备的指标表上轮转
/// （slot % metrics.len()），序列号等于槽号。每台设备用独立种子，
/// 序列可按需重放，同一配置永远产出相同结果。
pub struct BackfillGenerator {
    config: BackfillConfig,
    devices: Vec<BackfillDevice>,
}

impl BackfillGenerator {
    pub fn new(config: BackfillConfig, devices: Vec<BackfillDevice>) -> Result<Self> {
        config.validate()?;
        for device in &devices {
            device.spec.validate()?;
        }
        Ok(Self { config, devices })
    }

    /// 从设备目录构建：目录里的 device_type 必须在内置类型表中
    pub async fn from_directory(
        config: BackfillConfig,
        directory: &dyn DeviceDirectory,
    ) -> Result<Self> {
        let entries = directory.list_devices().await?;
        let mut devices = Vec::with_capacity(entries.len());
        for entry in entries {
            let spec = find_type(&entry.device_type)
                .ok_or_else(|| BackfillError::UnknownDeviceType(entry.device_type.clone()))?;
            devices.push(BackfillDevice::new(entry.id, Arc::new(spec)));
        }
        Self::new(config, devices)
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// 惰性读数流，可重复调用，每次从头重放
    pub fn readings(&self) -> BackfillIter<'_> {
        BackfillIter::new(&self.config, &self.devices)
    }

    /// 生成全部读数并送入异常引擎与写入端
    pub async fn run(
        &self,
        engine: &AnomalyEngine,
        sink: &dyn TelemetrySink,
    ) -> Result<BackfillReport> {
        info!(
            devices = self.devices.len(),
            days = self.config.days,
            readings_per_day = self.config.readings_per_day,
            "Backfill started"
        );

        let mut report = BackfillReport::default();
        for reading in self.readings() {
            let reading = reading?;
            let event = engine.classify(&reading);

            sink.write_reading(&reading).await?;
            if let Some(event) = event {
                debug!(
                    device_id = %event.device_id,
                    metric = %event.metric,
                    severity = event.severity.as_str(),
                    "Backfill anomaly recorded"
                );
                sink.write_event(&event).await?;
                report.anomalies += 1;
            }
            report.readings += 1;
        }

        info!(
            readings = report.readings,
            anomalies = report.anomalies,
            "Backfill finished"
        );
        Ok(report)
    }
}

/// 回填读数迭代器
///
/// 设备优先遍历：先产完一台设备的全部槽位，再切到下一台。
/// 每切到新设备就用该设备的种子重建 RNG。
pub struct BackfillIter<'a> {
    config: &'a BackfillConfig,
    devices: &'a [BackfillDevice],
    total_slots: u64,
    interval_ms: i64,
    device_index: usize,
    slot: u64,
    signal: SignalGenerator,
    inject: StdRng,
}

impl<'a> BackfillIter<'a> {
    fn new(config: &'a BackfillConfig, devices: &'a [BackfillDevice]) -> Self {
        let interval_ms = if config.readings_per_day > 0 {
            MS_PER_DAY / config.readings_per_day as i64
        } else {
            0
        };
        let device_seed = config.seed;
        Self {
            config,
            devices,
            total_slots: config.total_slots(),
            interval_ms,
            device_index: 0,
            slot: 0,
            signal: SignalGenerator::seeded(device_seed),
            inject: StdRng::seed_from_u64(device_seed ^ INJECT_SEED_SALT),
        }
    }

    fn advance_device(&mut self) {
        self.device_index += 1;
        self.slot = 0;
        let device_seed = self.config.seed.wrapping_add(self.device_index as u64);
        self.signal = SignalGenerator::seeded(device_seed);
        self.inject = StdRng::seed_from_u64(device_seed ^ INJECT_SEED_SALT);
    }
}

impl Iterator for BackfillIter<'_> {
    type Item = Result<TelemetryReading>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.total_slots == 0 {
            return None;
        }
        while self.device_index < self.devices.len() && self.slot >= self.total_slots {
            self.advance_device();
        }
        let device = self.devices.get(self.device_index)?;

        let slot = self.slot;
        self.slot += 1;

        let metric = &device.spec.metrics[slot as usize % device.spec.metrics.len()];
        let mut value = match self.signal.generate(metric, slot, device.spec.noise_factor) {
            Ok(value) => value,
            Err(e) => return Some(Err(e.into())),
        };

        if self.inject.gen::<f64>() < self.config.anomaly_probability {
            let sign = if self.inject.gen::<bool>() { 1.0 } else { -1.0 };
            value += sign * 10.0 * metric.noise_span();
        }

        let timestamp = self.config.start + Duration::milliseconds(slot as i64 * self.interval_ms);
        Some(Ok(TelemetryReading::new(
            device.id.clone(),
            metric.name.clone(),
            value,
            slot,
        )
        .with_timestamp(timestamp)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use telix_core::MemorySink;
    use telix_ingest::AnomalyConfig;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    fn make_generator(days: u32, rpd: u32, probability: f64) -> BackfillGenerator {
        let spec = Arc::new(find_type("temperature").unwrap());
        BackfillGenerator::new(
            BackfillConfig {
                days,
                readings_per_day: rpd,
                anomaly_probability: probability,
                seed: 42,
                start: start(),
            },
            vec![
                BackfillDevice::new("dev_001", spec.clone()),
                BackfillDevice::new("dev_002", spec),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_counts_and_sequences() {
        let generator = make_generator(1, 24, 0.0);
        let readings: Vec<TelemetryReading> = generator
            .readings()
            .collect::<Result<Vec<_>>>()
            .unwrap();

        // 2 台设备，每天 24 条，共 48 条
        assert_eq!(readings.len(), 48);

        for device in ["dev_001", "dev_002"] {
            let own: Vec<&TelemetryReading> =
                readings.iter().filter(|r| r.device_id == device).collect();
            assert_eq!(own.len(), 24);
            for (i, reading) in own.iter().enumerate() {
                assert_eq!(reading.sequence, i as u64);
                // 24 条/天即逐小时排布
                assert_eq!(
                    reading.timestamp,
                    start() + Duration::hours(i as i64)
                );
            }
        }
    }

    #[test]
    fn test_metric_round_robin() {
        let generator = make_generator(1, 6, 0.0);
        let readings: Vec<TelemetryReading> = generator
            .readings()
            .filter_map(|r| r.ok())
            .filter(|r| r.device_id == "dev_001")
            .collect();

        let metrics: Vec<&str> = readings.iter().map(|r| r.metric.as_str()).collect();
        assert_eq!(
            metrics,
            vec![
                "temperature",
                "humidity",
                "battery",
                "temperature",
                "humidity",
                "battery"
            ]
        );
    }

    #[test]
    fn test_zero_readings_per_day_is_empty() {
        let generator = make_generator(3, 0, 0.0);
        assert_eq!(generator.readings().count(), 0);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let generator = make_generator(1, 48, 0.3);

        let first: Vec<TelemetryReading> =
            generator.readings().collect::<Result<Vec<_>>>().unwrap();
        let second: Vec<TelemetryReading> =
            generator.readings().collect::<Result<Vec<_>>>().unwrap();

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            assert_eq!(a.device_id, b.device_id);
            assert_eq!(a.sequence, b.sequence);
            assert_eq!(a.timestamp, b.timestamp);
            assert_eq!(a.value.to_bits(), b.value.to_bits());
        }
    }

    #[test]
    fn test_invalid_probability_rejected() {
        let spec = Arc::new(find_type("flow").unwrap());
        let result = BackfillGenerator::new(
            BackfillConfig {
                anomaly_probability: 1.5,
                ..Default::default()
            },
            vec![BackfillDevice::new("dev_001", spec)],
        );
        assert!(matches!(result, Err(BackfillError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_run_writes_readings_and_events() {
        let spec = Arc::new(find_type("temperature").unwrap());
        let generator = BackfillGenerator::new(
            BackfillConfig {
                days: 1,
                readings_per_day: 200,
                anomaly_probability: 0.2,
                seed: 7,
                start: start(),
            },
            vec![BackfillDevice::new("dev_001", spec)],
        )
        .unwrap();

        let engine = AnomalyEngine::new(AnomalyConfig {
            warmup: 5,
            ..Default::default()
        })
        .unwrap();
        let sink = MemorySink::new();

        let report = generator.run(&engine, &sink).await.unwrap();
        assert_eq!(report.readings, 200);
        assert_eq!(sink.reading_count().await, 200);

        // 20% 的读数被注入 ±10 倍噪声幅度的偏移，必然触发异常事件
        assert!(report.anomalies > 0);
        assert_eq!(sink.event_count().await, report.anomalies);
    }

    #[tokio::test]
    async fn test_from_directory_resolves_types() {
        use telix_core::{DeviceEntry, MemoryDirectory};

        let directory = MemoryDirectory::new(vec![
            DeviceEntry::new("dev_001", "温度传感器", "temperature"),
            DeviceEntry::new("dev_002", "流量计", "flow"),
        ]);
        let generator = BackfillGenerator::from_directory(BackfillConfig::default(), &directory)
            .await
            .unwrap();
        assert_eq!(generator.device_count(), 2);

        let directory = MemoryDirectory::new(vec![DeviceEntry::new("dev_x", "未知", "quantum")]);
        let result = BackfillGenerator::from_directory(BackfillConfig::default(), &directory).await;
        assert!(matches!(result, Err(BackfillError::UnknownDeviceType(_))));
    }
}
