use crate::spec::{DeviceTypeSpec, MetricSpec};

/// 内置设备类型目录
///
/// 波形参数取自实验室常见的三类传感器：温度、振动、流量。
/// tick 以发布周期为单位，288 对应 5 分钟周期下的一天。
pub fn builtin_types() -> Vec<DeviceTypeSpec> {
    vec![
        DeviceTypeSpec::new(
            "temperature",
            vec![
                MetricSpec::new("temperature", 20.5, 3.5, 288.0).with_unit("°C"),
                MetricSpec::new("humidity", 62.0, 7.0, 288.0).with_unit("%"),
                // 电池约 30 天放完 20%
                MetricSpec::new("battery", 100.0, 0.0, 288.0)
                    .with_drift(-0.000_023)
                    .with_unit("%"),
            ],
        )
        .with_noise_factor(0.05)
        .with_failure_rate(0.01),
        DeviceTypeSpec::new(
            "vibration",
            vec![
                MetricSpec::new("velocity_rms", 1.7, 0.4, 48.0).with_unit("mm/s"),
                MetricSpec::new("frequency", 40.0, 5.0, 96.0).with_unit("Hz"),
                MetricSpec::new("temperature", 48.5, 4.0, 192.0).with_unit("°C"),
            ],
        )
        .with_noise_factor(0.1)
        .with_failure_rate(0.02),
        DeviceTypeSpec::new(
            "flow",
            vec![
                MetricSpec::new("flow_rate", 55.0, 16.5, 288.0).with_unit("L/min"),
                MetricSpec::new("pressure", 3.5, 0.8, 288.0).with_unit("bar"),
                MetricSpec::new("temperature", 30.0, 2.0, 288.0).with_unit("°C"),
            ],
        )
        .with_noise_factor(0.05)
        .with_failure_rate(0.01),
    ]
}

/// 按名称查找内置设备类型
pub fn find_type(name: &str) -> Option<DeviceTypeSpec> {
    builtin_types().into_iter().find(|t| t.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_types_are_valid() {
        let types = builtin_types();
        assert_eq!(types.len(), 3);
        for spec in &types {
            spec.validate().unwrap();
        }
    }

    #[test]
    fn test_find_type() {
        let flow = find_type("flow").unwrap();
        assert_eq!(flow.metrics.len(), 3);
        assert!(flow.metric("pressure").is_some());

        assert!(find_type("quantum").is_none());
    }
}
