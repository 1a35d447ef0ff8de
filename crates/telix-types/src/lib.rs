pub mod event;
pub mod reading;
pub mod topic;

pub use event::{AnomalyEvent, Severity};
pub use reading::TelemetryReading;
pub use topic::{device_id_from_topic, telemetry_topic, TELEMETRY_WILDCARD};
