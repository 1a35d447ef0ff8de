pub mod catalog;
pub mod error;
pub mod generator;
pub mod spec;

pub use catalog::{builtin_types, find_type};
pub use error::{Result, SignalError};
pub use generator::{baseline, SignalGenerator};
pub use spec::{DeviceTypeSpec, MetricSpec};
