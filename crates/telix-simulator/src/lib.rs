pub mod config;
pub mod device;
pub mod error;
pub mod fleet;
pub mod runtime;
pub mod state;
pub mod transport;

pub use config::{DeviceOverride, DeviceOverrides, SimulatorConfig};
pub use device::SimulatedDevice;
pub use error::{Result, SimulatorError};
pub use fleet::{FleetCoordinator, FleetCounters, FleetHandle, FleetReport, FleetSnapshot};
pub use runtime::{DeviceRuntime, FleetEvent, RuntimeOptions};
pub use state::{transition, DeviceState, StateEvent};
pub use transport::{ChannelTransport, MqttTransport, Transport};
