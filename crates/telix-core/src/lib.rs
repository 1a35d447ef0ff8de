pub mod bus;
pub mod error;
pub mod memory;
pub mod traits;

pub use bus::{EventBus, SharedEventBus};
pub use error::{Result, TelixError};
pub use memory::{MemoryDirectory, MemorySink};
pub use traits::{DeviceDirectory, DeviceEntry, EventPublisher, TelemetrySink};
