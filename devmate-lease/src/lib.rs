mod clock;
mod device;
mod error;

pub mod lease;
pub mod store;
pub mod validation;

pub use clock::{Clock, FixedClock, SystemClock};
pub use device::{Device, DeviceRecord, DeviceState, Status};
pub use error::{LeaseError, Result, StoreError};
pub use lease::{LeaseService, TransitionCoordinator};
pub use store::{DeviceStore, JsonFileStore, MemoryStore};
