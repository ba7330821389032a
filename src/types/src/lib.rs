pub mod device;
pub mod reading;

pub use device::{DataBits, Device, DeviceId, Parity, RegisterArea, RegisterSpec, StopBits};
pub use reading::{Reading, RegisterValue};
