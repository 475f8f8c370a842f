pub mod config;
pub mod device;
pub(crate) mod dropout;
pub mod error;

pub use config::Config;
pub use device::DeviceOption;
