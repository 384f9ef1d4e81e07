#![cfg_attr(not(test), no_std)]
#![doc = include_str!("../README.md")]

mod address;
mod command;
pub mod crc;
mod device;
mod driver;
#[cfg(feature = "ds18b20")]
pub mod ds18b20;
mod iowire;
mod result;
mod search;
mod sensor;
#[cfg(test)]
mod sim;
mod timing;

pub use address::{Address, AddressError};
pub use command::{Command, OpCode};
pub use crc::{check_crc8, crc8, crc8_bytes};
pub use device::Device;
pub use driver::Driver;
pub use iowire::{Inverted, IoWire};
pub use result::Error;
pub use search::{DeviceSearch, DeviceSearchIter};
pub use sensor::Sensor;
pub use timing::Timing;
