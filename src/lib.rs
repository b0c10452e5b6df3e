//!
//! A platform-agnostic driver for the BL0940 single-phase energy metering device. Built using
//! embedded-hal.
//!
//! The BL0940 is a calibration-free metering front end that reports RMS voltage and current,
//! active power and energy, power factor and die temperature through 24-bit registers, exchanged
//! over a half-duplex SPI protocol (MODE 0, MSB first, up to 400 kHz) with a one-byte frame
//! checksum. The driver handles frame encoding, checksum verification with bounded retries, and
//! the conversion of raw register values into physical units from the analog front-end constants
//! in [`DeviceConfig`].
//!
//! ```ignore
//! use bl0940::{Bl0940Driver, LineFrequency, UpdateRate};
//!
//! // spi: embedded_hal::spi::SpiDevice, delay: embedded_hal::delay::DelayNs
//! let mut meter = Bl0940Driver::new(spi, delay);
//! meter.init()?;
//! meter.set_line_frequency(LineFrequency::F60Hz)?;
//! meter.set_update_rate(UpdateRate::Fast)?;
//!
//! let voltage = meter.get_voltage()?;
//! let power = meter.get_active_power()?;
//! ```
//!

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod config;
pub mod driver;
pub mod protocol;
pub mod register;

pub use config::{CalibrationFactors, DeviceConfig, LineFrequency, UpdateRate};
pub use driver::*;
pub use register::Register;
