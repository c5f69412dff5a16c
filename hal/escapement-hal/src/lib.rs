//! Escapement Hardware Abstraction Layer
//!
//! This crate defines the traits a platform must implement so the
//! `escapement-i2c` bus controller can drive a physical I2C bus:
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Peripheral drivers (codec, accel, HRM) │
//! └─────────────────────────────────────────┘
//!                     │  SlavePort API
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  escapement-i2c (bus + transactions)    │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  escapement-hal (this crate - traits)   │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//!          chip register block + GPIO
//! ```
//!
//! # Traits
//!
//! - [`i2c::I2cPeripheral`] - Register-level I2C master block
//! - [`gpio::I2cPins`] - SCL/SDA pin muxing and manual line control
//! - [`rail::RailControl`] - Optional power rail for the bus devices

#![no_std]
#![deny(unsafe_code)]

pub mod gpio;
pub mod i2c;
pub mod rail;
pub mod transfer;

// Re-export key traits at crate root for convenience
pub use gpio::{I2cPins, PinMode};
pub use i2c::{I2cConfig, I2cPeripheral, TransferEvent};
pub use rail::{GpioRail, NoRail, RailControl, RailFn};
pub use transfer::{Direction, Transfer, TransferPhase, WireAction, WireEvent};
