//! Shared I2C bus controller and transaction engine
//!
//! This crate owns everything between a peripheral driver (audio codec,
//! accelerometer, heart-rate sensor, ...) and the register-level I2C block:
//!
//! - Bus lifecycle: power rail sequencing, pin muxing, reference-counted
//!   enable/disable, reset and bit-banged bus-clear recovery
//! - Transaction engine: one read or write per call, NACK retry for
//!   devices that refuse their address while busy, bounded completion wait
//! - Slave ports: a 7-bit address bound to a shared bus
//!
//! The hardware is reached only through the traits in `escapement-hal`.
//! Completion is reported from interrupt context through
//! [`handle_transfer_event`].

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod bus;
pub mod config;
pub mod error;
pub mod event;
pub mod recovery;
pub mod slave;
pub mod stats;

#[cfg(test)]
mod mock;

pub use bus::I2cBus;
pub use config::{BusConfig, BusTiming, PinConfig};
pub use error::{ConfigError, TransferError};
pub use event::{handle_transfer_event, TransferSignal};
pub use recovery::{RecoveryAction, RecoveryState};
pub use slave::{SharedBus, SlaveAddress, SlavePort};
pub use stats::BusStats;
