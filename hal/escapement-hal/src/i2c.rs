//! I2C peripheral abstractions
//!
//! Provides the register-level trait for an interrupt-driven I2C master
//! block. The bus controller in `escapement-i2c` owns the sequencing; an
//! implementation only needs to poke the hardware.

use crate::transfer::Transfer;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Outcome of one transfer attempt, reported from interrupt context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferEvent {
    /// All bytes were moved and a stop condition was issued
    TransferComplete,
    /// The device did not acknowledge its address right after the start
    /// condition (it is busy and the start should be retried)
    Nack,
    /// Bus error, arbitration loss or a NACK in the middle of the data phase
    Error,
}

/// Register-level I2C master
///
/// None of these calls block. Once [`start_transfer`](Self::start_transfer)
/// has issued a start condition, the platform interrupt handler walks the
/// wire sequence and reports exactly one [`TransferEvent`] per attempt.
pub trait I2cPeripheral {
    /// One-time initialization of the peripheral block (clocks gated off)
    fn init(&mut self);

    /// Enable the peripheral clock and block at the given bus speed
    fn enable(&mut self, config: &I2cConfig);

    /// Disable the peripheral block and gate its clock
    fn disable(&mut self);

    /// Whether the hardware reports the bus as busy (SDA or SCL held low
    /// or a transfer still running)
    fn is_busy(&self) -> bool;

    /// Prepare the block for a new transfer (clear flags, load address)
    fn init_transfer(&mut self, transfer: &Transfer<'_>);

    /// Issue (or re-issue) the start condition for the prepared transfer
    fn start_transfer(&mut self, transfer: &mut Transfer<'_>);

    /// Abort the current transfer: disable interrupts and send a stop
    ///
    /// Once this returns the peripheral must not touch the transfer passed
    /// to `start_transfer` again; its buffer may already be gone.
    fn abort_transfer(&mut self);
}

impl<T: I2cPeripheral + ?Sized> I2cPeripheral for &mut T {
    fn init(&mut self) {
        (**self).init()
    }

    fn enable(&mut self, config: &I2cConfig) {
        (**self).enable(config)
    }

    fn disable(&mut self) {
        (**self).disable()
    }

    fn is_busy(&self) -> bool {
        (**self).is_busy()
    }

    fn init_transfer(&mut self, transfer: &Transfer<'_>) {
        (**self).init_transfer(transfer)
    }

    fn start_transfer(&mut self, transfer: &mut Transfer<'_>) {
        (**self).start_transfer(transfer)
    }

    fn abort_transfer(&mut self) {
        (**self).abort_transfer()
    }
}

/// I2C configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct I2cConfig {
    /// Clock frequency in Hz
    pub frequency: u32,
}

impl Default for I2cConfig {
    fn default() -> Self {
        Self::FAST
    }
}

impl I2cConfig {
    /// Standard mode (100 kHz)
    pub const STANDARD: Self = Self { frequency: 100_000 };

    /// Fast mode (400 kHz)
    pub const FAST: Self = Self { frequency: 400_000 };

    /// Fast mode plus (1 MHz)
    pub const FAST_PLUS: Self = Self {
        frequency: 1_000_000,
    };

    /// Whether this speed needs the fast-mode pin drive strength
    pub fn is_fast_mode(&self) -> bool {
        self.frequency > Self::STANDARD.frequency
    }
}
