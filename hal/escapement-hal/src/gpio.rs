//! GPIO abstractions for the I2C lines
//!
//! The bus controller switches SCL/SDA between the peripheral's alternate
//! function and plain GPIO use during power sequencing and bus recovery.

/// Electrical configuration for both I2C lines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinMode {
    /// Alternate function, open drain, no internal pull (external
    /// pull-ups), pin speed of at least 50 MHz for fast mode
    I2c,
    /// Passive input; the lines float to whatever the pull-ups allow
    Input,
    /// Push-pull outputs driven low, draining a powered-down rail
    /// through its pull-ups
    DrainLow,
    /// SCL as a driven output, SDA as an input (bus-clear clocking)
    Recovery,
}

/// SCL/SDA pin pair of one bus
pub trait I2cPins {
    /// Reconfigure both lines
    fn set_mode(&mut self, mode: PinMode);

    /// Drive SCL (only meaningful in [`PinMode::Recovery`])
    fn set_scl(&mut self, high: bool);

    /// Check if SDA reads high (only meaningful in [`PinMode::Recovery`])
    fn sda_is_high(&self) -> bool;

    /// Check if SDA is held low
    fn sda_is_low(&self) -> bool {
        !self.sda_is_high()
    }
}

impl<T: I2cPins + ?Sized> I2cPins for &mut T {
    fn set_mode(&mut self, mode: PinMode) {
        (**self).set_mode(mode)
    }

    fn set_scl(&mut self, high: bool) {
        (**self).set_scl(high)
    }

    fn sda_is_high(&self) -> bool {
        (**self).sda_is_high()
    }
}
