//! Bus configuration
//!
//! Identity and timing of one physical bus. Everything here is fixed at
//! bring-up; runtime state lives in [`I2cBus`](crate::I2cBus).

use heapless::String;

use escapement_hal::I2cConfig;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Maximum bus name length
pub const MAX_NAME_LEN: usize = 16;

/// GPIO pin descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PinConfig {
    /// GPIO port letter ('A', 'B', ...)
    pub port: char,
    /// Pin number within the port
    pub pin: u8,
    /// Pin is active-low (inverted)
    pub inverted: bool,
}

impl PinConfig {
    /// Create a new pin descriptor
    pub const fn new(port: char, pin: u8) -> Self {
        Self {
            port,
            pin,
            inverted: false,
        }
    }

    /// Create an inverted (active-low) pin
    pub const fn inverted(port: char, pin: u8) -> Self {
        Self {
            port,
            pin,
            inverted: true,
        }
    }
}

/// Timing and retry policy of one bus
///
/// The defaults are hardware requirements of the devices on the watch
/// buses, not tuning knobs; change them only for a different board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BusTiming {
    /// Minimum time between the last stop condition and re-powering the rail
    pub stop_time_ms: u32,
    /// Rail stabilization time; the MFi chip needs its reset line stable
    /// for 10 ms after power-up
    pub rail_settle_ms: u32,
    /// How long to wait for a busy bus to clear after a reset
    pub busy_clear_timeout_ms: u32,
    /// Upper bound on one transfer attempt
    pub transfer_timeout_ms: u32,
    /// Start conditions allowed to be NACKed before giving up
    pub nack_retry_limit: u16,
    /// Pause between NACKed start conditions
    pub nack_retry_delay_ms: u32,
    /// SCL pulses issued by bus-clear recovery
    pub bitbang_max_clocks: u8,
    /// Time per SCL level during bus-clear recovery (found empirically)
    pub bitbang_half_period_ms: u32,
}

impl BusTiming {
    /// Timing of the stock watch buses
    pub const DEFAULT: Self = Self {
        stop_time_ms: 10,
        rail_settle_ms: 20,
        busy_clear_timeout_ms: 10,
        transfer_timeout_ms: 1000,
        nack_retry_limit: 1000,
        nack_retry_delay_ms: 2,
        bitbang_max_clocks: 10,
        bitbang_half_period_ms: 10,
    };
}

impl Default for BusTiming {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Static configuration of one physical bus
///
/// The pin descriptors name the board wiring for logs and board tables;
/// the pins themselves are driven through [`I2cPins`](escapement_hal::I2cPins)
/// and [`RailControl`](escapement_hal::RailControl). Bus creation rejects a
/// config whose `rail_pin` disagrees with the rail control it is given.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BusConfig {
    /// Human-readable name used in logs (e.g. "i2c2")
    pub name: String<MAX_NAME_LEN>,
    /// Clock line
    pub scl: PinConfig,
    /// Data line
    pub sda: PinConfig,
    /// Power rail enable, if the bus devices are switchable
    pub rail_pin: Option<PinConfig>,
    /// Bus speed
    pub speed: I2cConfig,
    /// Power sequencing, retry and recovery timing
    pub timing: BusTiming,
}

impl BusConfig {
    /// Create a config with default speed and timing
    pub fn new(name: &str, scl: PinConfig, sda: PinConfig) -> Result<Self, ConfigError> {
        let mut bus_name = String::new();
        bus_name
            .push_str(name)
            .map_err(|_| ConfigError::NameTooLong)?;

        let config = Self {
            name: bus_name,
            scl,
            sda,
            rail_pin: None,
            speed: I2cConfig::default(),
            timing: BusTiming::DEFAULT,
        };
        config.validate()?;
        Ok(config)
    }

    /// Attach a rail enable pin
    pub fn with_rail(mut self, rail_pin: PinConfig) -> Self {
        self.rail_pin = Some(rail_pin);
        self
    }

    /// Override the bus speed
    pub fn with_speed(mut self, speed: I2cConfig) -> Self {
        self.speed = speed;
        self
    }

    /// Override the timing policy
    ///
    /// Checked by [`validate`](Self::validate), which bus creation runs.
    pub fn with_timing(mut self, timing: BusTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Check the config for values that would wedge or disable the bus
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        if self.scl == self.sda {
            return Err(ConfigError::PinConflict);
        }
        if self.speed.frequency == 0 {
            return Err(ConfigError::InvalidTiming("speed"));
        }

        let timing = &self.timing;
        if timing.transfer_timeout_ms == 0 {
            return Err(ConfigError::InvalidTiming("transfer_timeout_ms"));
        }
        if timing.nack_retry_limit == 0 {
            return Err(ConfigError::InvalidTiming("nack_retry_limit"));
        }
        if timing.bitbang_max_clocks == 0 {
            return Err(ConfigError::InvalidTiming("bitbang_max_clocks"));
        }
        Ok(())
    }
}
