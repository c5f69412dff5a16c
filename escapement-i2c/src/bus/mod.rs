//! One physical I2C bus
//!
//! [`I2cBus`] owns the peripheral block, its pins, the optional power rail
//! and the delay source. The controller half handles power
//! and reference counting; the engine half runs transactions.
//!
//! The bus is driven by one task at a time (callers share it through a
//! [`SharedBus`](crate::SharedBus) mutex). The interrupt handler only
//! touches the [`TransferSignal`].

mod controller;
mod engine;

use embedded_hal_async::delay::DelayNs;
use escapement_hal::{I2cPeripheral, I2cPins, PinMode, RailControl};

use crate::config::BusConfig;
use crate::error::ConfigError;
use crate::event::TransferSignal;
use crate::stats::BusStats;

/// One physical I2C bus and its runtime state
pub struct I2cBus<'s, P, G, R, D> {
    config: BusConfig,
    pub(crate) peripheral: P,
    pub(crate) pins: G,
    rail: R,
    delay: D,
    events: &'s TransferSignal,
    /// Slave ports currently holding the bus open
    user_count: u32,
    rail_on: bool,
    /// A transfer has been started and not yet finished
    in_flight: bool,
    /// Busy NACKs seen by the most recent transfer
    nack_count: u16,
    stats: BusStats,
}

impl<'s, P, G, R, D> I2cBus<'s, P, G, R, D>
where
    P: I2cPeripheral,
    G: I2cPins,
    R: RailControl,
    D: DelayNs,
{
    /// Initialize a bus
    ///
    /// Runs the peripheral's one-time init, configures the rail control
    /// output and powers the rail down so an idle bus draws nothing. This
    /// is the only way to obtain a bus, so every other operation runs on an
    /// initialized one.
    ///
    /// # Panics
    /// If `config` fails [`BusConfig::validate`] or its `rail_pin` disagrees
    /// with `rail`. Bus tables are fixed at build time; use
    /// [`try_new`](Self::try_new) for configs loaded at runtime.
    pub fn new(
        config: BusConfig,
        peripheral: P,
        pins: G,
        rail: R,
        delay: D,
        events: &'s TransferSignal,
    ) -> Self {
        match Self::try_new(config, peripheral, pins, rail, delay, events) {
            Ok(bus) => bus,
            Err(err) => panic!("invalid I2C bus config: {}", err),
        }
    }

    /// Initialize a bus, rejecting an invalid config
    ///
    /// Nothing is touched when the config is rejected.
    pub fn try_new(
        config: BusConfig,
        peripheral: P,
        pins: G,
        rail: R,
        delay: D,
        events: &'s TransferSignal,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        if config.rail_pin.is_some() != rail.is_present() {
            return Err(ConfigError::RailMismatch);
        }

        let mut bus = Self {
            config,
            peripheral,
            pins,
            rail,
            delay,
            events,
            user_count: 0,
            rail_on: false,
            in_flight: false,
            nack_count: 0,
            stats: BusStats::default(),
        };

        bus.events.reset();
        bus.peripheral.init();
        bus.rail.init();
        bus.pins.set_mode(PinMode::Input);
        bus.rail_power_down();

        #[cfg(feature = "defmt")]
        defmt::debug!("{=str}: initialized", bus.config.name.as_str());

        Ok(bus)
    }

    /// Bus configuration
    pub fn config(&self) -> &BusConfig {
        &self.config
    }

    /// Number of slave ports holding the bus open
    pub fn user_count(&self) -> u32 {
        self.user_count
    }

    /// Whether the bus devices currently have power
    ///
    /// Buses without rail control are always powered.
    pub fn is_powered(&self) -> bool {
        !self.rail.is_present() || self.rail_on
    }

    /// Busy NACKs retried by the most recent transfer
    pub fn last_nack_count(&self) -> u16 {
        self.nack_count
    }

    /// Diagnostic counters
    pub fn stats(&self) -> &BusStats {
        &self.stats
    }
}
