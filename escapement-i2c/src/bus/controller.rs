//! Bus lifecycle: power, pins and reference counting
//!
//! The rail and peripheral are brought up on the first `acquire` and torn
//! down on the last `release`. Misuse (releasing or resetting a bus nobody
//! holds) is logged and ignored; a flaky sensor must never take the watch
//! down with it.

use embedded_hal_async::delay::DelayNs;
use escapement_hal::{I2cPeripheral, I2cPins, PinMode, RailControl};

use super::I2cBus;
use crate::stats::BusStats;

impl<'s, P, G, R, D> I2cBus<'s, P, G, R, D>
where
    P: I2cPeripheral,
    G: I2cPins,
    R: RailControl,
    D: DelayNs,
{
    /// Take a reference on the bus (the `use` of a slave port)
    ///
    /// The 0 → 1 transition powers the rail, muxes the pins to the
    /// peripheral and enables it.
    pub async fn acquire(&mut self) {
        if self.user_count == 0 {
            self.enable().await;
        }
        self.user_count = self.user_count.saturating_add(1);
    }

    /// Drop a reference on the bus
    ///
    /// The 1 → 0 transition disables the peripheral and powers the rail
    /// down. Releasing an unused bus is logged and ignored.
    pub fn release(&mut self) {
        if self.user_count == 0 {
            #[cfg(feature = "defmt")]
            defmt::error!(
                "{=str}: release with no users",
                self.config.name.as_str()
            );
            BusStats::bump(&mut self.stats.misuse);
            return;
        }

        self.user_count -= 1;
        if self.user_count == 0 {
            self.disable();
        }
    }

    /// Re-initialize a wedged bus
    ///
    /// The user count is dropped by one around a full disable/enable cycle,
    /// so a sole user gets a complete power cycle while a shared bus only
    /// has its pins and peripheral re-initialized. The count is the same
    /// before and after.
    pub async fn reset(&mut self) {
        if self.user_count == 0 {
            #[cfg(feature = "defmt")]
            defmt::error!(
                "{=str}: reset with no users",
                self.config.name.as_str()
            );
            BusStats::bump(&mut self.stats.misuse);
            return;
        }

        #[cfg(feature = "defmt")]
        defmt::warn!("{=str}: resetting bus", self.config.name.as_str());

        self.user_count -= 1;
        self.disable();
        self.enable().await;
        self.user_count += 1;

        BusStats::bump(&mut self.stats.resets);
    }

    /// Clock SCL by hand until a slave lets go of SDA
    ///
    /// A slave interrupted mid-byte keeps SDA low until it has clocked out
    /// the rest of its byte. Up to `bitbang_max_clocks` pulses are issued,
    /// checking SDA after each one. Whatever the outcome, the pins go back
    /// to I2C mode and the bus is reset.
    ///
    /// Returns `true` if SDA was released.
    pub async fn bitbang_recovery(&mut self) -> bool {
        if self.user_count == 0 {
            #[cfg(feature = "defmt")]
            defmt::error!(
                "{=str}: bus recovery with no users",
                self.config.name.as_str()
            );
            BusStats::bump(&mut self.stats.misuse);
            return false;
        }

        #[cfg(feature = "defmt")]
        defmt::warn!("{=str}: attempting bus recovery", self.config.name.as_str());
        BusStats::bump(&mut self.stats.recoveries);

        let timing = self.config.timing;
        self.pins.set_mode(PinMode::Recovery);

        let mut clocks: u8 = 0;
        let mut recovered = false;
        while clocks < timing.bitbang_max_clocks {
            self.pins.set_scl(false);
            self.delay.delay_ms(timing.bitbang_half_period_ms).await;
            self.pins.set_scl(true);
            self.delay.delay_ms(timing.bitbang_half_period_ms).await;
            clocks += 1;

            if self.pins.sda_is_high() {
                recovered = true;
                break;
            }
        }

        if recovered {
            #[cfg(feature = "defmt")]
            defmt::info!(
                "{=str}: recovered after {=u8} clocks",
                self.config.name.as_str(),
                clocks
            );
            BusStats::bump(&mut self.stats.recoveries_ok);
        } else {
            #[cfg(feature = "defmt")]
            defmt::error!(
                "{=str}: SDA still held low after recovery",
                self.config.name.as_str()
            );
        }

        self.pins.set_mode(PinMode::I2c);
        self.reset().await;

        recovered
    }

    /// Bring the bus up; the rail is only touched when nobody holds it
    pub(super) async fn enable(&mut self) {
        if self.user_count == 0 {
            self.rail_power_up().await;
        }
        self.pins.set_mode(PinMode::I2c);
        self.peripheral.enable(&self.config.speed);
    }

    /// Take the bus down; the rail stays up while others hold the bus
    pub(super) fn disable(&mut self) {
        self.peripheral.disable();
        self.pins.set_mode(PinMode::Input);
        if self.user_count == 0 {
            self.rail_power_down();
        }
    }

    async fn rail_power_up(&mut self) {
        if !self.rail.is_present() {
            return;
        }

        let timing = self.config.timing;
        self.delay.delay_ms(timing.stop_time_ms).await;
        self.rail.set_enabled(true);
        self.rail_on = true;
        self.delay.delay_ms(timing.rail_settle_ms).await;

        #[cfg(feature = "defmt")]
        defmt::debug!("{=str}: rail up", self.config.name.as_str());
    }

    pub(super) fn rail_power_down(&mut self) {
        if !self.rail.is_present() {
            return;
        }

        self.rail.set_enabled(false);
        self.rail_on = false;
        // Drain the bus devices through the pull-ups
        self.pins.set_mode(PinMode::DrainLow);

        #[cfg(feature = "defmt")]
        defmt::debug!("{=str}: rail down", self.config.name.as_str());
    }
}

#[cfg(test)]
mod tests {
    use embassy_futures::block_on;
    use escapement_hal::PinMode;
    use proptest::prelude::*;

    use crate::event::TransferSignal;
    use crate::mock::{self, count, delay_between, position, Call};

    #[test]
    fn test_init_powers_rail_down() {
        let signal = TransferSignal::new();
        let (bus, log) = mock::bus(&signal, true);

        assert_eq!(
            *log.borrow(),
            [
                Call::HalInit,
                Call::RailInit,
                Call::Pins(PinMode::Input),
                Call::Rail(false),
                Call::Pins(PinMode::DrainLow),
            ]
        );
        assert_eq!(bus.user_count(), 0);
        assert!(!bus.is_powered());
    }

    #[test]
    fn test_acquire_release_sequence() {
        let signal = TransferSignal::new();
        let (mut bus, log) = mock::bus(&signal, true);
        log.borrow_mut().clear();

        block_on(bus.acquire());

        let rail_on = position(&log, Call::Rail(true)).unwrap();
        let pins = position(&log, Call::Pins(PinMode::I2c)).unwrap();
        let enable = position(&log, Call::HalEnable).unwrap();
        assert!(delay_between(&log, 0, rail_on) >= 10);
        assert!(delay_between(&log, rail_on, pins) >= 20);
        assert!(rail_on < pins && pins < enable);
        assert_eq!(bus.user_count(), 1);
        assert!(bus.is_powered());
        assert_eq!(bus.peripheral.last_speed, Some(bus.config().speed));

        log.borrow_mut().clear();
        bus.release();

        let disable = position(&log, Call::HalDisable).unwrap();
        let rail_off = position(&log, Call::Rail(false)).unwrap();
        assert!(disable < rail_off);
        assert_eq!(count(&log, Call::Pins(PinMode::DrainLow)), 1);
        assert_eq!(bus.user_count(), 0);
        assert!(!bus.is_powered());
    }

    #[test]
    fn test_second_user_does_not_repower() {
        let signal = TransferSignal::new();
        let (mut bus, log) = mock::bus(&signal, true);

        block_on(async {
            bus.acquire().await;
            bus.acquire().await;
        });
        assert_eq!(count(&log, Call::Rail(true)), 1);
        assert_eq!(count(&log, Call::HalEnable), 1);
        assert_eq!(bus.user_count(), 2);

        bus.release();
        assert_eq!(count(&log, Call::HalDisable), 0);
        assert!(bus.is_powered());

        bus.release();
        assert_eq!(count(&log, Call::HalDisable), 1);
        assert!(!bus.is_powered());
    }

    #[test]
    fn test_release_unused_bus_is_ignored() {
        let signal = TransferSignal::new();
        let (mut bus, log) = mock::bus(&signal, true);
        log.borrow_mut().clear();

        bus.release();

        assert_eq!(bus.user_count(), 0);
        assert_eq!(bus.stats().misuse, 1);
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_bus_without_rail_is_always_powered() {
        let signal = TransferSignal::new();
        let (mut bus, log) = mock::bus(&signal, false);
        assert!(bus.is_powered());

        block_on(bus.acquire());
        bus.release();

        assert_eq!(count(&log, Call::Rail(true)), 0);
        assert_eq!(count(&log, Call::Pins(PinMode::DrainLow)), 0);
        // No rail, no sequencing delays
        assert_eq!(delay_between(&log, 0, log.borrow().len()), 0);
        assert!(bus.is_powered());
    }

    #[test]
    fn test_reset_sole_user_power_cycles() {
        let signal = TransferSignal::new();
        let (mut bus, log) = mock::bus(&signal, true);
        block_on(bus.acquire());
        log.borrow_mut().clear();

        block_on(bus.reset());

        assert_eq!(count(&log, Call::Rail(false)), 1);
        assert_eq!(count(&log, Call::Rail(true)), 1);
        assert_eq!(count(&log, Call::HalDisable), 1);
        assert_eq!(count(&log, Call::HalEnable), 1);
        assert_eq!(bus.user_count(), 1);
        assert_eq!(bus.stats().resets, 1);
    }

    #[test]
    fn test_reset_shared_bus_keeps_rail_up() {
        let signal = TransferSignal::new();
        let (mut bus, log) = mock::bus(&signal, true);
        block_on(async {
            bus.acquire().await;
            bus.acquire().await;
        });
        log.borrow_mut().clear();

        block_on(bus.reset());

        assert_eq!(count(&log, Call::Rail(false)), 0);
        assert_eq!(count(&log, Call::Rail(true)), 0);
        assert_eq!(
            *log.borrow(),
            [
                Call::HalDisable,
                Call::Pins(PinMode::Input),
                Call::Pins(PinMode::I2c),
                Call::HalEnable,
            ]
        );
        assert_eq!(bus.user_count(), 2);
        assert!(bus.is_powered());
    }

    #[test]
    fn test_reset_unused_bus_is_ignored() {
        let signal = TransferSignal::new();
        let (mut bus, log) = mock::bus(&signal, true);
        log.borrow_mut().clear();

        block_on(bus.reset());

        assert!(log.borrow().is_empty());
        assert_eq!(bus.user_count(), 0);
        assert_eq!(bus.stats().misuse, 1);
        assert_eq!(bus.stats().resets, 0);
    }

    #[test]
    fn test_bitbang_recovery_succeeds_after_third_clock() {
        let signal = TransferSignal::new();
        let (mut bus, log) = mock::bus(&signal, true);
        bus.pins.sda_release_after = Some(3);
        block_on(bus.acquire());
        log.borrow_mut().clear();

        assert!(block_on(bus.bitbang_recovery()));

        assert_eq!(bus.pins.pulses, 3);
        assert_eq!(count(&log, Call::Scl(false)), 3);
        assert_eq!(log.borrow()[0], Call::Pins(PinMode::Recovery));
        assert_eq!(bus.pins.mode, PinMode::I2c);
        assert_eq!(bus.user_count(), 1);
        assert_eq!(bus.stats().resets, 1);
        assert_eq!(bus.stats().recoveries_ok, 1);
    }

    #[test]
    fn test_bitbang_recovery_gives_up_after_ten_clocks() {
        let signal = TransferSignal::new();
        let (mut bus, log) = mock::bus(&signal, true);
        bus.pins.sda_release_after = None;
        block_on(bus.acquire());
        log.borrow_mut().clear();

        assert!(!block_on(bus.bitbang_recovery()));

        assert_eq!(bus.pins.pulses, 10);
        // Still restored to I2C mode and reset
        let restore = position(&log, Call::Pins(PinMode::I2c)).unwrap();
        let reset = position(&log, Call::HalDisable).unwrap();
        assert!(restore < reset);
        assert_eq!(bus.pins.mode, PinMode::I2c);
        assert_eq!(bus.stats().resets, 1);
        assert_eq!(bus.stats().recoveries, 1);
        assert_eq!(bus.stats().recoveries_ok, 0);
    }

    #[test]
    fn test_bitbang_recovery_on_unused_bus() {
        let signal = TransferSignal::new();
        let (mut bus, log) = mock::bus(&signal, true);
        log.borrow_mut().clear();

        assert!(!block_on(bus.bitbang_recovery()));
        assert!(log.borrow().is_empty());
        assert_eq!(bus.stats().misuse, 1);
    }

    proptest! {
        #[test]
        fn prop_user_count_tracks_unmatched_acquires(ops in proptest::collection::vec(any::<bool>(), 0..64)) {
            let signal = TransferSignal::new();
            let (mut bus, _log) = mock::bus(&signal, true);
            let mut expected: u32 = 0;

            block_on(async {
                for acquire in &ops {
                    if *acquire {
                        bus.acquire().await;
                        expected += 1;
                    } else {
                        bus.release();
                        expected = expected.saturating_sub(1);
                    }
                    assert_eq!(bus.user_count(), expected);
                    assert_eq!(bus.is_powered(), expected > 0);
                }

                // Balance the sequence
                while expected > 0 {
                    bus.release();
                    expected -= 1;
                }
            });

            prop_assert_eq!(bus.user_count(), 0);
            prop_assert!(!bus.is_powered());
        }
    }
}
