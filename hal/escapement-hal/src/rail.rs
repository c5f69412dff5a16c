//! Bus power rail control
//!
//! Some boards switch the supply of the devices hanging off a bus so the
//! bus can be fully powered down when nobody uses it.

use core::convert::Infallible;

use embedded_hal::digital::OutputPin;

/// Power switch for the devices on one bus
pub trait RailControl {
    /// Whether a switchable rail exists at all
    ///
    /// When this returns `false` the bus is treated as always powered and
    /// no rail sequencing delays are applied.
    fn is_present(&self) -> bool {
        true
    }

    /// Configure the control output (called once at bus init)
    fn init(&mut self) {}

    /// Switch the rail on or off
    fn set_enabled(&mut self, enabled: bool);
}

impl<T: RailControl + ?Sized> RailControl for &mut T {
    fn is_present(&self) -> bool {
        (**self).is_present()
    }

    fn init(&mut self) {
        (**self).init()
    }

    fn set_enabled(&mut self, enabled: bool) {
        (**self).set_enabled(enabled)
    }
}

/// Bus without rail control (always on)
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRail;

impl RailControl for NoRail {
    fn is_present(&self) -> bool {
        false
    }

    fn set_enabled(&mut self, _enabled: bool) {}
}

/// Rail switched by a GPIO output
///
/// The pin can be configured as active-high (default) or active-low.
pub struct GpioRail<P> {
    pin: P,
    /// If true, rail ON = pin LOW
    inverted: bool,
    on: bool,
}

impl<P: OutputPin<Error = Infallible>> GpioRail<P> {
    /// Create a new GPIO rail switch
    ///
    /// # Arguments
    /// - `pin`: The GPIO pin driving the load switch
    /// - `inverted`: If true, the rail is ON when the pin is LOW
    pub fn new(pin: P, inverted: bool) -> Self {
        Self {
            pin,
            inverted,
            on: false,
        }
    }

    /// Create a rail switch with an active-high enable
    pub fn new_active_high(pin: P) -> Self {
        Self::new(pin, false)
    }

    /// Create a rail switch with an active-low enable
    pub fn new_active_low(pin: P) -> Self {
        Self::new(pin, true)
    }

    /// Current logical state (true = rail powered)
    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Release the underlying pin
    pub fn into_inner(self) -> P {
        self.pin
    }
}

impl<P: OutputPin<Error = Infallible>> RailControl for GpioRail<P> {
    fn init(&mut self) {
        self.set_enabled(false);
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.on = enabled;

        let result = if enabled != self.inverted {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        match result {
            Ok(()) => {}
            Err(never) => match never {},
        }
    }
}

/// Rail switched by a board callback
pub struct RailFn<F>(pub F);

impl<F: FnMut(bool)> RailControl for RailFn<F> {
    fn set_enabled(&mut self, enabled: bool) {
        (self.0)(enabled)
    }
}
