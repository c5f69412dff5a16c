//! Scripted hardware doubles for host tests
//!
//! Every mock appends to one shared call log so tests can assert on the
//! exact order of rail, pin, peripheral and delay operations.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::vec::Vec;

use embedded_hal_async::delay::DelayNs;
use escapement_hal::{
    I2cConfig, I2cPeripheral, I2cPins, PinMode, RailControl, Transfer, TransferPhase,
    WireAction, WireEvent,
};

use crate::bus::I2cBus;
use crate::config::{BusConfig, PinConfig};
use crate::event::{handle_transfer_event, TransferSignal};

/// Everything the mocks did, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    HalInit,
    HalEnable,
    HalDisable,
    InitTransfer,
    StartTransfer,
    AbortTransfer,
    Pins(PinMode),
    Scl(bool),
    RailInit,
    Rail(bool),
    Delay(u32),
}

pub type Log = Rc<RefCell<Vec<Call>>>;

pub fn count(log: &Log, call: Call) -> usize {
    log.borrow().iter().filter(|c| **c == call).count()
}

pub fn position(log: &Log, call: Call) -> Option<usize> {
    log.borrow().iter().position(|c| *c == call)
}

/// How the device answers one start condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response {
    /// ACK everything; behave like a register file
    Ack,
    /// NACK the address (device busy)
    Nack,
    /// Bus error
    Error,
    /// No interrupt at all
    Silent,
}

/// Peripheral that plays a register-file device over the wire state machine
pub struct MockPeripheral<'s> {
    log: Log,
    signal: &'s TransferSignal,
    pub script: VecDeque<Response>,
    pub fallback: Response,
    pub registers: [u8; 256],
    pointer: u8,
    /// Reported busy until the peripheral is next disabled
    pub busy_until_disable: bool,
    /// Reported busy no matter what
    pub stuck_busy: bool,
    /// Reported busy once right after a transfer finishes
    pub busy_after_transfer: bool,
    pub last_speed: Option<I2cConfig>,
}

impl<'s> MockPeripheral<'s> {
    pub fn new(log: Log, signal: &'s TransferSignal) -> Self {
        Self {
            log,
            signal,
            script: VecDeque::new(),
            fallback: Response::Ack,
            registers: [0; 256],
            pointer: 0,
            busy_until_disable: false,
            stuck_busy: false,
            busy_after_transfer: false,
            last_speed: None,
        }
    }

    fn play(&mut self, transfer: &mut Transfer<'_>) {
        let mut event = WireEvent::StartSent;
        loop {
            let action = transfer.advance(event);
            event = match action {
                WireAction::SendAddress { .. } => WireEvent::AddressAcked,
                WireAction::SendByte(byte) => {
                    if transfer.phase() == TransferPhase::RegisterPhase {
                        self.pointer = byte;
                    } else {
                        self.registers[self.pointer as usize] = byte;
                        self.pointer = self.pointer.wrapping_add(1);
                    }
                    WireEvent::ByteSent
                }
                WireAction::RepeatedStart => WireEvent::StartSent,
                WireAction::ReceiveByte { .. } => {
                    let byte = self.registers[self.pointer as usize];
                    self.pointer = self.pointer.wrapping_add(1);
                    WireEvent::ByteReceived(byte)
                }
                WireAction::Finish(result) => {
                    handle_transfer_event(self.signal, result);
                    return;
                }
                WireAction::None => return,
            };
        }
    }
}

impl I2cPeripheral for MockPeripheral<'_> {
    fn init(&mut self) {
        self.log.borrow_mut().push(Call::HalInit);
    }

    fn enable(&mut self, config: &I2cConfig) {
        self.last_speed = Some(*config);
        self.log.borrow_mut().push(Call::HalEnable);
    }

    fn disable(&mut self) {
        self.busy_until_disable = false;
        self.log.borrow_mut().push(Call::HalDisable);
    }

    fn is_busy(&self) -> bool {
        self.stuck_busy || self.busy_until_disable
    }

    fn init_transfer(&mut self, _transfer: &Transfer<'_>) {
        self.log.borrow_mut().push(Call::InitTransfer);
    }

    fn start_transfer(&mut self, transfer: &mut Transfer<'_>) {
        self.log.borrow_mut().push(Call::StartTransfer);
        let response = self.script.pop_front().unwrap_or(self.fallback);
        match response {
            Response::Ack => self.play(transfer),
            Response::Nack => {
                transfer.advance(WireEvent::StartSent);
                if let WireAction::Finish(result) = transfer.advance(WireEvent::AddressNacked) {
                    handle_transfer_event(self.signal, result);
                }
            }
            Response::Error => {
                if let WireAction::Finish(result) = transfer.advance(WireEvent::BusError) {
                    handle_transfer_event(self.signal, result);
                }
            }
            Response::Silent => {}
        }
        if self.busy_after_transfer && response != Response::Silent {
            self.busy_until_disable = true;
            self.busy_after_transfer = false;
        }
    }

    fn abort_transfer(&mut self) {
        self.log.borrow_mut().push(Call::AbortTransfer);
    }
}

/// SCL/SDA pair whose SDA is released after a number of SCL pulses
pub struct MockPins {
    log: Log,
    pub mode: PinMode,
    pub pulses: u32,
    /// SDA reads high once this many pulses were clocked (`None`: stuck low)
    pub sda_release_after: Option<u32>,
}

impl MockPins {
    pub fn new(log: Log) -> Self {
        Self {
            log,
            mode: PinMode::Input,
            pulses: 0,
            sda_release_after: Some(0),
        }
    }
}

impl I2cPins for MockPins {
    fn set_mode(&mut self, mode: PinMode) {
        self.mode = mode;
        self.log.borrow_mut().push(Call::Pins(mode));
    }

    fn set_scl(&mut self, high: bool) {
        if !high {
            self.pulses += 1;
        }
        self.log.borrow_mut().push(Call::Scl(high));
    }

    fn sda_is_high(&self) -> bool {
        match self.sda_release_after {
            Some(pulses) => self.pulses >= pulses,
            None => false,
        }
    }
}

pub struct MockRail {
    log: Log,
    present: bool,
}

impl MockRail {
    pub fn new(log: Log, present: bool) -> Self {
        Self { log, present }
    }
}

impl RailControl for MockRail {
    fn is_present(&self) -> bool {
        self.present
    }

    fn init(&mut self) {
        self.log.borrow_mut().push(Call::RailInit);
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.log.borrow_mut().push(Call::Rail(enabled));
    }
}

/// Delay that returns immediately and records the requested time
pub struct MockDelay {
    log: Log,
    /// Never complete, so a waiting transfer stays pending
    pub hang: bool,
}

impl MockDelay {
    pub fn new(log: Log) -> Self {
        Self { log, hang: false }
    }

    async fn sleep(&mut self, ms: u32) {
        self.log.borrow_mut().push(Call::Delay(ms));
        if self.hang {
            core::future::pending::<()>().await;
        }
    }
}

impl DelayNs for MockDelay {
    async fn delay_ns(&mut self, ns: u32) {
        self.sleep(ns / 1_000_000).await
    }

    async fn delay_ms(&mut self, ms: u32) {
        self.sleep(ms).await
    }
}

pub type TestBus<'s> = I2cBus<'s, MockPeripheral<'s>, MockPins, MockRail, MockDelay>;

pub fn config(rail: bool) -> BusConfig {
    let config = BusConfig::new("i2c-test", PinConfig::new('B', 6), PinConfig::new('B', 9))
        .unwrap();
    if rail {
        config.with_rail(PinConfig::new('H', 0))
    } else {
        config
    }
}

/// Build a bus over fresh mocks
pub fn bus(signal: &TransferSignal, rail: bool) -> (TestBus<'_>, Log) {
    let log: Log = Rc::new(RefCell::new(Vec::new()));
    let bus = I2cBus::new(
        config(rail),
        MockPeripheral::new(log.clone(), signal),
        MockPins::new(log.clone()),
        MockRail::new(log.clone(), rail),
        MockDelay::new(log.clone()),
        signal,
    );
    (bus, log)
}

/// Total milliseconds slept between two log positions
pub fn delay_between(log: &Log, from: usize, to: usize) -> u32 {
    log.borrow()
        .iter()
        .take(to)
        .skip(from)
        .map(|c| match c {
            Call::Delay(ms) => *ms,
            _ => 0,
        })
        .sum()
}
