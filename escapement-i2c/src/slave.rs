//! Slave ports
//!
//! A [`SlavePort`] binds a 7-bit device address to a shared bus. Board code
//! defines one per device; drivers only ever see their port.
//!
//! ```ignore
//! static BUS: StaticCell<SharedBus<'static, CriticalSectionRawMutex, ...>> = StaticCell::new();
//!
//! let bus = BUS.init(Mutex::new(I2cBus::new(config, i2c2, pins, rail, delay, &I2C2_EVENTS)));
//! let codec = SlavePort::new(bus, SlaveAddress::new(0x1A));
//! let mfi = SlavePort::new(bus, SlaveAddress::new(0x11));
//!
//! codec.acquire().await;
//! let id = codec.read_register(0x00).await;
//! codec.release().await;
//! ```

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::mutex::Mutex;
use embedded_hal_async::delay::DelayNs;
use escapement_hal::{I2cPeripheral, I2cPins, RailControl};

use crate::bus::I2cBus;
use crate::error::TransferError;
use crate::recovery::{RecoveryAction, RecoveryState};

/// A bus shared between the ports on it
pub type SharedBus<'s, M, P, G, R, D> = Mutex<M, I2cBus<'s, P, G, R, D>>;

/// 7-bit I2C device address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlaveAddress(u8);

impl SlaveAddress {
    /// Largest 7-bit address
    pub const MAX: u8 = 0x7F;

    /// Create an address for a static board table
    ///
    /// # Panics
    /// If `address` does not fit in 7 bits. Board tables are fixed at build
    /// time, so this is a firmware defect rather than a runtime condition.
    pub const fn new(address: u8) -> Self {
        assert!(address <= Self::MAX, "I2C address must be 7-bit");
        Self(address)
    }

    /// Create an address from a runtime value
    pub const fn try_new(address: u8) -> Option<Self> {
        if address <= Self::MAX {
            Some(Self(address))
        } else {
            None
        }
    }

    /// Raw 7-bit address
    pub const fn get(self) -> u8 {
        self.0
    }
}

/// One device on a shared bus
pub struct SlavePort<'b, M: RawMutex, B> {
    bus: &'b Mutex<M, B>,
    address: SlaveAddress,
}

impl<M: RawMutex, B> Clone for SlavePort<'_, M, B> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<M: RawMutex, B> Copy for SlavePort<'_, M, B> {}

impl<'b, M: RawMutex, B> SlavePort<'b, M, B> {
    /// Bind a device address to a bus
    pub const fn new(bus: &'b Mutex<M, B>, address: SlaveAddress) -> Self {
        Self { bus, address }
    }

    /// Device address
    pub fn address(&self) -> SlaveAddress {
        self.address
    }

    /// The bus this port lives on
    pub fn bus(&self) -> &'b Mutex<M, B> {
        self.bus
    }
}

impl<'b, 's, M, P, G, R, D> SlavePort<'b, M, I2cBus<'s, P, G, R, D>>
where
    M: RawMutex,
    P: I2cPeripheral,
    G: I2cPins,
    R: RailControl,
    D: DelayNs,
{
    /// Start using the bus; powers it up if this is the first user
    pub async fn acquire(&self) {
        self.bus.lock().await.acquire().await
    }

    /// Stop using the bus; powers it down if this was the last user
    pub async fn release(&self) {
        self.bus.lock().await.release()
    }

    /// Re-initialize the bus after the device stopped responding
    pub async fn reset(&self) {
        self.bus.lock().await.reset().await
    }

    /// Clock the bus free if the device is holding SDA low
    pub async fn bitbang_recovery(&self) -> bool {
        self.bus.lock().await.bitbang_recovery().await
    }

    /// Read one register
    pub async fn read_register(&self, register: u8) -> Result<u8, TransferError> {
        self.bus
            .lock()
            .await
            .read_register(self.address, register)
            .await
    }

    /// Read consecutive registers starting at `register`
    pub async fn read_register_block(
        &self,
        register: u8,
        buf: &mut [u8],
    ) -> Result<(), TransferError> {
        self.bus
            .lock()
            .await
            .read_register_block(self.address, register, buf)
            .await
    }

    /// Read without a register address phase
    pub async fn read_block(&self, buf: &mut [u8]) -> Result<(), TransferError> {
        self.bus.lock().await.read_block(self.address, buf).await
    }

    /// Write one register
    pub async fn write_register(&self, register: u8, value: u8) -> Result<(), TransferError> {
        self.bus
            .lock()
            .await
            .write_register(self.address, register, value)
            .await
    }

    /// Write consecutive registers starting at `register`
    pub async fn write_register_block(
        &self,
        register: u8,
        data: &[u8],
    ) -> Result<(), TransferError> {
        self.bus
            .lock()
            .await
            .write_register_block(self.address, register, data)
            .await
    }

    /// Write without a register address phase
    pub async fn write_block(&self, data: &[u8]) -> Result<(), TransferError> {
        self.bus.lock().await.write_block(self.address, data).await
    }

    /// Carry out the recovery step `state` recommended after a transfer
    ///
    /// The outcome of a bus clear is fed back into `state`, so a bus that
    /// could not be clocked free moves straight to
    /// [`Failed`](RecoveryState::Failed). Returns `false` when the step
    /// itself failed or the device has been given up on.
    pub async fn recover(&self, state: &mut RecoveryState, action: RecoveryAction) -> bool {
        match action {
            RecoveryAction::None => true,
            RecoveryAction::Reset => {
                self.reset().await;
                true
            }
            RecoveryAction::Bitbang => {
                let recovered = self.bitbang_recovery().await;
                state.on_bitbang_result(recovered);
                recovered
            }
            RecoveryAction::GiveUp => false,
        }
    }
}
