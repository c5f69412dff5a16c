//! Transaction engine
//!
//! Every read and write funnels into [`I2cBus::do_transfer`], which runs one
//! transaction to completion, timeout or NACK exhaustion.
//!
//! Some devices (the MFi coprocessor in particular) NACK their address for
//! hundreds of milliseconds while busy with an internal operation. Those
//! NACKs are not errors: the start condition is re-issued every couple of
//! milliseconds up to a fixed bound.

use core::ops::{Deref, DerefMut};

use embassy_futures::select::{select, Either};
use embedded_hal_async::delay::DelayNs;
use escapement_hal::{I2cPeripheral, I2cPins, RailControl, Transfer, TransferEvent};

use super::I2cBus;
use crate::error::TransferError;
use crate::slave::SlaveAddress;
use crate::stats::BusStats;

/// Poll interval while waiting for a busy bus to clear
const BUSY_POLL_MS: u32 = 1;

impl<'s, P, G, R, D> I2cBus<'s, P, G, R, D>
where
    P: I2cPeripheral,
    G: I2cPins,
    R: RailControl,
    D: DelayNs,
{
    /// Read one register
    pub async fn read_register(
        &mut self,
        address: SlaveAddress,
        register: u8,
    ) -> Result<u8, TransferError> {
        let mut value = [0u8; 1];
        self.read_register_block(address, register, &mut value)
            .await?;
        let [value] = value;
        Ok(value)
    }

    /// Read consecutive registers starting at `register`
    pub async fn read_register_block(
        &mut self,
        address: SlaveAddress,
        register: u8,
        buf: &mut [u8],
    ) -> Result<(), TransferError> {
        let mut transfer = Transfer::read(address.get(), Some(register), buf);
        self.do_transfer(&mut transfer).await
    }

    /// Read without a register address phase
    pub async fn read_block(
        &mut self,
        address: SlaveAddress,
        buf: &mut [u8],
    ) -> Result<(), TransferError> {
        let mut transfer = Transfer::read(address.get(), None, buf);
        self.do_transfer(&mut transfer).await
    }

    /// Write one register
    pub async fn write_register(
        &mut self,
        address: SlaveAddress,
        register: u8,
        value: u8,
    ) -> Result<(), TransferError> {
        self.write_register_block(address, register, &[value])
            .await
    }

    /// Write consecutive registers starting at `register`
    pub async fn write_register_block(
        &mut self,
        address: SlaveAddress,
        register: u8,
        data: &[u8],
    ) -> Result<(), TransferError> {
        let mut transfer = Transfer::write(address.get(), Some(register), data);
        self.do_transfer(&mut transfer).await
    }

    /// Write without a register address phase
    pub async fn write_block(
        &mut self,
        address: SlaveAddress,
        data: &[u8],
    ) -> Result<(), TransferError> {
        let mut transfer = Transfer::write(address.get(), None, data);
        self.do_transfer(&mut transfer).await
    }

    /// Run one transaction
    ///
    /// The bus must be acquired. A bus that is busy on entry is reset; if
    /// it stays busy the call fails and the caller has to escalate to
    /// [`bitbang_recovery`](Self::bitbang_recovery). A bus left busy after
    /// the transaction is reset before returning.
    pub async fn do_transfer(&mut self, transfer: &mut Transfer<'_>) -> Result<(), TransferError> {
        if self.user_count == 0 {
            #[cfg(feature = "defmt")]
            defmt::error!(
                "{=str}: transfer on a bus with no users",
                self.config.name.as_str()
            );
            BusStats::bump(&mut self.stats.misuse);
            return Err(TransferError::NotInUse);
        }

        if self.in_flight {
            // The future driving the previous transfer was leaked
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "{=str}: aborting abandoned transfer",
                self.config.name.as_str()
            );
            self.peripheral.abort_transfer();
            self.in_flight = false;
            BusStats::bump(&mut self.stats.aborts);
        }

        if self.peripheral.is_busy() {
            #[cfg(feature = "defmt")]
            defmt::warn!("{=str}: bus busy before transfer", self.config.name.as_str());
            self.reset().await;

            if !self.wait_until_idle().await {
                #[cfg(feature = "defmt")]
                defmt::error!(
                    "{=str}: bus still busy after reset",
                    self.config.name.as_str()
                );
                BusStats::bump(&mut self.stats.transfers_failed);
                return Err(TransferError::BusStuck);
            }
        }

        self.in_flight = true;
        let mut bus = AbortOnDrop { bus: &mut *self };
        bus.peripheral.init_transfer(transfer);
        bus.nack_count = 0;

        let result = bus.run_attempts(transfer).await;
        bus.defuse();

        if self.peripheral.is_busy() {
            #[cfg(feature = "defmt")]
            defmt::warn!(
                "{=str}: bus busy after transfer",
                self.config.name.as_str()
            );
            self.reset().await;
        }

        match result {
            Ok(()) => BusStats::bump(&mut self.stats.transfers_ok),
            Err(_) => BusStats::bump(&mut self.stats.transfers_failed),
        }
        result
    }

    /// Issue start conditions until the transfer completes, fails, times
    /// out or runs out of NACK retries
    async fn run_attempts(&mut self, transfer: &mut Transfer<'_>) -> Result<(), TransferError> {
        let timing = self.config.timing;

        loop {
            transfer.begin_attempt();
            self.events.reset();
            self.peripheral.start_transfer(transfer);

            match self.wait_for_event(timing.transfer_timeout_ms).await {
                Some(TransferEvent::TransferComplete) => return Ok(()),
                Some(TransferEvent::Error) => {
                    #[cfg(feature = "defmt")]
                    defmt::error!(
                        "{=str}: transfer to {=u8:#x} failed",
                        self.config.name.as_str(),
                        transfer.device_address()
                    );
                    return Err(TransferError::Hardware);
                }
                Some(TransferEvent::Nack) => {
                    self.nack_count = self.nack_count.saturating_add(1);
                    if self.nack_count < timing.nack_retry_limit {
                        #[cfg(feature = "defmt")]
                        defmt::trace!(
                            "{=str}: NACK {=u16}, retrying",
                            self.config.name.as_str(),
                            self.nack_count
                        );
                        BusStats::bump(&mut self.stats.nack_retries);
                        self.delay.delay_ms(timing.nack_retry_delay_ms).await;
                        continue;
                    }

                    transfer.abort();
                    self.peripheral.abort_transfer();
                    BusStats::bump(&mut self.stats.aborts);
                    #[cfg(feature = "defmt")]
                    defmt::error!(
                        "{=str}: {=u8:#x} NACKed {=u16} times, giving up",
                        self.config.name.as_str(),
                        transfer.device_address(),
                        self.nack_count
                    );
                    return Err(TransferError::NackLimit);
                }
                None => {
                    transfer.abort();
                    self.peripheral.abort_transfer();
                    BusStats::bump(&mut self.stats.aborts);
                    BusStats::bump(&mut self.stats.timeouts);
                    #[cfg(feature = "defmt")]
                    defmt::error!(
                        "{=str}: transfer to {=u8:#x} timed out",
                        self.config.name.as_str(),
                        transfer.device_address()
                    );
                    return Err(TransferError::Timeout);
                }
            }
        }
    }

    /// Wait for the interrupt to report, or `None` after `timeout_ms`
    async fn wait_for_event(&mut self, timeout_ms: u32) -> Option<TransferEvent> {
        let events = self.events;
        match select(events.wait(), self.delay.delay_ms(timeout_ms)).await {
            Either::First(event) => Some(event),
            Either::Second(()) => None,
        }
    }

    /// Poll the busy flag for up to `busy_clear_timeout_ms`
    async fn wait_until_idle(&mut self) -> bool {
        let mut waited = 0;
        while self.peripheral.is_busy() {
            if waited >= self.config.timing.busy_clear_timeout_ms {
                return false;
            }
            self.delay.delay_ms(BUSY_POLL_MS).await;
            waited += BUSY_POLL_MS;
        }
        true
    }
}

/// Aborts the running HAL transfer if the future driving it is dropped
///
/// The caller's buffer is only borrowed for the lifetime of that future, so
/// the peripheral must stop touching it before the borrow ends.
struct AbortOnDrop<'b, 's, P: I2cPeripheral, G, R, D> {
    bus: &'b mut I2cBus<'s, P, G, R, D>,
}

impl<P: I2cPeripheral, G, R, D> AbortOnDrop<'_, '_, P, G, R, D> {
    /// The transfer ran to an end; nothing is left to abort
    fn defuse(self) {
        self.bus.in_flight = false;
    }
}

impl<'s, P: I2cPeripheral, G, R, D> Deref for AbortOnDrop<'_, 's, P, G, R, D> {
    type Target = I2cBus<'s, P, G, R, D>;

    fn deref(&self) -> &Self::Target {
        self.bus
    }
}

impl<P: I2cPeripheral, G, R, D> DerefMut for AbortOnDrop<'_, '_, P, G, R, D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.bus
    }
}

impl<P: I2cPeripheral, G, R, D> Drop for AbortOnDrop<'_, '_, P, G, R, D> {
    fn drop(&mut self) {
        if !self.bus.in_flight {
            return;
        }

        #[cfg(feature = "defmt")]
        defmt::warn!(
            "{=str}: transfer cancelled, aborting",
            self.bus.config.name.as_str()
        );
        self.bus.peripheral.abort_transfer();
        self.bus.in_flight = false;
        BusStats::bump(&mut self.bus.stats.aborts);
    }
}
