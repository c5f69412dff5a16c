//! Transaction descriptor and wire sequencing
//!
//! A [`Transfer`] is built immediately before each read or write, lives for
//! exactly one call and borrows the caller's buffer. It also carries the
//! per-transaction state machine that an interrupt handler steps through:
//!
//! ```text
//! Idle ─▶ AddressPhase ─▶ RegisterPhase ─▶ RepeatedStart ─▶ DataPhase ─▶ Complete
//!            │  ▲              (reads with a register only)       │
//!            └──┘ NACK: retry                                      └──▶ Error
//! any phase ─▶ Aborted (timeout or retry exhaustion)
//! ```

use crate::i2c::TransferEvent;

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Device to host
    Read,
    /// Host to device
    Write,
}

/// Where a transaction currently is on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferPhase {
    /// Not started, or waiting for a retried start after a NACK
    Idle,
    /// Start condition issued, device address being sent
    AddressPhase,
    /// Register address byte being sent
    RegisterPhase,
    /// Repeated start issued after the register byte of a read
    RepeatedStart,
    /// Data bytes moving
    DataPhase,
    /// All bytes moved, stop issued
    Complete,
    /// Bus or protocol error
    Error,
    /// Abandoned by the engine
    Aborted,
}

impl TransferPhase {
    /// Check if the transaction can make no further progress
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferPhase::Complete | TransferPhase::Error | TransferPhase::Aborted
        )
    }
}

/// Hardware conditions reported by the peripheral's interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WireEvent {
    /// A start (or repeated start) condition went out
    StartSent,
    /// The address byte was acknowledged
    AddressAcked,
    /// The address byte was not acknowledged
    AddressNacked,
    /// An outgoing byte was acknowledged
    ByteSent,
    /// An outgoing byte was not acknowledged
    ByteNacked,
    /// An incoming byte is available
    ByteReceived(u8),
    /// Bus error or arbitration loss
    BusError,
}

/// What the interrupt handler should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WireAction {
    /// Put the address byte on the wire
    SendAddress {
        /// 7-bit device address
        address: u8,
        /// R/W bit
        read: bool,
    },
    /// Put a data or register byte on the wire
    SendByte(u8),
    /// Issue a repeated start condition
    RepeatedStart,
    /// Clock in one byte; `last` means NACK it and stop afterwards
    ReceiveByte {
        /// This is the final byte of the read
        last: bool,
    },
    /// Issue a stop condition and report the event to the waiting task
    Finish(TransferEvent),
    /// Nothing to do (event arrived after the transaction ended)
    None,
}

enum Buffer<'a> {
    Read(&'a mut [u8]),
    Write(&'a [u8]),
}

/// One read or write transaction against a single device
pub struct Transfer<'a> {
    device_address: u8,
    register_address: Option<u8>,
    buffer: Buffer<'a>,
    idx: usize,
    phase: TransferPhase,
}

impl<'a> Transfer<'a> {
    /// Create a read transaction
    ///
    /// With a register address the wire sequence is
    /// `S addr+W reg Sr addr+R data... P`; without one it goes straight to
    /// `S addr+R data... P`.
    pub fn read(device_address: u8, register_address: Option<u8>, buf: &'a mut [u8]) -> Self {
        Self {
            device_address,
            register_address,
            buffer: Buffer::Read(buf),
            idx: 0,
            phase: TransferPhase::Idle,
        }
    }

    /// Create a write transaction
    pub fn write(device_address: u8, register_address: Option<u8>, data: &'a [u8]) -> Self {
        Self {
            device_address,
            register_address,
            buffer: Buffer::Write(data),
            idx: 0,
            phase: TransferPhase::Idle,
        }
    }

    /// Transfer direction
    pub fn direction(&self) -> Direction {
        match self.buffer {
            Buffer::Read(_) => Direction::Read,
            Buffer::Write(_) => Direction::Write,
        }
    }

    /// 7-bit device address
    pub fn device_address(&self) -> u8 {
        self.device_address
    }

    /// Register address, if one is sent before the data phase
    pub fn register_address(&self) -> Option<u8> {
        self.register_address
    }

    /// Total number of data bytes
    pub fn size(&self) -> usize {
        match &self.buffer {
            Buffer::Read(buf) => buf.len(),
            Buffer::Write(data) => data.len(),
        }
    }

    /// Number of data bytes moved so far
    pub fn idx(&self) -> usize {
        self.idx
    }

    /// Current wire phase
    pub fn phase(&self) -> TransferPhase {
        self.phase
    }

    /// Rewind for a new start condition
    ///
    /// Called before every attempt, including retries after a NACK.
    pub fn begin_attempt(&mut self) {
        self.idx = 0;
        self.phase = TransferPhase::AddressPhase;
    }

    /// Mark the transaction as abandoned
    pub fn abort(&mut self) {
        self.phase = TransferPhase::Aborted;
    }

    /// Step the wire state machine with a hardware event
    pub fn advance(&mut self, event: WireEvent) -> WireAction {
        use TransferPhase::*;
        use WireEvent::*;

        if self.phase.is_terminal() {
            return WireAction::None;
        }

        match (self.phase, event) {
            (_, BusError) => self.fail(),

            (AddressPhase, StartSent) => WireAction::SendAddress {
                address: self.device_address,
                read: self.direction() == Direction::Read && self.register_address.is_none(),
            },
            (AddressPhase, AddressNacked) => {
                // Busy device; the engine decides whether to retry
                self.phase = Idle;
                WireAction::Finish(TransferEvent::Nack)
            }
            (AddressPhase, AddressAcked) => match self.register_address {
                Some(reg) => {
                    self.phase = RegisterPhase;
                    WireAction::SendByte(reg)
                }
                None => self.enter_data_phase(),
            },

            (RegisterPhase, ByteSent) => match self.direction() {
                Direction::Read => {
                    self.phase = RepeatedStart;
                    WireAction::RepeatedStart
                }
                Direction::Write => self.enter_data_phase(),
            },

            (RepeatedStart, StartSent) => WireAction::SendAddress {
                address: self.device_address,
                read: true,
            },
            (RepeatedStart, AddressAcked) => self.enter_data_phase(),

            (DataPhase, ByteSent) => {
                self.idx = self.idx.saturating_add(1);
                self.next_write()
            }
            (DataPhase, ByteReceived(byte)) => self.store(byte),

            _ => self.fail(),
        }
    }

    fn enter_data_phase(&mut self) -> WireAction {
        self.phase = TransferPhase::DataPhase;
        match self.direction() {
            Direction::Write => self.next_write(),
            Direction::Read => self.next_read(),
        }
    }

    fn next_write(&mut self) -> WireAction {
        let next = match &self.buffer {
            Buffer::Write(data) => data.get(self.idx).copied(),
            Buffer::Read(_) => return self.fail(),
        };
        match next {
            Some(byte) => WireAction::SendByte(byte),
            None => self.complete(),
        }
    }

    fn next_read(&mut self) -> WireAction {
        let size = self.size();
        if self.idx < size {
            WireAction::ReceiveByte {
                last: self.idx.saturating_add(1) == size,
            }
        } else {
            self.complete()
        }
    }

    fn store(&mut self, byte: u8) -> WireAction {
        match &mut self.buffer {
            Buffer::Read(buf) => {
                if let Some(slot) = buf.get_mut(self.idx) {
                    *slot = byte;
                    self.idx = self.idx.saturating_add(1);
                }
                self.next_read()
            }
            Buffer::Write(_) => self.fail(),
        }
    }

    fn complete(&mut self) -> WireAction {
        self.phase = TransferPhase::Complete;
        WireAction::Finish(TransferEvent::TransferComplete)
    }

    fn fail(&mut self) -> WireAction {
        self.phase = TransferPhase::Error;
        WireAction::Finish(TransferEvent::Error)
    }
}
