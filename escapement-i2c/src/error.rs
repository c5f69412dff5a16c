//! Error types

use core::fmt;

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};

/// Why a transaction failed
///
/// Callers only need to tell success from failure; the variants exist for
/// logs and for deciding whether to escalate to a reset or bus-clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferError {
    /// The bus has no users; the caller forgot to acquire it
    NotInUse,
    /// The peripheral stayed busy through a reset
    BusStuck,
    /// The device NACKed its address on every allowed retry
    NackLimit,
    /// No completion event within the transfer timeout
    Timeout,
    /// Bus error, arbitration loss or data-phase NACK
    Hardware,
}

impl embedded_hal::i2c::Error for TransferError {
    fn kind(&self) -> ErrorKind {
        match self {
            TransferError::NackLimit => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address),
            TransferError::Hardware => ErrorKind::Bus,
            TransferError::NotInUse | TransferError::BusStuck | TransferError::Timeout => {
                ErrorKind::Other
            }
        }
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            TransferError::NotInUse => "bus not in use",
            TransferError::BusStuck => "bus stuck busy",
            TransferError::NackLimit => "device kept NACKing its address",
            TransferError::Timeout => "transfer timed out",
            TransferError::Hardware => "bus error",
        };
        f.write_str(msg)
    }
}

/// Invalid bus configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Bus name is empty
    EmptyName,
    /// Bus name exceeds [`MAX_NAME_LEN`](crate::config::MAX_NAME_LEN)
    NameTooLong,
    /// SCL and SDA are the same pin
    PinConflict,
    /// A timing field that must be non-zero is zero
    InvalidTiming(&'static str),
    /// `rail_pin` disagrees with the rail control handed to the bus
    RailMismatch,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyName => f.write_str("bus name is empty"),
            ConfigError::NameTooLong => f.write_str("bus name is too long"),
            ConfigError::PinConflict => f.write_str("SCL and SDA share a pin"),
            ConfigError::InvalidTiming(field) => write!(f, "{} must be non-zero", field),
            ConfigError::RailMismatch => f.write_str("rail pin does not match rail control"),
        }
    }
}
