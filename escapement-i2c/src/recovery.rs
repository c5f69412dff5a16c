//! Caller-side recovery escalation
//!
//! The transaction engine resets a bus it finds busy but never goes further
//! on its own. A driver that keeps failing should escalate: first a bus
//! reset, then a bit-banged bus clear, then give up and report the device
//! as unavailable.
//!
//! # Usage Pattern
//!
//! ```rust,ignore
//! let mut recovery = RecoveryState::new();
//!
//! loop {
//!     let result = port.read_register_block(REG_SAMPLES, &mut buf).await;
//!     let action = recovery.on_result(&result);
//!     if !port.recover(&mut recovery, action).await {
//!         return Err(SensorError::Unavailable);
//!     }
//!     // ...
//! }
//! ```

/// Next step a driver should take after a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecoveryAction {
    /// Nothing; the last transfer succeeded
    None,
    /// Reset the bus
    Reset,
    /// Clock the bus free by hand
    Bitbang,
    /// Stop talking to the device
    GiveUp,
}

/// Failure escalation for one device
///
/// The `failures` count saturates at [`u8::MAX`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecoveryState {
    /// Transfers are succeeding
    Healthy,
    /// A reset was recommended after a failure
    ResetIssued {
        /// Consecutive failed transfers
        failures: u8,
    },
    /// A bus clear was recommended because failures persisted after a reset
    BitbangIssued {
        /// Consecutive failed transfers
        failures: u8,
    },
    /// Recovery is exhausted
    Failed {
        /// Consecutive failed transfers
        failures: u8,
    },
}

impl RecoveryState {
    /// Create a new state machine in the [`Healthy`][Self::Healthy] state
    pub fn new() -> Self {
        Self::Healthy
    }

    /// Returns `true` if the last transfer succeeded
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Consecutive failures since the last success
    pub fn failures(&self) -> u8 {
        match self {
            Self::Healthy => 0,
            Self::ResetIssued { failures }
            | Self::BitbangIssued { failures }
            | Self::Failed { failures } => *failures,
        }
    }

    /// Update after every transfer and get the recommended action
    pub fn on_result<T, E>(&mut self, result: &Result<T, E>) -> RecoveryAction {
        if result.is_ok() {
            *self = Self::Healthy;
            return RecoveryAction::None;
        }

        let failures = self.failures().saturating_add(1);
        let (next, action) = match self {
            Self::Healthy => (Self::ResetIssued { failures }, RecoveryAction::Reset),
            Self::ResetIssued { .. } => (Self::BitbangIssued { failures }, RecoveryAction::Bitbang),
            Self::BitbangIssued { .. } | Self::Failed { .. } => {
                (Self::Failed { failures }, RecoveryAction::GiveUp)
            }
        };
        *self = next;
        action
    }

    /// Report the outcome of a bus clear
    ///
    /// A bus that could not be clocked free is not worth another attempt.
    /// [`SlavePort::recover`](crate::SlavePort::recover) calls this itself.
    pub fn on_bitbang_result(&mut self, recovered: bool) {
        if !recovered {
            *self = Self::Failed {
                failures: self.failures(),
            };
        }
    }
}

impl Default for RecoveryState {
    fn default() -> Self {
        Self::new()
    }
}
