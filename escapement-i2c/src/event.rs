//! Interrupt-to-task completion signal
//!
//! The peripheral interrupt reports exactly one [`TransferEvent`] per
//! transfer attempt. The slot holds a single value and a new event
//! overwrites an unread one; the engine clears it before every start
//! condition.

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

use escapement_hal::TransferEvent;

/// Completion slot shared between one bus and its interrupt handler
///
/// Declare one per physical bus as a `static`:
///
/// ```ignore
/// static I2C1_EVENTS: TransferSignal = TransferSignal::new();
/// ```
pub type TransferSignal = Signal<CriticalSectionRawMutex, TransferEvent>;

/// Record the outcome of the current transfer attempt
///
/// Called from interrupt context. Wakes the task waiting in the
/// transaction engine.
pub fn handle_transfer_event(signal: &TransferSignal, event: TransferEvent) {
    signal.signal(event);
}
