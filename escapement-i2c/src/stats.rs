//! Bus diagnostic counters

/// Running counters for one bus
///
/// All counters saturate instead of wrapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusStats {
    /// Transfers that completed
    pub transfers_ok: u32,
    /// Transfers that returned an error
    pub transfers_failed: u32,
    /// Start conditions re-issued after a busy NACK
    pub nack_retries: u32,
    /// Attempts that saw no completion event in time
    pub timeouts: u32,
    /// Transfers aborted at the peripheral
    pub aborts: u32,
    /// Bus resets (explicit or automatic)
    pub resets: u32,
    /// Bit-banged recoveries attempted
    pub recoveries: u32,
    /// Bit-banged recoveries that freed SDA
    pub recoveries_ok: u32,
    /// Calls on a bus nobody has acquired
    pub misuse: u32,
}

impl BusStats {
    pub(crate) fn bump(counter: &mut u32) {
        *counter = counter.saturating_add(1);
    }
}
