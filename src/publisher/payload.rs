//! Tick payload formatting

use std::fmt;

/// Minimum number of decimal digits in a published payload
pub const PAYLOAD_DIGITS: usize = 8;

/// Widest payload the counter can produce (`u32::MAX` has ten digits)
pub const MAX_PAYLOAD_DIGITS: usize = 10;

/// Decimal encoding of a scheduler tick count
///
/// The count is published as a 32-bit jiffies value, wrapping at
/// `u32::MAX`, zero-padded to [`PAYLOAD_DIGITS`] digits. Payloads are never
/// wider than [`MAX_PAYLOAD_DIGITS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickPayload(String);

impl TickPayload {
    pub fn new(ticks: u64) -> Self {
        let jiffies = (ticks & u64::from(u32::MAX)) as u32;
        TickPayload(format!("{jiffies:0width$}", width = PAYLOAD_DIGITS))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for TickPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
