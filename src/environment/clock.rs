//! Monotonic scheduler tick counter

use tokio::time::Instant;

/// Default scheduler frequency, ticks per second
pub const DEFAULT_TICK_HZ: u32 = 100;

/// Source of the monotonically increasing tick count
pub trait TickSource: Send {
    /// Ticks elapsed since boot
    fn ticks(&self) -> u64;
}

/// Tick counter derived from elapsed wall time since construction
///
/// Uses [`tokio::time::Instant`], so paused test time drives it too.
#[derive(Debug, Clone)]
pub struct SchedulerClock {
    boot: Instant,
    hz: u32,
}

impl SchedulerClock {
    pub fn new(hz: u32) -> Self {
        Self {
            boot: Instant::now(),
            hz: hz.max(1),
        }
    }

    pub fn hz(&self) -> u32 {
        self.hz
    }
}

impl Default for SchedulerClock {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_HZ)
    }
}

impl TickSource for SchedulerClock {
    fn ticks(&self) -> u64 {
        let elapsed = self.boot.elapsed();
        let ticks = elapsed.as_millis() * u128::from(self.hz) / 1000;
        u64::try_from(ticks).unwrap_or(u64::MAX)
    }
}
