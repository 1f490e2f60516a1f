//! Host stand-ins for the device environment
//!
//! The publisher consumes a monotonic tick counter and link-state
//! notifications from its environment. This module provides host
//! implementations of both.

pub mod clock;
pub mod link;

pub use clock::{SchedulerClock, TickSource, DEFAULT_TICK_HZ};
pub use link::{AlwaysUpProbe, LinkMonitor, LinkProbe, LinkStatus, TcpLinkProbe};
