//! Time abstraction for the bandwidth estimator.
//!
//! Westwood+LP measures delivered bytes against a tick clock. The engines never
//! read the wall clock directly; they go through a [`TimeSource`] so tests can
//! drive them with [`VirtualTime`] deterministically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Clock ticks per second. One tick is one millisecond.
pub const HZ: u32 = 1000;

/// Abstraction over the clock the engines sample.
pub trait TimeSource: Send + Sync + Clone + 'static {
    /// Returns the current time as nanoseconds since an arbitrary epoch.
    fn now_nanos(&self) -> u64;

    /// Returns the current time as a Duration since an arbitrary epoch.
    fn now(&self) -> Duration {
        Duration::from_nanos(self.now_nanos())
    }

    /// Current time in ticks, wrapping like a 32-bit jiffies counter.
    fn now_ticks(&self) -> u32 {
        (self.now_nanos() / (1_000_000_000 / HZ as u64)) as u32
    }
}

/// Microseconds to ticks, rounding up so that a non-zero RTT never becomes zero.
pub fn usecs_to_ticks(us: u32) -> u32 {
    let us_per_tick = 1_000_000 / HZ;
    us.div_ceil(us_per_tick)
}

/// Ticks to microseconds.
pub fn ticks_to_usecs(ticks: u32) -> u32 {
    ticks.saturating_mul(1_000_000 / HZ)
}

/// Monotonic wall clock.
#[derive(Clone)]
pub struct RealTime {
    epoch: std::time::Instant,
}

impl Default for RealTime {
    fn default() -> Self {
        Self::new()
    }
}

impl RealTime {
    pub fn new() -> Self {
        Self {
            epoch: std::time::Instant::now(),
        }
    }
}

impl TimeSource for RealTime {
    fn now_nanos(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }
}

impl std::fmt::Debug for RealTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealTime")
            .field("elapsed", &self.epoch.elapsed())
            .finish()
    }
}

/// Manually advanced clock for deterministic tests and simulations.
///
/// Clones share the same underlying time, so a harness can keep one handle and
/// give another to the controller under test.
#[derive(Clone, Default)]
pub struct VirtualTime {
    current_nanos: Arc<AtomicU64>,
}

impl VirtualTime {
    /// Creates a new virtual time starting at 0.
    pub fn new() -> Self {
        Self::with_initial_time(0)
    }

    /// Creates a new virtual time starting at the given nanoseconds.
    pub fn with_initial_time(initial_nanos: u64) -> Self {
        Self {
            current_nanos: Arc::new(AtomicU64::new(initial_nanos)),
        }
    }

    /// Advances time by the given duration.
    pub fn advance(&self, duration: Duration) {
        self.current_nanos
            .fetch_add(duration.as_nanos() as u64, Ordering::SeqCst);
    }

    /// Advances time to the given absolute nanoseconds. Moving backwards is ignored.
    pub fn advance_to(&self, target_nanos: u64) {
        self.current_nanos.fetch_max(target_nanos, Ordering::SeqCst);
    }
}

impl TimeSource for VirtualTime {
    fn now_nanos(&self) -> u64 {
        self.current_nanos.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for VirtualTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VirtualTime({}ns)", self.now_nanos())
    }
}
