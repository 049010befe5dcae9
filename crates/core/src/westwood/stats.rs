//! Westwood+LP statistics and telemetry.

use serde::Serialize;

/// Westwood+LP statistics snapshot.
///
/// Times are in microseconds, except the delay envelope which stays in clock
/// ticks as the controller keeps it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WestwoodStats {
    /// Filtered bandwidth estimate (bytes per second).
    pub bw_est: u64,
    /// Last RTT sample.
    pub rtt_us: u32,
    /// Minimum RTT since the last loss.
    pub rtt_min_us: u32,
    /// Smallest RTT since the last early window reduction (ticks).
    pub delay_min: u32,
    /// Largest RTT since the last early window reduction (ticks).
    pub delay_max: u32,
    /// Filtered RTT at loss, scaled by 4 (ticks). 1 when no loss was seen.
    pub delay_loss: u32,
    /// Bandwidth sampling windows closed.
    pub bandwidth_windows: u64,
    /// Windows cut to the bandwidth-delay product before any loss.
    pub early_reductions: u64,
    /// Loss events handled.
    pub losses: u64,
    /// CWR completions handled.
    pub cwr_completions: u64,
    /// Full resets from connection start.
    pub restarts: u64,
}
