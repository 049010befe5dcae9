//! TCP Nice statistics and telemetry.

use serde::Serialize;

/// TCP Nice statistics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NiceStats {
    /// Whether per-round delay decisions are currently being made.
    pub active: bool,
    /// Current fractional window denominator (2 = full window).
    pub fractional_window: u32,
    /// Propagation delay estimate in microseconds (offset by one).
    pub base_rtt_us: Option<u32>,
    /// RTT samples collected in the round in progress.
    pub round_samples: u32,
    /// Rounds completed while sampling.
    pub rounds: u64,
    /// Rounds with too few samples for a delay decision.
    pub unreliable_rounds: u64,
    /// Per-sample congestion signals observed.
    pub congestion_signals: u64,
    /// Times slow start was left on queuing delay.
    pub slow_start_exits: u64,
    /// Confirmed congestion responses (cwnd halved or fractional window quadrupled).
    pub multiplicative_decreases: u64,
    /// Rounds that lowered the rate by one step.
    pub rate_decreases: u64,
    /// Rounds that raised the rate by one step.
    pub rate_increases: u64,
    /// Full resets from connection start or a restart event.
    pub restarts: u64,
}
