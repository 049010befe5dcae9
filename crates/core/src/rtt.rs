//! Per-round RTT tracking.
//!
//! Delay-based engines decide once per round trip. Within a round they min- and
//! max-filter the RTT samples they receive; across the whole connection they keep
//! the smallest RTT ever seen as the propagation delay estimate (`base_rtt`).

use serde::Serialize;

/// Sentinel meaning "no RTT observed yet".
pub const RTT_UNSET: u32 = 0x7fff_ffff;

/// Statistics for the round that just finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RoundSnapshot {
    /// Smallest RTT ever observed.
    pub base_rtt: u32,
    /// Smallest RTT observed this round.
    pub min_rtt: u32,
    /// Largest RTT observed this round.
    pub max_rtt: u32,
    /// Number of samples taken this round.
    pub samples: u32,
}

/// Min/max RTT filter over the current round plus a lifetime minimum.
///
/// RTT values are in whatever unit the owning engine samples in; the filter only
/// compares them. A zero sample is never stored: callers offset raw samples so a
/// zero RTT cannot later reach a divisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundRttFilter {
    base_rtt: u32,
    min_rtt: u32,
    max_rtt: u32,
    cnt_rtt: u32,
}

impl Default for RoundRttFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl RoundRttFilter {
    pub fn new() -> Self {
        Self {
            base_rtt: RTT_UNSET,
            min_rtt: RTT_UNSET,
            max_rtt: 0,
            cnt_rtt: 0,
        }
    }

    /// Forget everything, including the propagation delay estimate.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Record one RTT sample.
    ///
    /// The first sample of a round seeds `max_rtt` to twice the base RTT so a
    /// single sample does not collapse the max/min spread to zero.
    pub fn on_sample(&mut self, rtt: u32) {
        if rtt == 0 {
            return;
        }

        if rtt < self.base_rtt {
            self.base_rtt = rtt;
        }

        if self.cnt_rtt == 0 {
            self.max_rtt = self.base_rtt.saturating_mul(2);
        }

        self.min_rtt = self.min_rtt.min(rtt);
        self.max_rtt = self.max_rtt.max(rtt);
        self.cnt_rtt = self.cnt_rtt.saturating_add(1);
    }

    /// Start sampling a fresh round without clearing the previous maximum.
    pub fn restart_round(&mut self) {
        self.cnt_rtt = 0;
        self.min_rtt = RTT_UNSET;
    }

    /// Snapshot the round that just completed and clear it for the next one.
    pub fn finish_round(&mut self) -> RoundSnapshot {
        let snapshot = self.snapshot();
        self.cnt_rtt = 0;
        self.min_rtt = RTT_UNSET;
        self.max_rtt = 0;
        snapshot
    }

    pub fn snapshot(&self) -> RoundSnapshot {
        RoundSnapshot {
            base_rtt: self.base_rtt,
            min_rtt: self.min_rtt,
            max_rtt: self.max_rtt,
            samples: self.cnt_rtt,
        }
    }

    /// Propagation delay estimate, `None` until a sample arrived.
    pub fn base_rtt(&self) -> Option<u32> {
        (self.base_rtt != RTT_UNSET).then_some(self.base_rtt)
    }

    /// Minimum RTT of the current round, `None` if the round has no samples.
    pub fn min_rtt(&self) -> Option<u32> {
        (self.min_rtt != RTT_UNSET).then_some(self.min_rtt)
    }

    pub fn max_rtt(&self) -> u32 {
        self.max_rtt
    }

    pub fn samples(&self) -> u32 {
        self.cnt_rtt
    }

    /// Raw base RTT including the unset sentinel, as exported in diagnostics.
    pub(crate) fn raw_base_rtt(&self) -> u32 {
        self.base_rtt
    }

    /// Raw round minimum including the unset sentinel.
    pub(crate) fn raw_min_rtt(&self) -> u32 {
        self.min_rtt
    }
}
