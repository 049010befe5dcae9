//! Delay envelope and early window reduction threshold.
//!
//! Westwood+LP remembers the spread of RTTs seen since the last early window
//! reduction (`delay_min`..`delay_max`), a long-run average of that spread, and
//! the RTT at which losses used to happen (`delay_loss`). The further current
//! conditions are from both, the smaller the queue it tolerates.

use serde::Serialize;

use super::config::DELAY_UNSET;

/// `3/4 old + 1/4 new`, kept scaled by 4.
///
/// An average of 0 or 1 has never been updated and is seeded with `sample << 2`.
pub fn update_delay(sample: u32, avg: u32) -> u32 {
    if avg > DELAY_UNSET {
        (avg - (avg >> 2)).saturating_add(sample)
    } else {
        sample.saturating_mul(4)
    }
}

/// `100 - 100 * part / whole`, saturated to `0..=100`. A zero `whole` is 100.
fn percent_remaining(part: u32, whole: u32) -> u64 {
    if whole == 0 {
        return 100;
    }
    100u64.saturating_sub(100 * u64::from(part) / u64::from(whole))
}

/// Which envelope the threshold was computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EnvelopeSource {
    /// Averages folded at past early window reductions.
    LongRunAverage,
    /// The raw envelope, before any reduction happened.
    RawEnvelope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EwrThreshold {
    /// Queue length, in segments, above which the window is reduced.
    pub value: u32,
    pub source: EnvelopeSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DelayEnvelope {
    pub(crate) delay_min: u32,
    pub(crate) delay_max: u32,
    /// `delay_min` average, scaled by 4.
    pub(crate) dmin_avg: u32,
    /// `delay_max` average, scaled by 4.
    pub(crate) dmax_avg: u32,
    /// RTT at loss, scaled by 4.
    pub(crate) delay_loss: u32,
}

impl DelayEnvelope {
    pub fn new() -> Self {
        Self {
            delay_loss: DELAY_UNSET,
            ..Default::default()
        }
    }

    pub fn delay_min(&self) -> u32 {
        self.delay_min
    }

    pub fn delay_max(&self) -> u32 {
        self.delay_max
    }

    pub fn delay_loss(&self) -> u32 {
        self.delay_loss
    }

    /// Widen the envelope to cover `rtt`, seeding it on the first sample.
    pub fn observe(&mut self, rtt: u32) {
        if self.delay_min == 0 && self.delay_max == 0 {
            self.delay_min = rtt;
            self.delay_max = rtt;
        }

        if rtt > self.delay_max {
            self.delay_max = rtt;
        } else if rtt < self.delay_min {
            self.delay_min = rtt;
        }
    }

    pub fn on_loss(&mut self, rtt: u32) {
        self.delay_loss = update_delay(rtt, self.delay_loss);
    }

    /// Fold the envelope into the long-run averages and restart it at `rtt`.
    pub fn fold(&mut self, rtt: u32) {
        self.dmin_avg = update_delay(self.delay_min, self.dmin_avg);
        self.dmax_avg = update_delay(self.delay_max, self.dmax_avg);
        self.delay_min = rtt;
        self.delay_max = rtt;
    }

    /// Queue length tolerated before an early window reduction.
    ///
    /// `None` until an envelope of non-zero width exists. The raw envelope is
    /// only trusted outside slow start.
    pub fn ewr_threshold(&self, beta: u32, rtt: u32, in_slow_start: bool) -> Option<EwrThreshold> {
        let (low, high, source) = if self.dmin_avg != self.dmax_avg && self.dmax_avg != 0 {
            (self.dmin_avg, self.dmax_avg, EnvelopeSource::LongRunAverage)
        } else if self.delay_min != self.delay_max && self.delay_max != 0 && !in_slow_start {
            (self.delay_min, self.delay_max, EnvelopeSource::RawEnvelope)
        } else {
            return None;
        };

        // Current RTT only counts once a loss has been seen.
        let rtt = if self.delay_loss > DELAY_UNSET { rtt } else { 0 };
        let loss_term = percent_remaining(rtt.saturating_mul(4), self.delay_loss);
        let spread_term = percent_remaining(low, high);

        let value = u64::from(beta) * loss_term / 100 * spread_term / 100;
        Some(EwrThreshold {
            value: u32::try_from(value).unwrap_or(u32::MAX),
            source,
        })
    }
}
