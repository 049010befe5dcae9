//! Fractional congestion window.
//!
//! Nice can run below one segment per round trip. The integer `snd_cwnd` owned
//! by the host cannot express that, so the sub-unit rate is held separately as a
//! denominator: with denominator `d > 2` the sender gets a burst of two segments
//! once every `d` pacing ticks, an average of `2 / d` segments per tick. With
//! `d == 2` pacing is off and `snd_cwnd` alone describes the window.

use super::config::UNIT_FRACTION;

/// Denominator of the fractional window plus its pacing timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FractionalWindow {
    denominator: u32,
    timer: u32,
}

impl Default for FractionalWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl FractionalWindow {
    pub fn new() -> Self {
        Self {
            denominator: UNIT_FRACTION,
            timer: 0,
        }
    }

    pub fn denominator(&self) -> u32 {
        self.denominator
    }

    /// `true` while the window is below one full window of two segments.
    pub fn is_sub_unit(&self) -> bool {
        self.denominator > UNIT_FRACTION
    }

    /// Advance the pacing timer by one tick.
    ///
    /// Returns the cwnd the host must use for this tick: `2` on a burst tick,
    /// `0` while withholding, or `None` when pacing is off.
    pub fn pace(&mut self) -> Option<u32> {
        if !self.is_sub_unit() {
            return None;
        }

        if self.timer >= self.denominator {
            self.timer = 1;
            Some(UNIT_FRACTION)
        } else {
            self.timer += 1;
            Some(0)
        }
    }

    /// Convert a Reno cwnd change into the fractional representation.
    ///
    /// One segment of cwnd growth is worth two denominator units. Returns `true`
    /// if the window is still sub-unit afterwards, in which case the caller must
    /// restore the integer cwnd Reno just changed. Otherwise the denominator is
    /// pinned at 2 and Reno's integer cwnd stands.
    pub fn absorb_cwnd_change(&mut self, cwnd_before: u32, cwnd_after: u32) -> bool {
        let change = cwnd_delta_in_fraction_units(cwnd_before, cwnd_after);
        let denominator = i64::from(self.denominator) - change;

        if denominator > i64::from(UNIT_FRACTION) {
            self.denominator = u32::try_from(denominator).unwrap_or(u32::MAX);
            true
        } else {
            self.denominator = UNIT_FRACTION;
            false
        }
    }

    /// Throttle harder after confirmed congestion: quadruple the denominator.
    pub fn multiplicative_decrease(&mut self, max_fwnd: u32) {
        self.denominator = self.denominator.saturating_mul(4).min(max_fwnd);
    }

    /// Slightly lower the rate.
    pub fn slow_down(&mut self, max_fwnd: u32) {
        self.denominator = self.denominator.saturating_add(2).min(max_fwnd);
    }

    /// Slightly raise the rate, never past a full window.
    pub fn speed_up(&mut self) {
        self.denominator = self.denominator.saturating_sub(2).max(UNIT_FRACTION);
    }

    #[cfg(test)]
    pub(crate) fn set_denominator(&mut self, denominator: u32) {
        self.denominator = denominator.max(UNIT_FRACTION);
    }
}

/// Integer cwnd change expressed in denominator units (two per segment).
pub fn cwnd_delta_in_fraction_units(cwnd_before: u32, cwnd_after: u32) -> i64 {
    2 * (i64::from(cwnd_after) - i64::from(cwnd_before))
}
