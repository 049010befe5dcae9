//! Bandwidth estimation from delivered bytes.
//!
//! Bytes acknowledged are accumulated over a sampling window at least one RTT
//! (and 50 ms) long. Each closed window yields a raw rate sample, fed through
//! two cascaded 7/8 low-pass filters.

use super::config::RTT_MIN_WINDOW;

/// `(7 * old + new) / 8`.
#[inline]
pub(crate) fn low_pass(old: u32, new: u32) -> u32 {
    ((7 * u64::from(old) + u64::from(new)) >> 3) as u32
}

/// Estimated bandwidth in bytes per tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandwidthEstimator {
    /// Bytes acknowledged in the current sampling window.
    pub(crate) bk: u32,
    /// First filter stage.
    pub(crate) bw_ns_est: u32,
    /// Published estimate.
    pub(crate) bw_est: u32,
    /// Tick at which the current sampling window opened.
    pub(crate) window_start: u32,
    /// Last `snd_una` seen.
    pub(crate) snd_una: u32,
    /// Bytes already credited by dupacks and not yet covered by a cumulative ACK.
    pub(crate) accounted: u32,
    /// The next ACK re-syncs `snd_una` before anything is counted.
    pub(crate) first_ack: bool,
}

impl BandwidthEstimator {
    pub fn new(now: u32, snd_una: u32) -> Self {
        Self {
            bk: 0,
            bw_ns_est: 0,
            bw_est: 0,
            window_start: now,
            snd_una,
            accounted: 0,
            first_ack: true,
        }
    }

    pub fn bw_est(&self) -> u32 {
        self.bw_est
    }

    /// Close the sampling window if it is long enough and fold its rate into the
    /// filters. Returns the new estimate if a window was closed.
    ///
    /// An `rtt` of zero means no RTT is known yet; nothing is sampled then.
    pub fn update_window(&mut self, now: u32, rtt: u32, snd_una: u32) -> Option<u32> {
        let delta = now.wrapping_sub(self.window_start);

        if self.first_ack {
            self.snd_una = snd_una;
            self.first_ack = false;
        }

        if rtt == 0 || delta <= rtt.max(RTT_MIN_WINDOW) {
            return None;
        }

        self.filter(delta);
        self.bk = 0;
        self.window_start = now;
        Some(self.bw_est)
    }

    /// `delta` is always non-zero: it exceeds the 50 ms window floor.
    fn filter(&mut self, delta: u32) {
        let sample = self.bk / delta;

        if self.bw_ns_est == 0 && self.bw_est == 0 {
            self.bw_ns_est = sample;
            self.bw_est = sample;
        } else {
            self.bw_ns_est = low_pass(self.bw_ns_est, sample);
            self.bw_est = low_pass(self.bw_est, self.bw_ns_est);
        }

        tracing::trace!(
            delta,
            bytes = self.bk,
            sample,
            bw_est = self.bw_est,
            "westwood: bandwidth window closed"
        );
    }

    /// In-order ACK: count exactly what `snd_una` advanced.
    pub fn on_fast_path(&mut self, snd_una: u32) {
        self.bk = self.bk.saturating_add(snd_una.wrapping_sub(self.snd_una));
        self.snd_una = snd_una;
    }

    /// Any other ACK: count acknowledged bytes with dupack accounting.
    pub fn on_slow_path(&mut self, snd_una: u32, mss: u32) {
        let acked = self.acked_count(snd_una, mss);
        self.bk = self.bk.saturating_add(acked);
    }

    /// Bytes an ACK acknowledged.
    ///
    /// A dupack does not move `snd_una` but means a segment left the network,
    /// so it counts one MSS and remembers it in `accounted`. A later cumulative
    /// ACK covering those segments is reduced by what was already counted.
    fn acked_count(&mut self, snd_una: u32, mss: u32) -> u32 {
        let mut cumul_ack = snd_una.wrapping_sub(self.snd_una);

        if cumul_ack == 0 {
            self.accounted = self.accounted.saturating_add(mss);
            cumul_ack = mss;
        }

        if cumul_ack > mss {
            // Partial or delayed ACK.
            if self.accounted >= cumul_ack {
                self.accounted -= cumul_ack;
                cumul_ack = mss;
            } else {
                cumul_ack -= self.accounted;
                self.accounted = 0;
            }
        }

        self.snd_una = snd_una;
        cumul_ack
    }

    /// Bandwidth-delay product in segments, never below two.
    pub fn bdp_segments(&self, rtt_min: u32, mss: u32) -> u32 {
        let bdp = u64::from(self.bw_est) * u64::from(rtt_min) / u64::from(mss.max(1));
        u32::try_from(bdp).unwrap_or(u32::MAX).max(2)
    }
}
