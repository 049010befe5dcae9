//! Westwood+LP controller.

use std::sync::Arc;

use static_assertions::const_assert;

use crate::congestion_control::{DiagExtensions, VegasInfo};
use crate::host::{AckKind, CwndEvent, RttSample, TcpSock, CA_PRIV_SIZE};
use crate::time::{ticks_to_usecs, usecs_to_ticks, RealTime, TimeSource, HZ};

use super::bandwidth::BandwidthEstimator;
use super::config::{WestwoodConfig, INIT_RTT};
use super::delay::DelayEnvelope;
use super::stats::WestwoodStats;

/// Per-connection private state. Must fit the host's congestion control slot.
#[derive(Debug, Clone)]
pub(crate) struct WestwoodState {
    pub(crate) bw: BandwidthEstimator,
    pub(crate) delay: DelayEnvelope,
    /// Last RTT sample (ticks).
    pub(crate) rtt: u32,
    /// Minimum RTT (ticks).
    pub(crate) rtt_min: u32,
    /// Take the next RTT as the new minimum (set after a loss).
    pub(crate) reset_rtt_min: bool,
}

const_assert!(std::mem::size_of::<WestwoodState>() <= CA_PRIV_SIZE);

impl WestwoodState {
    fn new(now: u32, snd_una: u32) -> Self {
        Self {
            bw: BandwidthEstimator::new(now, snd_una),
            delay: DelayEnvelope::new(),
            rtt: INIT_RTT,
            rtt_min: INIT_RTT,
            reset_rtt_min: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Counters {
    bandwidth_windows: u64,
    early_reductions: u64,
    losses: u64,
    cwr_completions: u64,
    restarts: u64,
}

/// Westwood+LP: bandwidth-estimating Reno that sets the window to the measured
/// bandwidth-delay product after congestion, and cuts it there early when the
/// delay envelope says the queue is growing.
///
/// One instance per connection; handlers take `&mut self`.
pub struct WestwoodController<T: TimeSource = RealTime> {
    config: Arc<WestwoodConfig>,
    time_source: T,
    pub(crate) state: WestwoodState,
    counters: Counters,
}

impl WestwoodController<RealTime> {
    pub fn new(config: Arc<WestwoodConfig>) -> Self {
        Self::new_with_time_source(config, RealTime::new())
    }
}

impl<T: TimeSource> WestwoodController<T> {
    pub fn new_with_time_source(config: Arc<WestwoodConfig>, time_source: T) -> Self {
        let now = time_source.now_ticks();
        Self {
            config,
            time_source,
            state: WestwoodState::new(now, 0),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &WestwoodConfig {
        &self.config
    }

    pub fn on_connection_start(&mut self, tp: &TcpSock) {
        self.state = WestwoodState::new(self.time_source.now_ticks(), tp.snd_una);
        self.counters.restarts += 1;
    }

    /// Keep the latest RTT in ticks. Invalid and zero samples are dropped.
    pub fn on_rtt_sample(&mut self, sample: RttSample) {
        if let Some(rtt_us) = sample.rtt_us().filter(|us| *us > 0) {
            self.state.rtt = usecs_to_ticks(rtt_us);
        }
    }

    pub fn on_ack_event(&mut self, tp: &TcpSock, kind: AckKind) {
        self.update_window(tp);

        match kind {
            AckKind::FastPath => {
                self.state.bw.on_fast_path(tp.snd_una);
                self.update_rtt_min();
            }
            AckKind::SlowPath => {
                self.state.bw.on_slow_path(tp.snd_una, tp.mss_cache);
                self.update_rtt_min();
                // The placeholder RTT is not a measurement.
                if self.state.rtt != INIT_RTT {
                    self.state.delay.observe(self.state.rtt);
                }
            }
        }
    }

    fn update_window(&mut self, tp: &TcpSock) {
        let now = self.time_source.now_ticks();
        if self
            .state
            .bw
            .update_window(now, self.state.rtt, tp.snd_una)
            .is_some()
        {
            self.counters.bandwidth_windows += 1;
        }
    }

    fn update_rtt_min(&mut self) {
        if self.state.reset_rtt_min {
            self.state.rtt_min = self.state.rtt;
            self.state.reset_rtt_min = false;
        } else {
            self.state.rtt_min = self.state.rtt_min.min(self.state.rtt);
        }
    }

    /// Bandwidth-delay product in segments, at least 2.
    pub fn bw_rttmin(&self, tp: &TcpSock) -> u32 {
        self.state.bw.bdp_segments(self.state.rtt_min, tp.mss_cache)
    }

    /// Congestion avoidance: early window reduction when the estimated queue
    /// exceeds the delay-derived threshold, Reno otherwise.
    pub fn on_congestion_avoid(&mut self, tp: &mut TcpSock, acked: u32) {
        let threshold =
            self.state
                .delay
                .ewr_threshold(self.config.beta, self.state.rtt, tp.in_slow_start());

        if let Some(threshold) = threshold {
            let bdp = u64::from(self.state.bw.bw_est()) * u64::from(self.state.rtt_min)
                / u64::from(tp.advmss.max(1));
            let queue = u64::from(tp.snd_cwnd).saturating_sub(bdp);

            if queue > u64::from(threshold.value) {
                let old_cwnd = tp.snd_cwnd;
                let target = self.bw_rttmin(tp);
                tp.snd_cwnd = target.min(tp.snd_cwnd_clamp);
                tp.snd_ssthresh = target;
                self.state.delay.fold(self.state.rtt);
                self.counters.early_reductions += 1;

                tracing::debug!(
                    old_cwnd,
                    new_cwnd = tp.snd_cwnd,
                    queue,
                    threshold = threshold.value,
                    source = ?threshold.source,
                    "westwood: early window reduction"
                );
                return;
            }
        }

        tp.reno_cong_avoid(acked);
    }

    pub fn on_cwnd_event(&mut self, tp: &mut TcpSock, event: CwndEvent) {
        match event {
            CwndEvent::CompleteCwr => {
                let target = self.bw_rttmin(tp);
                tp.snd_cwnd = target.min(tp.snd_cwnd_clamp);
                tp.snd_ssthresh = target;
                self.counters.cwr_completions += 1;
                tracing::debug!(cwnd = tp.snd_cwnd, "westwood: CWR complete");
            }
            CwndEvent::Loss => {
                tp.snd_ssthresh = self.bw_rttmin(tp);
                self.state.delay.on_loss(self.state.rtt);
                // RTTs right after a timeout include retransmission delay.
                self.state.reset_rtt_min = true;
                self.counters.losses += 1;
                tracing::debug!(
                    ssthresh = tp.snd_ssthresh,
                    rtt = self.state.rtt,
                    delay_loss = self.state.delay.delay_loss(),
                    "westwood: loss"
                );
            }
            CwndEvent::IdleRestart | CwndEvent::CwndRestart => {}
        }
    }

    pub fn ssthresh(&self, tp: &TcpSock) -> u32 {
        tp.reno_ssthresh()
    }

    pub fn info(&self, ext: DiagExtensions) -> Option<VegasInfo> {
        ext.requests_vegas_info().then(|| VegasInfo {
            enabled: 1,
            rtt_cnt: 0,
            rtt: ticks_to_usecs(self.state.rtt),
            min_rtt: ticks_to_usecs(self.state.rtt_min),
        })
    }

    /// Filtered bandwidth in bytes per tick.
    pub fn bw_est(&self) -> u32 {
        self.state.bw.bw_est()
    }

    pub fn rtt_min(&self) -> u32 {
        self.state.rtt_min
    }

    pub fn delay_loss(&self) -> u32 {
        self.state.delay.delay_loss()
    }

    pub fn stats(&self) -> WestwoodStats {
        WestwoodStats {
            bw_est: u64::from(self.state.bw.bw_est()) * u64::from(HZ),
            rtt_us: ticks_to_usecs(self.state.rtt),
            rtt_min_us: ticks_to_usecs(self.state.rtt_min),
            delay_min: self.state.delay.delay_min(),
            delay_max: self.state.delay.delay_max(),
            delay_loss: self.state.delay.delay_loss(),
            bandwidth_windows: self.counters.bandwidth_windows,
            early_reductions: self.counters.early_reductions,
            losses: self.counters.losses,
            cwr_completions: self.counters.cwr_completions,
            restarts: self.counters.restarts,
        }
    }
}

impl<T: TimeSource> std::fmt::Debug for WestwoodController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WestwoodController")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
