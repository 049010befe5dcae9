//! TCP Nice controller.

use std::sync::Arc;

use static_assertions::const_assert;

use crate::congestion_control::{DiagExtensions, VegasInfo};
use crate::host::{after, CaState, CwndEvent, RttSample, TcpSock, CA_PRIV_SIZE};
use crate::rtt::RoundRttFilter;

use super::config::{NiceConfig, MIN_ROUND_SAMPLES};
use super::stats::NiceStats;
use super::window::FractionalWindow;

/// Per-connection private state. Must fit the host's congestion control slot.
#[derive(Debug, Clone)]
pub(crate) struct NiceState {
    /// Sequence number marking the end of the current round.
    pub(crate) beg_snd_nxt: u32,
    /// Making delay decisions this round.
    pub(crate) active: bool,
    pub(crate) rtt: RoundRttFilter,
    /// Per-sample congestion signals since the last decision.
    pub(crate) num_cong: u32,
    pub(crate) window: FractionalWindow,
}

const_assert!(std::mem::size_of::<NiceState>() <= CA_PRIV_SIZE);

impl NiceState {
    fn new() -> Self {
        Self {
            beg_snd_nxt: 0,
            active: false,
            rtt: RoundRttFilter::new(),
            num_cong: 0,
            window: FractionalWindow::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
struct Counters {
    rounds: u64,
    unreliable_rounds: u64,
    congestion_signals: u64,
    slow_start_exits: u64,
    multiplicative_decreases: u64,
    rate_decreases: u64,
    rate_increases: u64,
    restarts: u64,
}

/// TCP Nice: Vegas-style delay control that yields to foreground traffic and
/// can drop below one segment per round through a paced fractional window.
///
/// One instance per connection. The host calls it with exclusive access to the
/// connection, so every handler takes `&mut self`.
#[derive(Debug, Clone)]
pub struct NiceController {
    config: Arc<NiceConfig>,
    pub(crate) state: NiceState,
    counters: Counters,
}

impl NiceController {
    pub fn new(config: Arc<NiceConfig>) -> Self {
        Self {
            config,
            state: NiceState::new(),
            counters: Counters::default(),
        }
    }

    pub fn config(&self) -> &NiceConfig {
        &self.config
    }

    /// Reset everything, including the propagation delay estimate, and start
    /// sampling from the next round.
    pub fn on_connection_start(&mut self, tp: &TcpSock) {
        self.state.window = FractionalWindow::new();
        self.state.rtt.reset();
        self.counters.restarts += 1;
        self.enable(tp);
    }

    /// Arm sampling. The first decision happens once everything sent so far
    /// has been acknowledged.
    fn enable(&mut self, tp: &TcpSock) {
        self.state.active = true;
        self.state.beg_snd_nxt = tp.snd_nxt;
        self.state.rtt.restart_round();
    }

    fn disable(&mut self) {
        self.state.active = false;
    }

    pub fn on_state_change(&mut self, tp: &TcpSock, state: CaState) {
        if state == CaState::Open {
            self.enable(tp);
        } else {
            self.disable();
        }
    }

    pub fn on_cwnd_event(&mut self, tp: &TcpSock, event: CwndEvent) {
        if matches!(event, CwndEvent::IdleRestart | CwndEvent::CwndRestart) {
            tracing::debug!(?event, "nice: restart after idle, resetting state");
            self.on_connection_start(tp);
        }
    }

    /// Filter one RTT sample and raise a congestion signal when it sits above
    /// the weighted point between base and max RTT.
    pub fn on_rtt_sample(&mut self, sample: RttSample) {
        let Some(rtt_us) = sample.rtt_us() else {
            return;
        };

        // Never let a zero RTT reach the base estimate.
        let vrtt = rtt_us.saturating_add(1);
        self.state.rtt.on_sample(vrtt);

        let threshold = u64::from(self.config.threshold.min(100));
        let base = u64::from(self.state.rtt.raw_base_rtt());
        let max = u64::from(self.state.rtt.max_rtt());
        let limit = ((100 - threshold) * base + threshold * max) / 100;

        if u64::from(vrtt) > limit {
            self.state.num_cong = self.state.num_cong.saturating_add(1);
            self.counters.congestion_signals += 1;
        }
    }

    /// Per-ACK window decision.
    pub fn on_ack_advance(&mut self, tp: &mut TcpSock, ack: u32, acked: u32) {
        if let Some(cwnd) = self.state.window.pace() {
            tp.snd_cwnd = cwnd;
        }

        if !self.state.active {
            self.reno_fallback(tp, acked);
            return;
        }

        if after(ack, self.state.beg_snd_nxt) {
            self.state.beg_snd_nxt = tp.snd_nxt;
            self.counters.rounds += 1;

            let round = self.state.rtt.snapshot();
            match (self.state.rtt.base_rtt(), self.state.rtt.min_rtt()) {
                (Some(base_rtt), Some(min_rtt)) if round.samples >= MIN_ROUND_SAMPLES => {
                    self.delay_decision(tp, acked, base_rtt, min_rtt);
                }
                _ => {
                    // Only delayed ACKs seen this round; no usable delay signal.
                    tracing::trace!(samples = round.samples, "nice: unreliable round");
                    self.counters.unreliable_rounds += 1;
                    self.reno_fallback(tp, acked);
                }
            }

            self.state.rtt.finish_round();
            self.state.num_cong = 0;
        } else if tp.in_slow_start() {
            tp.slow_start(acked);
        }
    }

    /// Vegas-style decision for a completed round.
    fn delay_decision(&mut self, tp: &mut TcpSock, acked: u32, base_rtt: u32, rtt: u32) {
        let config = Arc::clone(&self.config);
        let cwnd = u64::from(tp.snd_cwnd);

        // Window that would keep exactly zero packets queued.
        let target_cwnd = cwnd * u64::from(base_rtt) / u64::from(rtt);
        // Packets we estimate are sitting in queues.
        let diff = cwnd * u64::from(rtt.saturating_sub(base_rtt)) / u64::from(base_rtt);

        tracing::trace!(
            cwnd = tp.snd_cwnd,
            base_rtt,
            rtt,
            diff,
            num_cong = self.state.num_cong,
            fractional_window = self.state.window.denominator(),
            "nice: round decision"
        );

        if diff > u64::from(config.gamma) && tp.in_slow_start() {
            let target = u32::try_from(target_cwnd.saturating_add(1)).unwrap_or(u32::MAX);
            let old_cwnd = tp.snd_cwnd;
            tp.snd_cwnd = tp.snd_cwnd.min(target);
            tp.snd_ssthresh = self.nice_ssthresh(tp);
            self.state.num_cong = 0;
            self.counters.slow_start_exits += 1;
            tracing::debug!(
                old_cwnd,
                new_cwnd = tp.snd_cwnd,
                ssthresh = tp.snd_ssthresh,
                diff,
                "nice: leaving slow start on queuing delay"
            );
        } else if tp.in_slow_start() {
            tp.slow_start(acked);
        } else if self.state.num_cong > tp.snd_cwnd / config.fraction_divisor() {
            if tp.snd_cwnd > 2 && !self.state.window.is_sub_unit() {
                tp.snd_cwnd /= 2;
            } else {
                self.state.window.multiplicative_decrease(config.max_fwnd);
            }
            tracing::debug!(
                num_cong = self.state.num_cong,
                cwnd = tp.snd_cwnd,
                fractional_window = self.state.window.denominator(),
                "nice: multiplicative decrease"
            );
            self.state.num_cong = 0;
            self.counters.multiplicative_decreases += 1;
        } else if diff > u64::from(config.beta) {
            if tp.snd_cwnd > 2 && !self.state.window.is_sub_unit() {
                tp.snd_cwnd -= 1;
            } else {
                self.state.window.slow_down(config.max_fwnd);
            }
            tp.snd_ssthresh = self.nice_ssthresh(tp);
            self.counters.rate_decreases += 1;
        } else if diff < u64::from(config.alpha) {
            if tp.snd_cwnd >= 2 && !self.state.window.is_sub_unit() {
                tp.snd_cwnd += 1;
            } else {
                self.state.window.speed_up();
            }
            self.counters.rate_increases += 1;
        }

        if tp.snd_cwnd < 2 && !self.state.window.is_sub_unit() {
            tp.snd_cwnd = 2;
        } else if tp.snd_cwnd > tp.snd_cwnd_clamp {
            tp.snd_cwnd = tp.snd_cwnd_clamp;
        }

        tp.snd_ssthresh = tp.current_ssthresh();
    }

    /// ssthresh just below the current window, never under two segments.
    fn nice_ssthresh(&self, tp: &TcpSock) -> u32 {
        let ssthresh = match tp.snd_cwnd.checked_sub(1) {
            Some(below) => tp.snd_ssthresh.min(below),
            None => tp.snd_ssthresh,
        };
        ssthresh.max(2)
    }

    /// Reno growth for ACKs that carry no delay decision.
    fn reno_fallback(&mut self, tp: &mut TcpSock, acked: u32) {
        let denominator = self.state.window.denominator();
        if tp.snd_cwnd <= 2 && (2..=self.config.max_fwnd).contains(&denominator) {
            self.reno_fractional(tp, acked);
        } else {
            tp.reno_cong_avoid(acked);
        }
    }

    /// Run Reno, then move its cwnd change into the fractional window while
    /// the window is still sub-unit.
    fn reno_fractional(&mut self, tp: &mut TcpSock, acked: u32) {
        let cwnd = tp.snd_cwnd;
        let cwnd_cnt = tp.snd_cwnd_cnt;

        tp.reno_cong_avoid(acked);

        if self.state.window.absorb_cwnd_change(cwnd, tp.snd_cwnd) {
            tp.snd_cwnd = cwnd;
            tp.snd_cwnd_cnt = cwnd_cnt;
        }
    }

    pub fn ssthresh(&self, tp: &TcpSock) -> u32 {
        tp.reno_ssthresh()
    }

    pub fn info(&self, ext: DiagExtensions) -> Option<VegasInfo> {
        ext.requests_vegas_info().then(|| VegasInfo {
            enabled: u32::from(self.state.active),
            rtt_cnt: self.state.rtt.samples(),
            rtt: self.state.rtt.raw_base_rtt(),
            min_rtt: self.state.rtt.raw_min_rtt(),
        })
    }

    pub fn is_active(&self) -> bool {
        self.state.active
    }

    pub fn fractional_window(&self) -> u32 {
        self.state.window.denominator()
    }

    pub fn base_rtt(&self) -> Option<u32> {
        self.state.rtt.base_rtt()
    }

    pub fn stats(&self) -> NiceStats {
        NiceStats {
            active: self.state.active,
            fractional_window: self.state.window.denominator(),
            base_rtt_us: self.state.rtt.base_rtt(),
            round_samples: self.state.rtt.samples(),
            rounds: self.counters.rounds,
            unreliable_rounds: self.counters.unreliable_rounds,
            congestion_signals: self.counters.congestion_signals,
            slow_start_exits: self.counters.slow_start_exits,
            multiplicative_decreases: self.counters.multiplicative_decreases,
            rate_decreases: self.counters.rate_decreases,
            rate_increases: self.counters.rate_increases,
            restarts: self.counters.restarts,
        }
    }
}
