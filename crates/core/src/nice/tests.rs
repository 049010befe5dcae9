use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rstest::rstest;

use crate::congestion_control::DiagExtensions;
use crate::host::{CaState, CwndEvent, RttSample, TcpSock, TCP_INFINITE_SSTHRESH};

use super::config::NiceConfig;
use super::controller::NiceController;

const MSS: u32 = 1000;

// ============================================================================
// Deterministic ack-clock harness
// ============================================================================

/// Path model: a fixed propagation delay plus a queue that adds delay for
/// every segment in flight beyond the bandwidth-delay product.
#[derive(Debug, Clone, Copy)]
pub struct NetworkCondition {
    pub rtt: Duration,
    /// Jitter as (min_multiplier, max_multiplier).
    pub jitter: Option<(f64, f64)>,
    /// Segments the path holds without queuing.
    pub bdp_segments: u32,
    /// Extra delay per queued segment.
    pub queue_delay_per_segment: Duration,
}

impl NetworkCondition {
    /// 20ms RTT, 20 segment BDP, no jitter.
    pub const DATACENTER: Self = Self {
        rtt: Duration::from_millis(20),
        jitter: None,
        bdp_segments: 20,
        queue_delay_per_segment: Duration::from_millis(1),
    };

    /// 80ms RTT, 60 segment BDP, ±5% jitter.
    pub const CONTINENTAL: Self = Self {
        rtt: Duration::from_millis(80),
        jitter: Some((0.95, 1.05)),
        bdp_segments: 60,
        queue_delay_per_segment: Duration::from_millis(2),
    };
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessSnapshot {
    pub cwnd: u32,
    pub ssthresh: u32,
    pub fractional_window: u32,
    pub active: bool,
}

/// Drives a `NiceController` one round trip at a time: every segment in the
/// window is acknowledged with one RTT sample.
pub struct NiceTestHarness {
    tp: TcpSock,
    controller: NiceController,
    condition: NetworkCondition,
    rng: SmallRng,
}

impl NiceTestHarness {
    pub fn new(config: NiceConfig, condition: NetworkCondition, seed: u64) -> Self {
        let mut tp = TcpSock::new(MSS);
        tp.snd_cwnd_clamp = 1_000;
        let mut controller = NiceController::new(Arc::new(config));
        controller.on_connection_start(&tp);
        Self {
            tp,
            controller,
            condition,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn controller(&self) -> &NiceController {
        &self.controller
    }

    fn sample_rtt_us(&mut self, in_flight: u32) -> i32 {
        let queued = in_flight.saturating_sub(self.condition.bdp_segments);
        let rtt = self.condition.rtt + self.condition.queue_delay_per_segment * queued;
        let rtt_us = rtt.as_micros() as f64;
        let rtt_us = match self.condition.jitter {
            Some((min_mult, max_mult)) => rtt_us * self.rng.random_range(min_mult..=max_mult),
            None => rtt_us,
        };
        rtt_us as i32
    }

    /// Send a full window and acknowledge it segment by segment.
    pub fn step_round(&mut self) -> HarnessSnapshot {
        let segments = self.tp.snd_cwnd;
        self.tp.snd_nxt = self.tp.snd_nxt.wrapping_add(segments * MSS);

        if segments == 0 {
            // Withheld tick: nothing in flight, only the pacing clock advances.
            let ack = self.tp.snd_una;
            self.controller.on_ack_advance(&mut self.tp, ack, 0);
            return self.snapshot();
        }

        for _ in 0..segments {
            let rtt_us = self.sample_rtt_us(segments);
            self.controller.on_rtt_sample(RttSample::new(1, rtt_us));
            self.tp.snd_una = self.tp.snd_una.wrapping_add(MSS);
            let ack = self.tp.snd_una;
            self.controller.on_ack_advance(&mut self.tp, ack, 1);
        }
        self.snapshot()
    }

    pub fn run_rounds(&mut self, count: usize) -> Vec<HarnessSnapshot> {
        (0..count).map(|_| self.step_round()).collect()
    }

    pub fn snapshot(&self) -> HarnessSnapshot {
        HarnessSnapshot {
            cwnd: self.tp.snd_cwnd,
            ssthresh: self.tp.snd_ssthresh,
            fractional_window: self.controller.fractional_window(),
            active: self.controller.is_active(),
        }
    }
}

// ============================================================================
// Helpers for hand-driven rounds
// ============================================================================

fn controller_with(config: NiceConfig) -> NiceController {
    NiceController::new(Arc::new(config))
}

fn sock(cwnd: u32, ssthresh: u32) -> TcpSock {
    let mut tp = TcpSock::new(MSS);
    tp.snd_cwnd = cwnd;
    tp.snd_ssthresh = ssthresh;
    tp
}

/// Deliver `samples` RTT samples, then one ACK that closes the round.
fn close_round(controller: &mut NiceController, tp: &mut TcpSock, samples: &[i32]) {
    for rtt_us in samples {
        controller.on_rtt_sample(RttSample::new(1, *rtt_us));
    }
    let ack = tp.snd_nxt.wrapping_add(MSS);
    tp.snd_una = ack;
    tp.snd_nxt = ack.wrapping_add(10 * MSS);
    controller.on_ack_advance(tp, ack, 1);
}

// ============================================================================
// Round decisions
// ============================================================================

#[test_log::test]
fn test_round_within_bounds_leaves_window_unchanged() {
    let config = NiceConfig {
        alpha: 0,
        ..Default::default()
    };
    let mut controller = controller_with(config);
    let mut tp = sock(2, 2);
    controller.on_connection_start(&tp);

    close_round(&mut controller, &mut tp, &[999; 5]);

    assert_eq!(tp.snd_cwnd, 2);
    assert_eq!(controller.fractional_window(), 2);
    assert!(!tp.in_slow_start());
    assert_eq!(controller.stats().rounds, 1);
    assert_eq!(controller.stats().unreliable_rounds, 0);
}

#[test_log::test]
fn test_slow_start_exit_on_queuing_delay() {
    let mut controller = controller_with(NiceConfig::default());
    let mut tp = sock(20, TCP_INFINITE_SSTHRESH);
    controller.on_connection_start(&tp);

    // Round 1: no queuing, slow start continues.
    close_round(&mut controller, &mut tp, &[9_999; 3]);
    assert_eq!(tp.snd_cwnd, 21);
    assert_eq!(controller.base_rtt(), Some(10_000));

    // Round 2: RTT up by half, 10 packets queued.
    close_round(&mut controller, &mut tp, &[14_999; 4]);
    assert_eq!(tp.snd_cwnd, 15);
    assert_eq!(tp.snd_ssthresh, 14);
    assert!(!tp.in_slow_start());
    assert_eq!(controller.stats().slow_start_exits, 1);
}

#[test_log::test]
fn test_congestion_signals_halve_window() {
    let mut controller = controller_with(NiceConfig::default());
    let mut tp = sock(20, 10);
    controller.on_connection_start(&tp);

    close_round(&mut controller, &mut tp, &[9_999; 3]);
    assert_eq!(tp.snd_cwnd, 21, "no queuing: one step up");
    assert_eq!(tp.snd_ssthresh, 15);

    // Every sample sits well above the threshold point.
    close_round(&mut controller, &mut tp, &[29_999; 12]);
    assert_eq!(tp.snd_cwnd, 10);
    assert_eq!(controller.stats().multiplicative_decreases, 1);
    assert_eq!(controller.fractional_window(), 2);
}

#[test_log::test]
fn test_congestion_at_minimum_window_enters_fractional_mode() {
    let config = NiceConfig {
        alpha: 0,
        ..Default::default()
    };
    let mut controller = controller_with(config);
    let mut tp = sock(2, 2);
    controller.on_connection_start(&tp);

    close_round(&mut controller, &mut tp, &[9_999; 3]);
    close_round(&mut controller, &mut tp, &[29_999; 4]);

    assert_eq!(controller.fractional_window(), 8);
    assert_eq!(tp.snd_cwnd, 2);

    // The next ACK is a withheld pacing tick.
    let ack = tp.snd_una;
    controller.on_ack_advance(&mut tp, ack, 0);
    assert_eq!(tp.snd_cwnd, 0);
}

#[test_log::test]
fn test_queue_above_beta_steps_down_once() {
    let mut controller = controller_with(NiceConfig::default());
    let mut tp = sock(10, 5);
    controller.on_connection_start(&tp);

    close_round(&mut controller, &mut tp, &[9_999; 3]);
    assert_eq!(tp.snd_cwnd, 11);

    // diff = 11 * 4000 / 10000 = 4 > beta; three congestion signals are too few to halve.
    close_round(&mut controller, &mut tp, &[13_999; 3]);
    assert_eq!(tp.snd_cwnd, 10);
    assert_eq!(controller.stats().rate_decreases, 1);
}

/// Deliver `ticks` ACKs inside the current round; each is a withheld pacing tick.
fn withhold(controller: &mut NiceController, tp: &mut TcpSock, ticks: u32) {
    for _ in 0..ticks {
        let ack = tp.snd_una;
        controller.on_ack_advance(tp, ack, 0);
        assert_eq!(tp.snd_cwnd, 0, "withheld tick");
    }
}

#[test_log::test]
fn test_sub_unit_window_steps_by_two() {
    // Threshold 100 keeps the per-sample detector silent.
    let config = NiceConfig {
        threshold: 100,
        ..Default::default()
    };
    let mut controller = controller_with(config);
    let mut tp = sock(2, 2);
    tp.snd_nxt = 10 * MSS;
    controller.on_connection_start(&tp);
    controller.state.window.set_denominator(10);

    // No queuing: the rate goes up in the fractional regime.
    withhold(&mut controller, &mut tp, 10);
    close_round(&mut controller, &mut tp, &[9_999; 3]);
    assert_eq!(controller.fractional_window(), 8);
    assert_eq!(tp.snd_cwnd, 2, "round closed on a burst tick");
    assert_eq!(controller.stats().rate_increases, 1);

    // diff = 2 * 20000 / 10000 = 4 > beta: the rate goes down, ssthresh follows.
    withhold(&mut controller, &mut tp, 7);
    close_round(&mut controller, &mut tp, &[29_999; 3]);
    assert_eq!(controller.fractional_window(), 10);
    assert_eq!(tp.snd_cwnd, 2);
    assert_eq!(tp.snd_ssthresh, 2);
    assert!(!tp.in_slow_start());
    assert_eq!(controller.stats().rate_decreases, 1);
    assert_eq!(controller.stats().multiplicative_decreases, 0);
}

#[test_log::test]
fn test_fractional_decrease_capped_at_max_fwnd() {
    let config = NiceConfig {
        alpha: 0,
        max_fwnd: 20,
        ..Default::default()
    };
    let mut controller = controller_with(config);
    let mut tp = sock(2, 2);
    tp.snd_nxt = 10 * MSS;
    controller.on_connection_start(&tp);
    controller.state.window.set_denominator(8);

    withhold(&mut controller, &mut tp, 8);
    close_round(&mut controller, &mut tp, &[9_999; 3]);
    assert_eq!(controller.fractional_window(), 8);

    // Four signals exceed cwnd / 2; 8 * 4 is capped at 20.
    withhold(&mut controller, &mut tp, 7);
    close_round(&mut controller, &mut tp, &[29_999; 4]);
    assert_eq!(controller.fractional_window(), 20);
    assert_eq!(tp.snd_cwnd, 2);
    assert_eq!(controller.stats().multiplicative_decreases, 1);
}

#[test_log::test]
fn test_sparse_round_falls_back_to_reno() {
    let mut controller = controller_with(NiceConfig::default());
    let mut tp = sock(10, 5);
    controller.on_connection_start(&tp);

    close_round(&mut controller, &mut tp, &[9_999; 2]);

    assert_eq!(tp.snd_cwnd, 10);
    assert_eq!(tp.snd_cwnd_cnt, 1);
    assert_eq!(controller.stats().unreliable_rounds, 1);
}

#[rstest]
#[case::cwnd_limited(true)]
#[case::application_limited(false)]
fn test_repeated_round_without_samples_does_not_move_cwnd(#[case] cwnd_limited: bool) {
    let mut controller = controller_with(NiceConfig::default());
    let mut tp = sock(20, 10);
    tp.is_cwnd_limited = cwnd_limited;
    controller.on_connection_start(&tp);

    close_round(&mut controller, &mut tp, &[9_999; 3]);
    let cwnd = tp.snd_cwnd;

    close_round(&mut controller, &mut tp, &[]);
    close_round(&mut controller, &mut tp, &[]);

    assert_eq!(tp.snd_cwnd, cwnd);
}

// ============================================================================
// Sampling lifecycle
// ============================================================================

#[test]
fn test_invalid_rtt_sample_ignored() {
    let mut controller = controller_with(NiceConfig::default());
    let tp = sock(10, 5);
    controller.on_connection_start(&tp);

    controller.on_rtt_sample(RttSample::new(1, -1));
    assert_eq!(controller.base_rtt(), None);
    assert_eq!(controller.stats().round_samples, 0);
}

#[test]
fn test_zero_rtt_sample_is_offset() {
    let mut controller = controller_with(NiceConfig::default());
    let tp = sock(10, 5);
    controller.on_connection_start(&tp);

    controller.on_rtt_sample(RttSample::new(1, 0));
    assert_eq!(controller.base_rtt(), Some(1));
}

#[test]
fn test_state_change_toggles_sampling() {
    let mut controller = controller_with(NiceConfig::default());
    let mut tp = sock(10, 5);
    controller.on_connection_start(&tp);
    controller.on_rtt_sample(RttSample::new(1, 4_999));

    controller.on_state_change(&tp, CaState::Recovery);
    assert!(!controller.is_active());
    assert_eq!(controller.base_rtt(), Some(5_000), "history survives");

    tp.snd_nxt = 50 * MSS;
    controller.on_state_change(&tp, CaState::Open);
    assert!(controller.is_active());
    assert_eq!(controller.state.beg_snd_nxt, 50 * MSS);
    assert_eq!(controller.stats().round_samples, 0);
}

#[rstest]
#[case::idle_restart(CwndEvent::IdleRestart, true)]
#[case::cwnd_restart(CwndEvent::CwndRestart, true)]
#[case::complete_cwr(CwndEvent::CompleteCwr, false)]
#[case::loss(CwndEvent::Loss, false)]
fn test_restart_events_reset_state(#[case] event: CwndEvent, #[case] resets: bool) {
    let mut controller = controller_with(NiceConfig::default());
    let tp = sock(2, 2);
    controller.on_connection_start(&tp);
    controller.on_rtt_sample(RttSample::new(1, 9_999));
    controller.state.window.set_denominator(8);

    controller.on_cwnd_event(&tp, event);

    if resets {
        assert_eq!(controller.fractional_window(), 2);
        assert_eq!(controller.base_rtt(), None);
        assert!(controller.is_active());
    } else {
        assert_eq!(controller.fractional_window(), 8);
        assert_eq!(controller.base_rtt(), Some(10_000));
    }
}

#[test]
fn test_ssthresh_is_reno() {
    let controller = controller_with(NiceConfig::default());
    assert_eq!(controller.ssthresh(&sock(40, 100)), 20);
    assert_eq!(controller.ssthresh(&sock(3, 100)), 2);
}

#[rstest]
#[case::no_extension(DiagExtensions::empty(), false)]
#[case::vegas_info(DiagExtensions::VEGAS_INFO, true)]
#[case::other_bits(DiagExtensions::from_bits(0b1), false)]
fn test_info_only_on_vegas_extension(#[case] ext: DiagExtensions, #[case] expected: bool) {
    let mut controller = controller_with(NiceConfig::default());
    let tp = sock(10, 5);
    controller.on_connection_start(&tp);
    controller.on_rtt_sample(RttSample::new(1, 1_999));
    controller.on_rtt_sample(RttSample::new(1, 2_999));

    let info = controller.info(ext);
    assert_eq!(info.is_some(), expected);
    if let Some(info) = info {
        assert_eq!(info.enabled, 1);
        assert_eq!(info.rtt_cnt, 2);
        assert_eq!(info.rtt, 2_000);
        assert_eq!(info.min_rtt, 2_000);
    }
}

// ============================================================================
// Fractional window in the controller
// ============================================================================

#[test]
fn test_reno_growth_leaves_fractional_mode() {
    let mut controller = controller_with(NiceConfig::default());
    let mut tp = sock(0, 1);
    controller.on_connection_start(&tp);
    controller.on_state_change(&tp, CaState::Disorder);
    controller.state.window.set_denominator(4);

    // Pacing withholds (cwnd 0), then Reno adds one segment: 4 - 2 = 2.
    let ack = tp.snd_una;
    controller.on_ack_advance(&mut tp, ack, 1);
    assert_eq!(controller.fractional_window(), 2);
    assert_eq!(tp.snd_cwnd, 1);
}

proptest! {
    #[test]
    fn pacing_alternates_between_burst_and_silence(denominator in 3u32..=96, ticks in 50usize..300) {
        let mut controller = controller_with(NiceConfig::default());
        let mut tp = sock(2, 2);
        tp.is_cwnd_limited = false;
        controller.on_connection_start(&tp);
        controller.on_state_change(&tp, CaState::Loss);
        controller.state.window.set_denominator(denominator);

        for tick in 0..ticks {
            let ack = tp.snd_una;
            controller.on_ack_advance(&mut tp, ack, 1);
            let burst = tick > 0 && tick % denominator as usize == 0;
            prop_assert_eq!(tp.snd_cwnd, if burst { 2 } else { 0 }, "tick {}", tick);
        }
        prop_assert_eq!(controller.fractional_window(), denominator);
    }

    #[test]
    fn base_rtt_never_increases(samples in proptest::collection::vec(-10i32..200_000, 1..200)) {
        let mut controller = controller_with(NiceConfig::default());
        let tp = sock(10, 5);
        controller.on_connection_start(&tp);

        let mut last = u32::MAX;
        for rtt_us in samples {
            controller.on_rtt_sample(RttSample::new(1, rtt_us));
            if let Some(base) = controller.base_rtt() {
                prop_assert!(base <= last);
                last = base;
            }
        }
    }
}

// ============================================================================
// Harness runs
// ============================================================================

#[test_log::test]
fn test_harness_settles_near_bdp() {
    let mut harness = NiceTestHarness::new(NiceConfig::default(), NetworkCondition::DATACENTER, 1);
    let snapshots = harness.run_rounds(30);

    let stats = harness.controller().stats();
    assert!(stats.slow_start_exits >= 1);
    assert!(stats.rounds >= 29);

    let last = snapshots.last().unwrap();
    let bdp = NetworkCondition::DATACENTER.bdp_segments;
    assert!(
        last.cwnd <= 2 * bdp,
        "cwnd {} should stay near the BDP of {bdp}",
        last.cwnd
    );
    for snapshot in &snapshots {
        assert!(snapshot.ssthresh >= 2);
        assert!((2..=96).contains(&snapshot.fractional_window));
    }
}

#[test_log::test]
fn test_harness_determinism() {
    let run = |seed| {
        let mut harness =
            NiceTestHarness::new(NiceConfig::default(), NetworkCondition::CONTINENTAL, seed);
        harness.run_rounds(25)
    };

    assert_eq!(run(42), run(42));
}
