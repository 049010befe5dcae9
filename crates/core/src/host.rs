//! Host stack model.
//!
//! The congestion engines never own a connection. The host TCP stack owns the
//! authoritative send-window state ([`TcpSock`]), delivers classified events and
//! lets the engine overwrite `snd_cwnd` / `snd_ssthresh`. This module holds that
//! shared state together with the standard Reno helpers every engine falls back on.

use serde::{Deserialize, Serialize};

/// Slow start threshold used before the first loss ("infinite").
pub const TCP_INFINITE_SSTHRESH: u32 = 0x7fff_ffff;

/// Initial congestion window (IW10).
pub const TCP_INIT_CWND: u32 = 10;

/// Bytes the host reserves per connection for congestion control private state.
pub const CA_PRIV_SIZE: usize = 104;

/// Congestion avoidance state as tracked by the host stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum CaState {
    /// Nothing bad has been observed recently.
    #[default]
    Open = 0,
    /// Dupacks or SACKs seen, still transmitting new data.
    Disorder = 1,
    /// cwnd reduced because of ECN or local congestion.
    Cwr = 2,
    /// Fast retransmit / fast recovery in progress.
    Recovery = 3,
    /// Retransmission timeout recovery.
    Loss = 4,
}

impl CaState {
    /// `true` while the host is reducing cwnd on its own (CWR or Recovery).
    pub fn in_cwnd_reduction(self) -> bool {
        matches!(self, CaState::Cwr | CaState::Recovery)
    }
}

/// Discrete window lifecycle events emitted by the host stack.
///
/// Connection establishment is not an event here; it is delivered through
/// `CongestionControl::on_connection_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CwndEvent {
    /// First transmission after the connection went idle.
    IdleRestart,
    /// cwnd restarted after idle (RFC 2861 window validation).
    CwndRestart,
    /// Congestion window reduction (CWR) finished.
    CompleteCwr,
    /// Retransmission timeout fired; the host entered loss recovery.
    Loss,
}

/// Classification of an incoming ACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckKind {
    /// Header prediction succeeded; `snd_una` advanced in order.
    FastPath,
    /// Anything else: dupacks, SACK processing, window updates.
    SlowPath,
}

/// RTT sample delivered after a group of packets has been acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RttSample {
    /// Number of packets newly acknowledged.
    pub pkts_acked: u32,
    /// Sampled RTT in microseconds, negative when no valid sample exists.
    pub rtt_us: i32,
}

impl RttSample {
    pub fn new(pkts_acked: u32, rtt_us: i32) -> Self {
        Self { pkts_acked, rtt_us }
    }

    /// The sampled RTT, or `None` when the host marked it invalid.
    pub fn rtt_us(&self) -> Option<u32> {
        u32::try_from(self.rtt_us).ok()
    }
}

/// `true` if sequence number `seq1` is after `seq2` (modular comparison).
#[inline]
pub fn after(seq1: u32, seq2: u32) -> bool {
    (seq2.wrapping_sub(seq1) as i32) < 0
}

/// `true` if sequence number `seq1` is before `seq2` (modular comparison).
#[inline]
pub fn before(seq1: u32, seq2: u32) -> bool {
    after(seq2, seq1)
}

/// Per-connection send state owned by the host stack.
///
/// Windows are counted in segments. Engines read every field and write only
/// `snd_cwnd`, `snd_cwnd_cnt` and `snd_ssthresh`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TcpSock {
    /// Congestion window (segments).
    pub snd_cwnd: u32,
    /// Linear increase counter used by additive increase.
    pub snd_cwnd_cnt: u32,
    /// Upper bound the host enforces on `snd_cwnd`.
    pub snd_cwnd_clamp: u32,
    /// Slow start threshold (segments).
    pub snd_ssthresh: u32,
    /// Next sequence number to send.
    pub snd_nxt: u32,
    /// First unacknowledged sequence number.
    pub snd_una: u32,
    /// Current effective segment size (bytes).
    pub mss_cache: u32,
    /// Advertised segment size (bytes).
    pub advmss: u32,
    /// Congestion avoidance state.
    pub ca_state: CaState,
    /// Whether the sender is currently limited by cwnd rather than the application.
    pub is_cwnd_limited: bool,
}

impl TcpSock {
    /// Fresh send state for a connection with the given segment size.
    pub fn new(mss: u32) -> Self {
        Self {
            snd_cwnd: TCP_INIT_CWND,
            snd_cwnd_cnt: 0,
            snd_cwnd_clamp: u32::MAX,
            snd_ssthresh: TCP_INFINITE_SSTHRESH,
            snd_nxt: 0,
            snd_una: 0,
            mss_cache: mss,
            advmss: mss,
            ca_state: CaState::Open,
            is_cwnd_limited: true,
        }
    }

    pub fn in_slow_start(&self) -> bool {
        self.snd_cwnd < self.snd_ssthresh
    }

    /// Exponential growth bounded by ssthresh.
    ///
    /// Returns the part of `acked` left over once ssthresh was reached, which
    /// the caller feeds into additive increase.
    pub fn slow_start(&mut self, acked: u32) -> u32 {
        let cwnd = self
            .snd_cwnd
            .saturating_add(acked)
            .min(self.snd_ssthresh)
            .max(self.snd_cwnd);
        let leftover = acked - (cwnd - self.snd_cwnd).min(acked);
        self.snd_cwnd = cwnd.min(self.snd_cwnd_clamp);
        leftover
    }

    /// Additive increase: one segment for every `w` segments acknowledged.
    pub fn cong_avoid_ai(&mut self, w: u32, acked: u32) {
        let w = w.max(1);
        if self.snd_cwnd_cnt >= w {
            self.snd_cwnd_cnt = 0;
            self.snd_cwnd = self.snd_cwnd.saturating_add(1);
        }

        self.snd_cwnd_cnt = self.snd_cwnd_cnt.saturating_add(acked);
        if self.snd_cwnd_cnt >= w {
            let delta = self.snd_cwnd_cnt / w;
            self.snd_cwnd_cnt -= delta * w;
            self.snd_cwnd = self.snd_cwnd.saturating_add(delta);
        }
        self.snd_cwnd = self.snd_cwnd.min(self.snd_cwnd_clamp);
    }

    /// Standard Reno per-ACK window growth.
    pub fn reno_cong_avoid(&mut self, acked: u32) {
        if !self.is_cwnd_limited {
            return;
        }

        let mut acked = acked;
        if self.in_slow_start() {
            acked = self.slow_start(acked);
            if acked == 0 {
                return;
            }
        }
        self.cong_avoid_ai(self.snd_cwnd, acked);
    }

    /// Reno loss-time threshold: half the window, at least two segments.
    pub fn reno_ssthresh(&self) -> u32 {
        (self.snd_cwnd >> 1).max(2)
    }

    /// The ssthresh the host would keep right now.
    ///
    /// While reducing the window the threshold is left alone, otherwise it is
    /// raised to three quarters of cwnd if that is larger.
    pub fn current_ssthresh(&self) -> u32 {
        if self.ca_state.in_cwnd_reduction() {
            self.snd_ssthresh
        } else {
            self.snd_ssthresh
                .max((self.snd_cwnd >> 1) + (self.snd_cwnd >> 2))
        }
    }
}

impl Default for TcpSock {
    fn default() -> Self {
        Self::new(1448)
    }
}
