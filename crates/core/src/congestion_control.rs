//! Congestion control interface towards the host stack.
//!
//! The host owns the connection and its [`TcpSock`]. It calls one engine per
//! connection with classified events; the engine updates its private state
//! and may overwrite `snd_cwnd` / `snd_ssthresh`.
//!
//! ## Design
//!
//! The design uses enum dispatch rather than trait objects since all algorithm
//! types are known at compile time. This provides:
//! - No vtable indirection on the per-ACK path
//! - Full access to algorithm-specific statistics via pattern matching
//! - Type-safe configuration
//!
//! ## Supported Algorithms
//!
//! - **Nice** (default): Vegas-derived background transport that can back off
//!   below one segment per round trip.
//! - **Westwood+LP**: bandwidth-estimating Reno with early window reduction.
//!
//! ## Usage
//!
//! ```ignore
//! use tcp_background::{CongestionControl, CongestionControlConfig, RttSample, TcpSock};
//!
//! let config = CongestionControlConfig::from_toml_str("algorithm = \"nice\"")?;
//! let mut controller = config.build();
//! let mut tp = TcpSock::new(1448);
//!
//! controller.on_connection_start(&tp);
//! controller.on_rtt_sample(RttSample::new(1, 20_000));
//! let ack = tp.snd_una;
//! controller.on_ack_advance(&mut tp, ack, 1);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;
use crate::host::{AckKind, CaState, CwndEvent, RttSample, TcpSock};
use crate::nice::NiceController;
use crate::time::{RealTime, TimeSource};
use crate::westwood::WestwoodController;

// =============================================================================
// Algorithm Identification
// =============================================================================

/// Identifies the congestion control algorithm in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum CongestionControlAlgorithm {
    /// TCP Nice.
    ///
    /// Delay-based background transport: yields to foreground flows as soon as
    /// queuing delay builds up.
    #[default]
    Nice,

    /// Westwood+ with the low-priority early window reduction.
    #[serde(alias = "westwood")]
    WestwoodLp,
}

impl fmt::Display for CongestionControlAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CongestionControlAlgorithm::Nice => write!(f, "Nice"),
            CongestionControlAlgorithm::WestwoodLp => write!(f, "Westwood+LP"),
        }
    }
}

impl FromStr for CongestionControlAlgorithm {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nice" => Ok(Self::Nice),
            "westwoodlp" | "westwood+lp" | "westwood" => Ok(Self::WestwoodLp),
            _ => Err(ConfigError::UnknownAlgorithm(s.to_string())),
        }
    }
}

// =============================================================================
// Diagnostics
// =============================================================================

/// Diagnostic extension number of the Vegas-style info record.
pub const INET_DIAG_VEGASINFO: u32 = 3;

/// Set of diagnostic extensions requested by the caller, as a bitmask where
/// extension `n` is bit `n - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DiagExtensions(u32);

impl DiagExtensions {
    pub const VEGAS_INFO: Self = Self(1 << (INET_DIAG_VEGASINFO - 1));

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub fn requests_vegas_info(self) -> bool {
        self.0 & Self::VEGAS_INFO.0 != 0
    }
}

/// Fixed-field diagnostic record. RTTs are in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct VegasInfo {
    /// 1 while the engine is making delay decisions.
    pub enabled: u32,
    /// RTT samples in the current round.
    pub rtt_cnt: u32,
    /// Base RTT (Nice) or latest RTT (Westwood+LP).
    pub rtt: u32,
    /// Minimum RTT.
    pub min_rtt: u32,
}

// =============================================================================
// Algorithm-Agnostic Statistics
// =============================================================================

/// Algorithm-agnostic congestion control statistics.
///
/// For algorithm-specific statistics, pattern match on the `CongestionController`
/// enum to access the native stats type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CongestionControlStats {
    /// Algorithm identifier.
    pub algorithm: CongestionControlAlgorithm,
    /// Whether delay-based decisions are currently being made.
    pub active: bool,
    /// Smallest RTT the engine currently trusts (microseconds).
    pub min_rtt_us: Option<u32>,
    /// Window reductions made on delay alone, before any loss.
    pub delay_reductions: u64,
    /// Full state resets.
    pub restarts: u64,
}

// =============================================================================
// Congestion Control Trait
// =============================================================================

/// Event contract between the host stack and a congestion control engine.
///
/// Handlers are infallible: input the engine cannot use is ignored. The host
/// guarantees exclusive access to the connection while calling, and delivers
/// the RTT samples of a round before the ACK that closes it.
pub trait CongestionControl: Send {
    // =========================================================================
    // Event Handlers
    // =========================================================================

    /// Connection established; reset all per-connection state.
    fn on_connection_start(&mut self, tp: &TcpSock);

    /// A group of packets was acknowledged, with an RTT sample.
    fn on_rtt_sample(&mut self, sample: RttSample);

    /// The host's congestion avoidance state changed.
    fn on_state_change(&mut self, tp: &TcpSock, state: CaState);

    /// An incoming ACK was classified by the host.
    fn on_ack_event(&mut self, tp: &TcpSock, kind: AckKind);

    /// `ack` advanced `snd_una` by `acked` segments; decide the new window.
    fn on_ack_advance(&mut self, tp: &mut TcpSock, ack: u32, acked: u32);

    /// A window lifecycle event happened.
    fn on_cwnd_event(&mut self, tp: &mut TcpSock, event: CwndEvent);

    // =========================================================================
    // State Queries
    // =========================================================================

    /// ssthresh the host should use after a loss.
    fn ssthresh(&self, tp: &TcpSock) -> u32;

    /// Diagnostic record, only when `ext` requests it.
    fn info(&self, ext: DiagExtensions) -> Option<VegasInfo>;

    /// Returns algorithm-agnostic statistics.
    fn stats(&self) -> CongestionControlStats;

    /// Returns the algorithm identifier.
    fn algorithm(&self) -> CongestionControlAlgorithm;
}

// =============================================================================
// Congestion Controller Enum (Dispatch)
// =============================================================================

/// Congestion controller that dispatches to the configured algorithm.
///
/// ## Example: Accessing Algorithm-Specific Stats
///
/// ```ignore
/// match &controller {
///     CongestionController::Nice(nice) => {
///         println!("fractional window: {}", nice.stats().fractional_window);
///     }
///     CongestionController::WestwoodLp(westwood) => {
///         println!("bandwidth: {} B/s", westwood.stats().bw_est);
///     }
/// }
/// ```
pub enum CongestionController<T: TimeSource = RealTime> {
    /// TCP Nice controller.
    Nice(NiceController),
    /// Westwood+LP controller.
    WestwoodLp(WestwoodController<T>),
}

impl<T: TimeSource> CongestionController<T> {
    pub fn as_nice(&self) -> Option<&NiceController> {
        match self {
            Self::Nice(c) => Some(c),
            Self::WestwoodLp(_) => None,
        }
    }

    pub fn as_westwood(&self) -> Option<&WestwoodController<T>> {
        match self {
            Self::WestwoodLp(c) => Some(c),
            Self::Nice(_) => None,
        }
    }
}

impl<T: TimeSource> fmt::Debug for CongestionController<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nice(c) => f
                .debug_struct("CongestionController::Nice")
                .field("active", &c.is_active())
                .field("fractional_window", &c.fractional_window())
                .finish_non_exhaustive(),
            Self::WestwoodLp(c) => f
                .debug_struct("CongestionController::WestwoodLp")
                .field("bw_est", &c.bw_est())
                .field("rtt_min", &c.rtt_min())
                .finish_non_exhaustive(),
        }
    }
}

impl<T: TimeSource> CongestionControl for CongestionController<T> {
    fn on_connection_start(&mut self, tp: &TcpSock) {
        match self {
            Self::Nice(c) => c.on_connection_start(tp),
            Self::WestwoodLp(c) => c.on_connection_start(tp),
        }
    }

    fn on_rtt_sample(&mut self, sample: RttSample) {
        match self {
            Self::Nice(c) => c.on_rtt_sample(sample),
            Self::WestwoodLp(c) => c.on_rtt_sample(sample),
        }
    }

    fn on_state_change(&mut self, tp: &TcpSock, state: CaState) {
        match self {
            Self::Nice(c) => c.on_state_change(tp, state),
            Self::WestwoodLp(c) => CongestionControl::on_state_change(c, tp, state),
        }
    }

    fn on_ack_event(&mut self, tp: &TcpSock, kind: AckKind) {
        match self {
            Self::Nice(c) => CongestionControl::on_ack_event(c, tp, kind),
            Self::WestwoodLp(c) => c.on_ack_event(tp, kind),
        }
    }

    fn on_ack_advance(&mut self, tp: &mut TcpSock, ack: u32, acked: u32) {
        match self {
            Self::Nice(c) => c.on_ack_advance(tp, ack, acked),
            Self::WestwoodLp(c) => c.on_congestion_avoid(tp, acked),
        }
    }

    fn on_cwnd_event(&mut self, tp: &mut TcpSock, event: CwndEvent) {
        match self {
            Self::Nice(c) => c.on_cwnd_event(tp, event),
            Self::WestwoodLp(c) => c.on_cwnd_event(tp, event),
        }
    }

    fn ssthresh(&self, tp: &TcpSock) -> u32 {
        match self {
            Self::Nice(c) => c.ssthresh(tp),
            Self::WestwoodLp(c) => c.ssthresh(tp),
        }
    }

    fn info(&self, ext: DiagExtensions) -> Option<VegasInfo> {
        match self {
            Self::Nice(c) => c.info(ext),
            Self::WestwoodLp(c) => c.info(ext),
        }
    }

    fn stats(&self) -> CongestionControlStats {
        match self {
            Self::Nice(c) => CongestionControl::stats(c),
            Self::WestwoodLp(c) => CongestionControl::stats(c),
        }
    }

    fn algorithm(&self) -> CongestionControlAlgorithm {
        match self {
            Self::Nice(_) => CongestionControlAlgorithm::Nice,
            Self::WestwoodLp(_) => CongestionControlAlgorithm::WestwoodLp,
        }
    }
}

// =============================================================================
// NiceController Implementation of CongestionControl
// =============================================================================

impl CongestionControl for NiceController {
    fn on_connection_start(&mut self, tp: &TcpSock) {
        NiceController::on_connection_start(self, tp)
    }

    fn on_rtt_sample(&mut self, sample: RttSample) {
        NiceController::on_rtt_sample(self, sample)
    }

    fn on_state_change(&mut self, tp: &TcpSock, state: CaState) {
        NiceController::on_state_change(self, tp, state)
    }

    fn on_ack_event(&mut self, _tp: &TcpSock, _kind: AckKind) {}

    fn on_ack_advance(&mut self, tp: &mut TcpSock, ack: u32, acked: u32) {
        NiceController::on_ack_advance(self, tp, ack, acked)
    }

    fn on_cwnd_event(&mut self, tp: &mut TcpSock, event: CwndEvent) {
        NiceController::on_cwnd_event(self, tp, event)
    }

    fn ssthresh(&self, tp: &TcpSock) -> u32 {
        NiceController::ssthresh(self, tp)
    }

    fn info(&self, ext: DiagExtensions) -> Option<VegasInfo> {
        NiceController::info(self, ext)
    }

    fn stats(&self) -> CongestionControlStats {
        let s = NiceController::stats(self);
        CongestionControlStats {
            algorithm: CongestionControlAlgorithm::Nice,
            active: s.active,
            min_rtt_us: s.base_rtt_us,
            delay_reductions: s.slow_start_exits + s.multiplicative_decreases + s.rate_decreases,
            restarts: s.restarts,
        }
    }

    fn algorithm(&self) -> CongestionControlAlgorithm {
        CongestionControlAlgorithm::Nice
    }
}

// =============================================================================
// WestwoodController Implementation of CongestionControl
// =============================================================================

impl<T: TimeSource> CongestionControl for WestwoodController<T> {
    fn on_connection_start(&mut self, tp: &TcpSock) {
        WestwoodController::on_connection_start(self, tp)
    }

    fn on_rtt_sample(&mut self, sample: RttSample) {
        WestwoodController::on_rtt_sample(self, sample)
    }

    fn on_state_change(&mut self, _tp: &TcpSock, _state: CaState) {}

    fn on_ack_event(&mut self, tp: &TcpSock, kind: AckKind) {
        WestwoodController::on_ack_event(self, tp, kind)
    }

    fn on_ack_advance(&mut self, tp: &mut TcpSock, _ack: u32, acked: u32) {
        WestwoodController::on_congestion_avoid(self, tp, acked)
    }

    fn on_cwnd_event(&mut self, tp: &mut TcpSock, event: CwndEvent) {
        WestwoodController::on_cwnd_event(self, tp, event)
    }

    fn ssthresh(&self, tp: &TcpSock) -> u32 {
        WestwoodController::ssthresh(self, tp)
    }

    fn info(&self, ext: DiagExtensions) -> Option<VegasInfo> {
        WestwoodController::info(self, ext)
    }

    fn stats(&self) -> CongestionControlStats {
        let s = WestwoodController::stats(self);
        CongestionControlStats {
            algorithm: CongestionControlAlgorithm::WestwoodLp,
            active: true,
            min_rtt_us: Some(s.rtt_min_us),
            delay_reductions: s.early_reductions,
            restarts: s.restarts,
        }
    }

    fn algorithm(&self) -> CongestionControlAlgorithm {
        CongestionControlAlgorithm::WestwoodLp
    }
}
