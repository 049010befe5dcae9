//! Background TCP congestion control engines.
//!
//! Two decision engines for low-priority bulk transfer, driven by a host TCP
//! stack through [`CongestionControl`]:
//!
//! - [`nice::NiceController`]: TCP Nice, Vegas-style delay control with a
//!   paced sub-segment window.
//! - [`westwood::WestwoodController`]: Westwood+ bandwidth estimation with LP
//!   early window reduction.

/// Congestion control trait, enum dispatch and diagnostics.
pub mod congestion_control;

/// Engine selection and tunables.
pub mod config;

/// Configuration errors.
pub mod errors;

/// Host stack send state and the Reno helpers engines fall back on.
pub mod host;

/// TCP Nice.
pub mod nice;

/// Per-round RTT filter.
pub mod rtt;

/// Clock abstraction.
pub mod time;

/// Westwood+LP.
pub mod westwood;

pub use congestion_control::{
    CongestionControl, CongestionControlAlgorithm, CongestionControlStats, CongestionController,
    DiagExtensions, VegasInfo,
};
pub use config::CongestionControlConfig;
pub use errors::ConfigError;
pub use host::{AckKind, CaState, CwndEvent, RttSample, TcpSock};
