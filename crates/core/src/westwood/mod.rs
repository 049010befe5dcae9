//! Westwood+LP congestion controller.
//!
//! Westwood+ estimates the bottleneck bandwidth from the rate at which ACKs
//! return and, after congestion, sets the window to the estimated
//! bandwidth-delay product instead of blindly halving it. The LP ("low
//! priority") extension adds early window reduction: once the queue the flow
//! builds exceeds a threshold derived from its delay history, the window is cut
//! to the bandwidth-delay product before any loss.
//!
//! All times inside the controller are clock ticks of [`crate::time::HZ`].

mod bandwidth;
mod config;
mod controller;
mod delay;
mod stats;


pub use bandwidth::BandwidthEstimator;
pub use config::WestwoodConfig;
pub use controller::WestwoodController;
pub use delay::{update_delay, DelayEnvelope, EnvelopeSource, EwrThreshold};
pub use stats::WestwoodStats;
