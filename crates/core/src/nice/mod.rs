//! TCP Nice background congestion controller.
//!
//! Nice extends Vegas so a low-priority flow steps aside for foreground
//! traffic well before loss occurs.
//!
//! ## Two congestion signals
//!
//! - **Per round**: like Vegas, the minimum RTT of each round against the base
//!   RTT gives the number of packets the flow keeps queued (`diff`). Outside
//!   `[alpha, beta]` the window moves by one step.
//! - **Per sample**: any sample above the `threshold` percent point between base
//!   and max RTT counts as a congestion signal. More signals in a round than
//!   `fraction` percent of cwnd triggers a multiplicative decrease.
//!
//! ## Fractional window
//!
//! When the window is already at two segments and more back-off is needed, Nice
//! paces instead: a burst of two segments every `d` ticks, zero otherwise. See
//! [`FractionalWindow`].

mod config;
mod controller;
mod stats;
mod window;

#[cfg(test)]
mod tests;

pub use config::NiceConfig;
pub use controller::NiceController;
pub use stats::NiceStats;
pub use window::{cwnd_delta_in_fraction_units, FractionalWindow};
