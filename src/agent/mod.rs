//! Telemetry agent
//!
//! [`TelemetryAgent`] owns the network and broker links, the sampler, the
//! alert evaluator and the notifier, and drives them one iteration at a time.

pub mod lifecycle;
pub mod state;

pub use lifecycle::*;
pub use state::*;
