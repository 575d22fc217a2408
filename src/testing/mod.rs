//! Testing utilities and mock implementations
//!
//! Mock capability implementations for driving the telemetry agent without
//! hardware, a broker or a messaging service.

pub mod mocks;

pub use mocks::*;
