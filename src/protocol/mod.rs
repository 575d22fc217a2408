//! Wire formats and topic rules
//!
//! This module holds the published telemetry document and the topic and
//! device identity rules shared by configuration and transport.

pub mod messages;
pub mod topics;

pub use messages::*;
pub use topics::*;
