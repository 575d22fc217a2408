//! hydroagent - water-quality telemetry agent
//!
//! Samples analog pH and ORP probes, publishes each reading to an MQTT broker
//! and sends a Telegram message when a reading leaves its configured range.
//!
//! # Overview
//!
//! - [`transport`]: network association and broker session links that
//!   repair themselves before every use
//! - [`sensor`]: raw analog reads and their conversion to a [`sensor::Reading`]
//! - [`alert`]: threshold checks with a cooldown between alerts
//! - [`notifier`]: one-shot HTTPS notifications
//! - [`agent`]: the loop tying them together, one tick at a time
//!
//! Every wait goes through an injected [`clock::Clock`], so the whole loop
//! runs deterministically against the mocks in [`testing`].
//!
//! # Quick Start
//!
//! ```rust
//! use hydroagent::protocol::TelemetryPayload;
//! use hydroagent::sensor::Reading;
//!
//! let reading = Reading {
//!     device_id: "tank1".to_string(),
//!     ph: 1.65041,
//!     orp: 0.81234,
//!     temperature: f64::NAN,
//!     taken_at: chrono::Utc::now(),
//! };
//!
//! let json = TelemetryPayload::from_reading(&reading).to_json().unwrap();
//! assert_eq!(json, r#"{"device":"tank1","ph":1.6504,"orp":0.8123,"temp":null}"#);
//! ```

pub mod agent;
pub mod alert;
pub mod clock;
pub mod config;
pub mod error;
pub mod notifier;
pub mod observability;
pub mod protocol;
pub mod sensor;
pub mod testing;
pub mod transport;

pub use agent::{AgentPhase, TelemetryAgent, TickOutcome};
pub use alert::{AlertEvaluator, AlertEvent, ViolatedField};
pub use clock::{Clock, SystemClock};
pub use config::*;
pub use error::{AgentError, AgentResult};
pub use notifier::{Notifier, TelegramNotifier};
pub use protocol::*;
pub use sensor::{AnalogSource, Reading, SensorSampler};
pub use transport::{BrokerLink, ConnectionState, NetworkLink};
