//! MQTT session implementation for the broker link
//!
//! This module separates pure functions from I/O operations for better
//! testability.
//!
//! # Architecture
//!
//! - [`connection`] - Pure broker URL parsing and option construction
//! - [`message_handler`] - Pure event routing
//! - [`client`] - Impure I/O: the rumqttc client and its event loop task
//!
//! # Usage
//!
//! ```rust,no_run
//! use hydroagent::config::MqttSection;
//! use hydroagent::transport::{BrokerSession, MqttSession};
//!
//! # tokio_test::block_on(async {
//! let config = MqttSection {
//!     broker_url: "mqtt://192.168.1.50:1883".to_string(),
//!     username_env: None,
//!     password_env: None,
//!     client_id_prefix: "esp32".to_string(),
//!     keep_alive_secs: 60,
//!     connack_timeout_ms: 5000,
//!     retry: Default::default(),
//! };
//!
//! let mut session = MqttSession::new("tank1", "sensors/water/tank1/status", config)?;
//! session.connect("esp32-tank1").await?;
//! session.publish("sensors/water/tank1", br#"{"device":"tank1"}"#.to_vec()).await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

// Re-export public types for convenience
pub use client::MqttSession;
pub use connection::{parse_broker_url, BrokerEndpoint, MqttError};
pub use message_handler::{EventRoute, MessageHandler};
