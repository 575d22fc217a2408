//! Connectivity layer for the telemetry agent
//!
//! Two links, each owning one [`ConnectionState`]:
//!
//! - [`network::NetworkLink`] keeps the network association up with a bounded wait
//! - [`broker::BrokerLink`] keeps one MQTT session up on top of it
//!
//! Both talk to the outside world only through capability traits
//! ([`network::NetworkDriver`], [`broker::BrokerSession`]) so the state machines
//! can be tested without radios or brokers.

pub mod broker;
pub mod mqtt;
pub mod network;

pub use broker::{BrokerLink, BrokerSession};
pub use mqtt::MqttSession;
pub use network::{NetworkDriver, NetworkLink, SysfsNetworkDriver};

/// Connection state of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Not connected; the next `ensure_up` starts a fresh attempt
    #[default]
    Down,
    /// Connect request issued, waiting for confirmation
    Connecting,
    /// Connected and usable
    Up,
}

impl ConnectionState {
    pub fn is_up(self) -> bool {
        matches!(self, ConnectionState::Up)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Down => "down",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Up => "up",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_down() {
        assert_eq!(ConnectionState::default(), ConnectionState::Down);
        assert!(!ConnectionState::Connecting.is_up());
        assert!(ConnectionState::Up.is_up());
    }

    #[test]
    fn test_display() {
        assert_eq!(ConnectionState::Up.to_string(), "up");
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
    }
}
