//! Network association link
//!
//! [`NetworkLink::ensure_up`] is idempotent: an associated link costs one
//! driver query. From `Down` it issues a connect request and polls for
//! association at a fixed interval until a bounded timeout. Giving up is
//! silent; the state simply stays `Down` and the caller tries again later.

use super::ConnectionState;
use crate::clock::Clock;
use crate::config::NetworkSection;
use async_trait::async_trait;
use std::net::{IpAddr, UdpSocket};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Network driver errors
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Connect request failed: {0}")]
    ConnectRequestFailed(String),
    #[error("Failed to query interface {interface}: {source}")]
    InterfaceQuery {
        interface: String,
        #[source]
        source: std::io::Error,
    },
}

/// Radio/interface capability used by [`NetworkLink`]
#[async_trait]
pub trait NetworkDriver: Send {
    /// Issue a connect request. Returns once the request is issued, not
    /// once the association is confirmed.
    async fn request_connect(&mut self) -> Result<(), NetworkError>;

    /// Whether the interface currently reports association
    fn is_associated(&mut self) -> bool;

    /// Address assigned to this device, if known
    fn local_address(&mut self) -> Option<IpAddr>;
}

/// Maintains the network association
pub struct NetworkLink<D: NetworkDriver> {
    driver: D,
    clock: Arc<dyn Clock>,
    state: ConnectionState,
    connect_timeout: Duration,
    poll_interval: Duration,
}

impl<D: NetworkDriver> NetworkLink<D> {
    pub fn new(driver: D, clock: Arc<dyn Clock>, config: &NetworkSection) -> Self {
        Self {
            driver,
            clock,
            state: ConnectionState::Down,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn local_address(&mut self) -> Option<IpAddr> {
        self.driver.local_address()
    }

    /// Bring the link up, waiting at most the configured timeout
    pub async fn ensure_up(&mut self) -> ConnectionState {
        if self.driver.is_associated() {
            if self.state != ConnectionState::Up {
                info!("Network association confirmed");
                self.state = ConnectionState::Up;
            }
            return self.state;
        }

        if self.state == ConnectionState::Up {
            warn!("Network association lost");
        }
        self.state = ConnectionState::Connecting;

        if let Err(e) = self.driver.request_connect().await {
            warn!(error = %e, "Network connect request failed");
        }

        let started = self.clock.now();
        loop {
            if self.driver.is_associated() {
                info!(
                    waited_ms = self.clock.now().duration_since(started).as_millis() as u64,
                    "Network up"
                );
                self.state = ConnectionState::Up;
                return self.state;
            }
            if self.clock.now().duration_since(started) >= self.connect_timeout {
                break;
            }
            self.clock.sleep(self.poll_interval).await;
        }

        debug!(
            timeout_ms = self.connect_timeout.as_millis() as u64,
            "Network did not come up within timeout"
        );
        self.state = ConnectionState::Down;
        self.state
    }
}

/// Linux driver: association from `/sys/class/net/<iface>/operstate`,
/// connect request through an optional external command
pub struct SysfsNetworkDriver {
    interface: String,
    connect_command: Vec<String>,
    probe_target: String,
}

impl SysfsNetworkDriver {
    /// `probe_target` is a `host:port` used to discover the outbound address
    pub fn new(config: &NetworkSection, probe_target: String) -> Self {
        Self {
            interface: config.interface.clone(),
            connect_command: config.connect_command.clone(),
            probe_target,
        }
    }

    fn operstate_path(&self) -> PathBuf {
        PathBuf::from("/sys/class/net")
            .join(&self.interface)
            .join("operstate")
    }

    fn read_operstate(&self) -> Result<String, NetworkError> {
        std::fs::read_to_string(self.operstate_path())
            .map(|s| s.trim().to_string())
            .map_err(|source| NetworkError::InterfaceQuery {
                interface: self.interface.clone(),
                source,
            })
    }
}

/// Interpret a sysfs operstate value
pub fn operstate_is_up(operstate: &str) -> bool {
    // Some drivers never report "up" and stay "unknown" while carrying traffic
    matches!(operstate.trim(), "up" | "unknown")
}

#[async_trait]
impl NetworkDriver for SysfsNetworkDriver {
    async fn request_connect(&mut self) -> Result<(), NetworkError> {
        let Some((program, args)) = self.connect_command.split_first() else {
            debug!(interface = %self.interface, "No connect command configured, waiting for association");
            return Ok(());
        };

        // Fire the request and let the poll loop observe the result
        tokio::process::Command::new(program)
            .args(args)
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(false)
            .spawn()
            .map(|_child| ())
            .map_err(|e| NetworkError::ConnectRequestFailed(format!("{program}: {e}")))
    }

    fn is_associated(&mut self) -> bool {
        match self.read_operstate() {
            Ok(state) => operstate_is_up(&state),
            Err(e) => {
                debug!(error = %e, "Interface query failed");
                false
            }
        }
    }

    fn local_address(&mut self) -> Option<IpAddr> {
        // A connected UDP socket reveals the source address without sending anything
        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect(&self.probe_target).ok()?;
        socket.local_addr().ok().map(|addr| addr.ip())
    }
}
