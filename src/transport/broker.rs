//! Broker session link
//!
//! [`BrokerLink`] keeps a single publish/subscribe session alive on top of an
//! `Up` network link. While the session is down it reconnects with a fixed
//! client id. With the default [`ReconnectConfig`] it retries forever at a fixed
//! delay, so an unreachable broker stalls the caller until it comes back.
//! Publishing is fire-and-forget: at most once, no queue, no retry.

use super::mqtt::MqttError;
use super::ConnectionState;
use crate::clock::Clock;
use crate::config::RetrySection;
use crate::error::sanitize_error_message;
use crate::observability::metrics::metrics;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Publish/subscribe session capability used by [`BrokerLink`]
#[async_trait]
pub trait BrokerSession: Send {
    /// Open a new session and wait for the broker to accept it
    async fn connect(&mut self, client_id: &str) -> Result<(), MqttError>;

    /// Whether the current session is still connected
    fn is_connected(&self) -> bool;

    /// Hand one message to the session. Success means it was accepted for
    /// sending, not that the broker received it.
    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), MqttError>;

    /// Close the session, best effort
    async fn disconnect(&mut self) -> Result<(), MqttError>;
}

/// Reconnection configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum number of connect attempts per `ensure_up` (None = unlimited)
    pub max_attempts: Option<u32>,
    /// Custom backoff pattern in milliseconds (if empty, uses the sustained delay)
    pub backoff_pattern: Vec<u64>,
    /// Delay to use after pattern is exhausted
    pub sustained_delay: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            backoff_pattern: Vec::new(),
            sustained_delay: 500,
        }
    }
}

impl From<&RetrySection> for ReconnectConfig {
    fn from(section: &RetrySection) -> Self {
        Self {
            max_attempts: section.max_attempts,
            backoff_pattern: section.backoff_pattern_ms.clone(),
            sustained_delay: section.delay_ms,
        }
    }
}

impl ReconnectConfig {
    /// Calculate the delay after the given failed attempt (1-based)
    pub fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay)
    }

    /// Calculate the maximum total delay for all attempts.
    /// Returns None if unlimited retries are configured
    pub fn calculate_max_total_time(&self) -> Option<u64> {
        self.max_attempts.map(|max_attempts| {
            (1..max_attempts)
                .map(|attempt| self.calculate_backoff_delay(attempt))
                .sum()
        })
    }

    /// Decide what to do after `failed_attempts` consecutive failures
    pub fn should_attempt_reconnection(&self, failed_attempts: u32) -> ReconnectionDecision {
        if let Some(max_attempts) = self.max_attempts {
            if failed_attempts >= max_attempts {
                return ReconnectionDecision::AbortMaxAttemptsExceeded;
            }
        }

        ReconnectionDecision::Proceed {
            attempt: failed_attempts + 1,
            delay_ms: self.calculate_backoff_delay(failed_attempts),
        }
    }
}

/// Decision result for reconnection attempts
#[derive(Debug, PartialEq)]
pub enum ReconnectionDecision {
    /// Wait `delay_ms`, then make attempt number `attempt`
    Proceed { attempt: u32, delay_ms: u64 },
    /// Give up for this `ensure_up` call
    AbortMaxAttemptsExceeded,
}

/// Maintains the broker session
pub struct BrokerLink<S: BrokerSession> {
    session: S,
    clock: Arc<dyn Clock>,
    state: ConnectionState,
    client_id: String,
    reconnect_config: ReconnectConfig,
    sessions_established: u32,
}

impl<S: BrokerSession> BrokerLink<S> {
    pub fn new(
        session: S,
        clock: Arc<dyn Clock>,
        client_id: String,
        reconnect_config: ReconnectConfig,
    ) -> Self {
        Self {
            session,
            clock,
            state: ConnectionState::Down,
            client_id,
            reconnect_config,
            sessions_established: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Number of sessions established after the first one
    pub fn reconnect_count(&self) -> u32 {
        self.sessions_established.saturating_sub(1)
    }

    /// Bring the session up. Requires the network link to be `Up`; otherwise
    /// the link is forced `Down` without any connect attempt.
    pub async fn ensure_up(&mut self, network: ConnectionState) -> ConnectionState {
        if !network.is_up() {
            if self.state != ConnectionState::Down {
                warn!(network = %network, "Network not up, dropping broker session");
                self.drop_session().await;
            }
            self.state = ConnectionState::Down;
            return self.state;
        }

        if self.state == ConnectionState::Up {
            if self.session.is_connected() {
                return self.state;
            }
            warn!("Broker session lost");
            metrics().broker_connection_lost();
        }

        self.state = ConnectionState::Connecting;
        let mut failed_attempts = 0u32;
        let mut attempt = 1u32;

        loop {
            metrics().broker_connection_attempt();
            match self.session.connect(&self.client_id).await {
                Ok(()) => {
                    metrics().broker_connection_established();
                    self.sessions_established += 1;
                    info!(
                        client_id = %self.client_id,
                        attempt = attempt,
                        "Broker session established"
                    );
                    self.state = ConnectionState::Up;
                    return self.state;
                }
                Err(e) => {
                    metrics().broker_connection_failed();
                    warn!(
                        client_id = %self.client_id,
                        attempt = attempt,
                        error = %sanitize_error_message(&e.to_string()),
                        "Broker connect attempt failed"
                    );
                }
            }

            failed_attempts += 1;
            match self.reconnect_config.should_attempt_reconnection(failed_attempts) {
                ReconnectionDecision::Proceed {
                    attempt: next,
                    delay_ms,
                } => {
                    let max_display = self
                        .reconnect_config
                        .max_attempts
                        .map_or("∞".to_string(), |max| max.to_string());
                    debug!(
                        "Attempting broker connect {}/{} after {}ms delay",
                        next, max_display, delay_ms
                    );
                    attempt = next;
                    self.clock.sleep(Duration::from_millis(delay_ms)).await;
                }
                ReconnectionDecision::AbortMaxAttemptsExceeded => {
                    warn!(
                        attempts = failed_attempts,
                        "Giving up on broker for this iteration"
                    );
                    self.state = ConnectionState::Down;
                    return self.state;
                }
            }
        }
    }

    /// Fire-and-forget publish. Requires `Up`; failures are returned for the
    /// caller to log and are never retried.
    pub async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), MqttError> {
        if !self.state.is_up() {
            return Err(MqttError::NotConnected { state: self.state });
        }

        let result = self.session.publish(topic, payload).await;
        if result.is_err() && !self.session.is_connected() {
            metrics().broker_connection_lost();
            self.state = ConnectionState::Down;
        }
        result
    }

    /// Close the session, best effort
    pub async fn disconnect(&mut self) {
        self.drop_session().await;
        self.state = ConnectionState::Down;
    }

    async fn drop_session(&mut self) {
        metrics().broker_disconnected();
        if let Err(e) = self.session.disconnect().await {
            debug!(error = %e, "Broker disconnect failed");
        }
    }
}
