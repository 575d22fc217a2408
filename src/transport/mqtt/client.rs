//! I/O side of the MQTT session
//!
//! Each connect attempt builds a fresh rumqttc client, drives its event loop
//! in a task and waits for the ConnAck. The task never reconnects on its own:
//! on any error it marks the session `Down` and exits, and reconnection is
//! left to [`crate::transport::BrokerLink`] so there is a single retry policy.

use super::connection::{configure_mqtt_options, parse_broker_url, MqttError};
use super::message_handler::{EventRoute, MessageHandler};
use crate::config::MqttSection;
use crate::transport::broker::BrokerSession;
use crate::transport::ConnectionState;
use async_trait::async_trait;
use rumqttc::{AsyncClient, EventLoop, QoS};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Request channel capacity of the rumqttc client
const REQUEST_CAPACITY: usize = 10;

/// MQTT session over rumqttc
pub struct MqttSession {
    device_id: String,
    status_topic: String,
    config: MqttSection,
    client: Option<AsyncClient>,
    state_rx: Option<watch::Receiver<ConnectionState>>,
    event_loop_handle: Option<JoinHandle<()>>,
}

impl MqttSession {
    pub fn new(device_id: &str, status_topic: &str, config: MqttSection) -> Result<Self, MqttError> {
        // Fail at startup rather than on every connect attempt
        parse_broker_url(&config.broker_url)?;

        Ok(Self {
            device_id: device_id.to_string(),
            status_topic: status_topic.to_string(),
            config,
            client: None,
            state_rx: None,
            event_loop_handle: None,
        })
    }

    fn current_state(&self) -> ConnectionState {
        self.state_rx
            .as_ref()
            .map(|rx| *rx.borrow())
            .unwrap_or(ConnectionState::Down)
    }

    /// Drop the client and stop its event loop task
    fn teardown(&mut self) {
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
        self.client = None;
        self.state_rx = None;
    }

    /// Poll the event loop until the session ends, mirroring its state
    async fn drive_event_loop(mut event_loop: EventLoop, state_tx: watch::Sender<ConnectionState>) {
        loop {
            match event_loop.poll().await {
                Ok(event) => match MessageHandler::route_mqtt_event(&event) {
                    EventRoute::ConnectionAcknowledged => {
                        let _ = state_tx.send(ConnectionState::Up);
                    }
                    EventRoute::ConnectionRefused(code) => {
                        warn!(code = %code, "Broker refused session");
                        let _ = state_tx.send(ConnectionState::Down);
                        break;
                    }
                    EventRoute::Disconnected => {
                        info!("Broker closed session");
                        let _ = state_tx.send(ConnectionState::Down);
                        break;
                    }
                    EventRoute::InfrastructureEvent(event_str) => {
                        debug!(target: "mqtt_transport", "MQTT event: {}", event_str);
                    }
                    EventRoute::OutgoingEvent => {}
                },
                Err(e) => {
                    debug!(target: "mqtt_transport", error = %e, "MQTT event loop stopped");
                    let _ = state_tx.send(ConnectionState::Down);
                    break;
                }
            }
        }
    }

    /// Wait for connection confirmation (ConnAck) with timeout
    async fn wait_for_connection_confirmation(
        mut state_rx: watch::Receiver<ConnectionState>,
        timeout: Duration,
    ) -> Result<(), MqttError> {
        let timeout_result = tokio::time::timeout(timeout, async {
            loop {
                match *state_rx.borrow_and_update() {
                    ConnectionState::Up => return Ok(()),
                    ConnectionState::Down => {
                        return Err(MqttError::ConnectionFailedStr(
                            "Session closed before ConnAck".to_string(),
                        ))
                    }
                    ConnectionState::Connecting => {}
                }
                if state_rx.changed().await.is_err() {
                    return Err(MqttError::ConnectionFailedStr(
                        "State channel closed".to_string(),
                    ));
                }
            }
        })
        .await;

        match timeout_result {
            Ok(result) => result,
            Err(_) => Err(MqttError::ConnectionFailedStr(
                "ConnAck timeout - no connection confirmation received".to_string(),
            )),
        }
    }
}

#[async_trait]
impl BrokerSession for MqttSession {
    async fn connect(&mut self, client_id: &str) -> Result<(), MqttError> {
        self.teardown();

        let options =
            configure_mqtt_options(client_id, &self.device_id, &self.status_topic, &self.config)?;
        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);

        let handle = tokio::spawn(Self::drive_event_loop(event_loop, state_tx));
        self.event_loop_handle = Some(handle);
        self.client = Some(client);
        self.state_rx = Some(state_rx.clone());

        let timeout = Duration::from_millis(self.config.connack_timeout_ms);
        if let Err(e) = Self::wait_for_connection_confirmation(state_rx, timeout).await {
            self.teardown();
            return Err(e);
        }

        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.current_state().is_up()
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), MqttError> {
        let state = self.current_state();
        let client = match (&self.client, state) {
            (Some(client), ConnectionState::Up) => client,
            _ => return Err(MqttError::NotConnected { state }),
        };

        client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e| MqttError::PublishFailed(Box::new(e)))
    }

    async fn disconnect(&mut self) -> Result<(), MqttError> {
        let result = match (&self.client, self.state_rx.clone()) {
            (Some(client), Some(mut state_rx)) if self.is_connected() => {
                let result = client
                    .disconnect()
                    .await
                    .map_err(|e| MqttError::ConnectionFailed(Box::new(e)));
                // Give the event loop a moment to flush the DISCONNECT packet
                let _ = tokio::time::timeout(Duration::from_millis(500), async {
                    while state_rx.borrow_and_update().is_up() {
                        if state_rx.changed().await.is_err() {
                            break;
                        }
                    }
                })
                .await;
                result
            }
            _ => Ok(()),
        };

        self.teardown();
        result
    }
}

impl Drop for MqttSession {
    fn drop(&mut self) {
        self.teardown();
    }
}
