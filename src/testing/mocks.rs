//! Mock implementations for testing
//!
//! Provides mock clock, network driver, broker session, notifier and analog
//! source implementations so the whole agent loop can run without hardware,
//! a broker or real delays. Every mock is cheap to clone and clones share
//! state, so a test keeps one handle while the code under test owns another.

use crate::clock::Clock;
use crate::notifier::Notifier;
use crate::sensor::{AnalogSource, SensorChannel, SensorError};
use crate::transport::broker::BrokerSession;
use crate::transport::mqtt::MqttError;
use crate::transport::network::{NetworkDriver, NetworkError};
use crate::transport::ConnectionState;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

pub type PublishedMessage = (String, Vec<u8>);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // A panicking test thread must not hide the state from the assertions
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Clock whose `sleep` advances time instantly
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
    sleeps: Mutex<Vec<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    /// Move time forward without recording a sleep
    pub fn advance(&self, duration: Duration) {
        *lock(&self.offset) += duration;
    }

    /// Total simulated time since creation
    pub fn elapsed(&self) -> Duration {
        *lock(&self.offset)
    }

    /// Every sleep requested so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        lock(&self.sleeps).clone()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        lock(&self.sleeps).push(duration);
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}

#[derive(Debug, Default)]
struct NetworkState {
    associated: bool,
    /// Re-associate after a connect request
    reassociate: bool,
    polls_after_request: u32,
    pending_polls: Option<u32>,
    fail_requests: bool,
    connect_requests: u32,
    address: Option<IpAddr>,
}

/// Scriptable network driver
#[derive(Debug, Clone, Default)]
pub struct MockNetworkDriver {
    state: Arc<Mutex<NetworkState>>,
}

impl MockNetworkDriver {
    fn with_state(state: NetworkState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Associated from the start; reconnects on the first poll after a request
    pub fn associated() -> Self {
        Self::with_state(NetworkState {
            associated: true,
            reassociate: true,
            address: Some(IpAddr::from([192, 168, 1, 40])),
            ..Default::default()
        })
    }

    /// Not associated; a connect request succeeds after `polls` negative polls
    pub fn associates_after_polls(polls: u32) -> Self {
        Self::with_state(NetworkState {
            reassociate: true,
            polls_after_request: polls,
            address: Some(IpAddr::from([192, 168, 1, 40])),
            ..Default::default()
        })
    }

    pub fn never_associates() -> Self {
        Self::with_state(NetworkState::default())
    }

    pub fn with_request_failure(self) -> Self {
        lock(&self.state).fail_requests = true;
        self
    }

    pub fn connect_requests(&self) -> u32 {
        lock(&self.state).connect_requests
    }

    pub fn set_associated(&self, associated: bool) {
        let mut state = lock(&self.state);
        state.associated = associated;
        state.pending_polls = None;
    }

    pub fn set_reassociate(&self, reassociate: bool) {
        lock(&self.state).reassociate = reassociate;
    }
}

#[async_trait]
impl NetworkDriver for MockNetworkDriver {
    async fn request_connect(&mut self) -> Result<(), NetworkError> {
        let mut state = lock(&self.state);
        state.connect_requests += 1;
        if state.fail_requests {
            return Err(NetworkError::ConnectRequestFailed(
                "mock connect failure".to_string(),
            ));
        }
        if state.reassociate {
            state.pending_polls = Some(state.polls_after_request);
        }
        Ok(())
    }

    fn is_associated(&mut self) -> bool {
        let mut state = lock(&self.state);
        if state.associated {
            return true;
        }
        match state.pending_polls {
            Some(0) => {
                state.associated = true;
                state.pending_polls = None;
                true
            }
            Some(remaining) => {
                state.pending_polls = Some(remaining - 1);
                false
            }
            None => false,
        }
    }

    fn local_address(&mut self) -> Option<IpAddr> {
        let state = lock(&self.state);
        if state.associated {
            state.address
        } else {
            None
        }
    }
}

#[derive(Debug, Default)]
struct BrokerState {
    connected: bool,
    failures_remaining: u32,
    connect_attempts: u32,
    last_client_id: Option<String>,
    disconnects: u32,
    fail_publish: bool,
    publish_calls: u32,
    published: Vec<PublishedMessage>,
    /// Network state observed at each publish, when a driver is attached
    publish_preconditions: Vec<bool>,
    network: Option<MockNetworkDriver>,
}

/// Scriptable broker session recording every publish
#[derive(Debug, Clone, Default)]
pub struct MockBrokerSession {
    state: Arc<Mutex<BrokerState>>,
}

impl MockBrokerSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first `failures` connect attempts fail
    pub fn failing_connects(failures: u32) -> Self {
        let session = Self::default();
        lock(&session.state).failures_remaining = failures;
        session
    }

    /// Record whether this driver reports association at each publish
    pub fn observe_network(&self, driver: &MockNetworkDriver) {
        lock(&self.state).network = Some(driver.clone());
    }

    pub fn connect_attempts(&self) -> u32 {
        lock(&self.state).connect_attempts
    }

    pub fn last_client_id(&self) -> Option<String> {
        lock(&self.state).last_client_id.clone()
    }

    pub fn disconnects(&self) -> u32 {
        lock(&self.state).disconnects
    }

    /// Simulate the broker closing the session
    pub fn drop_connection(&self) {
        lock(&self.state).connected = false;
    }

    pub fn set_publish_failure(&self, fail: bool) {
        lock(&self.state).fail_publish = fail;
    }

    pub fn publish_calls(&self) -> u32 {
        lock(&self.state).publish_calls
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        lock(&self.state).published.clone()
    }

    /// For each publish call, whether the session and network were both up
    pub fn publish_preconditions(&self) -> Vec<bool> {
        lock(&self.state).publish_preconditions.clone()
    }
}

#[async_trait]
impl BrokerSession for MockBrokerSession {
    async fn connect(&mut self, client_id: &str) -> Result<(), MqttError> {
        let mut state = lock(&self.state);
        state.connect_attempts += 1;
        state.last_client_id = Some(client_id.to_string());
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            state.connected = false;
            return Err(MqttError::ConnectionFailedStr(
                "mock connection refused".to_string(),
            ));
        }
        state.connected = true;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        lock(&self.state).connected
    }

    async fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<(), MqttError> {
        let mut state = lock(&self.state);
        state.publish_calls += 1;

        let network_up = match state.network.as_ref() {
            Some(driver) => lock(&driver.state).associated,
            None => true,
        };
        let precondition = state.connected && network_up;
        state.publish_preconditions.push(precondition);

        if !state.connected {
            return Err(MqttError::NotConnected {
                state: ConnectionState::Down,
            });
        }
        if state.fail_publish {
            return Err(MqttError::PublishFailed("mock publish failure".into()));
        }
        state.published.push((topic.to_string(), payload));
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), MqttError> {
        let mut state = lock(&self.state);
        state.disconnects += 1;
        state.connected = false;
        Ok(())
    }
}

/// Notifier recording every message it is asked to send
#[derive(Debug, Clone)]
pub struct MockNotifier {
    sent: Arc<Mutex<Vec<String>>>,
    succeed: Arc<Mutex<bool>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            succeed: Arc::new(Mutex::new(true)),
        }
    }

    pub fn failing() -> Self {
        let notifier = Self::new();
        notifier.set_succeed(false);
        notifier
    }

    pub fn set_succeed(&self, succeed: bool) {
        *lock(&self.succeed) = succeed;
    }

    pub fn sent(&self) -> Vec<String> {
        lock(&self.sent).clone()
    }
}

impl Default for MockNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, text: &str) -> bool {
        lock(&self.sent).push(text.to_string());
        *lock(&self.succeed)
    }
}

#[derive(Debug, Default)]
struct AnalogState {
    ph_raw: VecDeque<u16>,
    orp_raw: VecDeque<u16>,
    failing: bool,
    reads: Vec<SensorChannel>,
}

/// Analog source returning scripted raw values. The last queued value
/// repeats once the queue is down to one entry.
#[derive(Debug, Clone, Default)]
pub struct MockAnalogSource {
    state: Arc<Mutex<AnalogState>>,
}

impl MockAnalogSource {
    pub fn new(ph_raw: u16, orp_raw: u16) -> Self {
        Self::sequence(vec![ph_raw], vec![orp_raw])
    }

    pub fn sequence(ph_raw: Vec<u16>, orp_raw: Vec<u16>) -> Self {
        Self {
            state: Arc::new(Mutex::new(AnalogState {
                ph_raw: ph_raw.into(),
                orp_raw: orp_raw.into(),
                ..Default::default()
            })),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        lock(&self.state).failing = failing;
    }

    pub fn reads(&self) -> Vec<SensorChannel> {
        lock(&self.state).reads.clone()
    }
}

impl AnalogSource for MockAnalogSource {
    fn read_raw(&mut self, channel: SensorChannel) -> Result<u16, SensorError> {
        let mut state = lock(&self.state);
        state.reads.push(channel);
        if state.failing {
            return Err(SensorError::ReadFailed {
                channel,
                path: "mock".to_string(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "mock read failure"),
            });
        }

        let queue = match channel {
            SensorChannel::Ph => &mut state.ph_raw,
            SensorChannel::Orp => &mut state.orp_raw,
        };
        let value = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().copied()
        };
        Ok(value.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_manual_clock_sleep_advances_instantly() {
        let clock = ManualClock::new();
        let before = clock.now();
        clock.sleep(Duration::from_secs(3600)).await;
        assert_eq!(clock.now() - before, Duration::from_secs(3600));
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(3600)]);
    }

    #[tokio::test]
    async fn test_mock_network_driver_association_script() {
        let mut driver = MockNetworkDriver::associates_after_polls(2);
        assert!(!driver.is_associated());
        driver.request_connect().await.unwrap();
        assert!(!driver.is_associated());
        assert!(!driver.is_associated());
        assert!(driver.is_associated());
        assert_eq!(driver.connect_requests(), 1);
    }

    #[tokio::test]
    async fn test_mock_broker_session_shares_state_between_clones() {
        let handle = MockBrokerSession::failing_connects(1);
        let mut session = handle.clone();
        assert!(session.connect("c").await.is_err());
        assert!(session.connect("c").await.is_ok());
        session.publish("t", b"x".to_vec()).await.unwrap();
        assert_eq!(handle.connect_attempts(), 2);
        assert_eq!(handle.published(), vec![("t".to_string(), b"x".to_vec())]);
    }

    #[test]
    fn test_mock_analog_source_sequence() {
        let mut source = MockAnalogSource::sequence(vec![1, 2], vec![9]);
        assert_eq!(source.read_raw(SensorChannel::Ph).unwrap(), 1);
        assert_eq!(source.read_raw(SensorChannel::Ph).unwrap(), 2);
        assert_eq!(source.read_raw(SensorChannel::Ph).unwrap(), 2);
        assert_eq!(source.read_raw(SensorChannel::Orp).unwrap(), 9);
    }
}
