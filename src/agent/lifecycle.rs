//! The telemetry loop
//!
//! [`TelemetryAgent::tick`] runs one iteration through the phases in
//! [`super::state`]: ensure network, ensure broker, sample, publish, evaluate.
//! It never sleeps itself; the returned [`TickOutcome`] carries the pause and
//! [`TelemetryAgent::run`] applies it through the injected clock.

use super::state::{next_phase, AgentPhase, AlertOutcome, PhaseResult, SkipReason, TickOutcome};
use crate::alert::{AlertDecision, AlertEvaluator};
use crate::clock::Clock;
use crate::config::AgentConfig;
use crate::error::sanitize_error_message;
use crate::notifier::{alert_message, boot_message, Notifier};
use crate::observability::metrics::metrics;
use crate::protocol::messages::TelemetryPayload;
use crate::sensor::{AnalogSource, Reading, SensorSampler};
use crate::transport::broker::{BrokerLink, BrokerSession, ReconnectConfig};
use crate::transport::network::{NetworkDriver, NetworkLink};
use crate::transport::ConnectionState;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn, Instrument};

/// Periodic sample/publish/alert loop over a network and broker link
pub struct TelemetryAgent<D: NetworkDriver, S: BrokerSession> {
    device_id: String,
    topic: String,
    network: NetworkLink<D>,
    broker: BrokerLink<S>,
    sampler: SensorSampler,
    evaluator: AlertEvaluator,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    penalty: Duration,
    phase: AgentPhase,
    iterations: u64,
}

impl<D: NetworkDriver, S: BrokerSession> TelemetryAgent<D, S> {
    /// Assemble the agent from validated configuration and its capabilities
    pub fn new(
        config: &AgentConfig,
        driver: D,
        session: S,
        source: Box<dyn AnalogSource>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let network = NetworkLink::new(driver, clock.clone(), &config.network);
        let broker = BrokerLink::new(
            session,
            clock.clone(),
            config.mqtt_client_id(),
            ReconnectConfig::from(&config.mqtt.retry),
        );

        Self {
            device_id: config.device.id.clone(),
            topic: config.device.telemetry_topic(),
            network,
            broker,
            sampler: SensorSampler::new(source, &config.device.id, &config.sampler),
            evaluator: AlertEvaluator::new(config.thresholds, config.cooldown()),
            notifier,
            clock,
            interval: config.interval(),
            penalty: config.penalty(),
            phase: AgentPhase::default(),
            iterations: 0,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn phase(&self) -> AgentPhase {
        self.phase
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn network(&self) -> &NetworkLink<D> {
        &self.network
    }

    pub fn broker(&self) -> &BrokerLink<S> {
        &self.broker
    }

    pub fn evaluator(&self) -> &AlertEvaluator {
        &self.evaluator
    }

    fn enter(&mut self, phase: AgentPhase) {
        self.phase = phase;
        metrics().set_agent_phase(phase.as_str());
    }

    /// Bring the network up once and announce the device. Returns whether
    /// the boot notice was delivered.
    pub async fn boot(&mut self) -> bool {
        let span = crate::lifecycle_span!(event = "boot", device = %self.device_id);
        async {
            self.enter(AgentPhase::EnsuringNetwork);
            if !self.network.ensure_up().await.is_up() {
                warn!("Network unavailable at boot, skipping boot notice");
                return false;
            }

            let address = self.network.local_address();
            info!(address = ?address, "Device booted");

            let text = boot_message(&self.device_id, address);
            let delivered = self
                .notifier
                .send(&text)
                .instrument(crate::notify_span!(kind = "boot"))
                .await;
            if !delivered {
                metrics().notify_failed();
                warn!("Boot notice not delivered");
            }
            delivered
        }
        .instrument(span)
        .await
    }

    /// Run one iteration up to, not including, the pause
    pub async fn tick(&mut self) -> TickOutcome {
        self.iterations += 1;
        metrics().iteration_started();

        let span = crate::iteration_span!(iteration = self.iterations);
        self.run_phases().instrument(span).await
    }

    async fn run_phases(&mut self) -> TickOutcome {
        let mut outcome = TickOutcome::new(self.iterations, self.interval);
        let mut reading: Option<Reading> = None;
        let mut phase = AgentPhase::EnsuringNetwork;

        while phase != AgentPhase::Sleeping {
            self.enter(phase);

            let result = match phase {
                AgentPhase::EnsuringNetwork => {
                    outcome.network = self.network.ensure_up().await;
                    if outcome.network.is_up() {
                        PhaseResult::Continue
                    } else {
                        // Keep the broker link consistent with the network
                        outcome.broker = self.broker.ensure_up(outcome.network).await;
                        PhaseResult::NetworkDown
                    }
                }
                AgentPhase::EnsuringBroker => {
                    outcome.broker = self.broker.ensure_up(outcome.network).await;
                    if outcome.broker.is_up() {
                        PhaseResult::Continue
                    } else {
                        PhaseResult::BrokerDown
                    }
                }
                AgentPhase::Sampling => match self.sampler.sample() {
                    Ok(sample) => {
                        metrics().reading_taken();
                        debug!(ph = sample.ph, orp = sample.orp, "Reading taken");
                        reading = Some(sample);
                        PhaseResult::Continue
                    }
                    Err(e) => {
                        metrics().sensor_failed();
                        warn!(error = %e, "Sensor read failed, skipping iteration");
                        PhaseResult::SensorFailed
                    }
                },
                AgentPhase::Publishing => {
                    if let Some(sample) = &reading {
                        outcome.published = Some(self.publish(sample).await);
                    }
                    PhaseResult::Continue
                }
                AgentPhase::Evaluating => {
                    if let Some(sample) = &reading {
                        outcome.alert = self.evaluate(sample).await;
                    }
                    PhaseResult::Continue
                }
                AgentPhase::Sleeping => PhaseResult::Continue,
            };

            match result {
                PhaseResult::NetworkDown => {
                    metrics().network_unavailable();
                    outcome.skipped = Some(SkipReason::NetworkUnavailable);
                }
                PhaseResult::BrokerDown => {
                    metrics().broker_unavailable();
                    outcome.skipped = Some(SkipReason::BrokerUnavailable);
                }
                PhaseResult::SensorFailed => outcome.skipped = Some(SkipReason::SensorFailed),
                PhaseResult::Continue => {}
            }

            phase = next_phase(phase, result);
        }

        if outcome.skipped.is_some_and(|reason| reason.is_connectivity()) {
            outcome.sleep = self.penalty;
        }
        self.enter(AgentPhase::Sleeping);
        outcome
    }

    /// Fire-and-forget publish of one reading
    async fn publish(&mut self, reading: &Reading) -> bool {
        let payload = match TelemetryPayload::from_reading(reading).to_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                metrics().publish_failed();
                warn!(error = %e, "Failed to encode reading");
                return false;
            }
        };

        let span = crate::mqtt_span!(operation = "publish", topic = %self.topic);
        match self.broker.publish(&self.topic, payload).instrument(span).await {
            Ok(()) => {
                metrics().message_published();
                debug!(topic = %self.topic, "Reading published");
                true
            }
            Err(e) => {
                metrics().publish_failed();
                warn!(
                    topic = %self.topic,
                    error = %sanitize_error_message(&e.to_string()),
                    "Publish failed, reading dropped"
                );
                false
            }
        }
    }

    async fn evaluate(&mut self, reading: &Reading) -> AlertOutcome {
        match self.evaluator.decide(reading, self.clock.now()) {
            AlertDecision::InRange => AlertOutcome::InRange,
            AlertDecision::Suppressed { remaining } => {
                metrics().alert_suppressed();
                debug!(
                    remaining_ms = remaining.as_millis() as u64,
                    "Out of range, alert suppressed by cooldown"
                );
                AlertOutcome::Suppressed
            }
            AlertDecision::Fire(event) => {
                let fields: Vec<String> = event.violated.iter().map(ToString::to_string).collect();
                warn!(violated = ?fields, ph = reading.ph, orp = reading.orp, "Reading out of range");

                let text = alert_message(&event);
                let delivered = self
                    .notifier
                    .send(&text)
                    .instrument(crate::notify_span!(kind = "alert", violated = ?fields))
                    .await;
                if delivered {
                    metrics().alert_sent();
                    AlertOutcome::Sent(event.violated)
                } else {
                    metrics().notify_failed();
                    warn!("Alert not delivered");
                    AlertOutcome::DeliveryFailed(event.violated)
                }
            }
        }
    }

    /// Run `iterations` ticks, each followed by its pause
    pub async fn run_for(&mut self, iterations: usize) -> Vec<TickOutcome> {
        let mut outcomes = Vec::with_capacity(iterations);
        for _ in 0..iterations {
            let outcome = self.tick().await;
            self.clock.sleep(outcome.sleep).await;
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Tick forever
    pub async fn run(&mut self) {
        info!(device = %self.device_id, topic = %self.topic, "Telemetry loop started");
        loop {
            let outcome = self.tick().await;
            self.clock.sleep(outcome.sleep).await;
        }
    }

    /// Best-effort broker disconnect before the process exits
    pub async fn shutdown(&mut self) {
        if self.broker.state() != ConnectionState::Down {
            info!("Disconnecting from broker");
        }
        self.broker.disconnect().await;
        metrics().set_agent_phase("stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::{
        ManualClock, MockAnalogSource, MockBrokerSession, MockNetworkDriver, MockNotifier,
    };

    struct Harness {
        clock: Arc<ManualClock>,
        driver: MockNetworkDriver,
        session: MockBrokerSession,
        notifier: MockNotifier,
        agent: TelemetryAgent<MockNetworkDriver, MockBrokerSession>,
    }

    fn harness(driver: MockNetworkDriver, source: MockAnalogSource) -> Harness {
        let mut config = AgentConfig::test_config();
        // 1/32 steps over a 16 V span keep conversions exact
        config.sampler.max_raw = 32;
        config.sampler.reference_voltage = 16.0;
        config.thresholds.orp_low = 1.0;
        config.thresholds.orp_high = 15.0;

        let clock = Arc::new(ManualClock::new());
        let session = MockBrokerSession::new();
        let notifier = MockNotifier::new();
        let agent = TelemetryAgent::new(
            &config,
            driver.clone(),
            session.clone(),
            Box::new(source),
            Arc::new(notifier.clone()),
            clock.clone(),
        );
        Harness {
            clock,
            driver,
            session,
            notifier,
            agent,
        }
    }

    #[tokio::test]
    async fn test_tick_publishes_in_range_reading() {
        // raw 14 -> 7.0, raw 16 -> 8.0
        let mut h = harness(MockNetworkDriver::associated(), MockAnalogSource::new(14, 16));
        let outcome = h.agent.tick().await;

        assert_eq!(outcome.network, ConnectionState::Up);
        assert_eq!(outcome.broker, ConnectionState::Up);
        assert_eq!(outcome.published, Some(true));
        assert_eq!(outcome.alert, AlertOutcome::InRange);
        assert_eq!(outcome.sleep, Duration::from_secs(5));
        assert_eq!(h.agent.phase(), AgentPhase::Sleeping);

        let published = h.session.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "sensors/water/tank1");
        let json: serde_json::Value = serde_json::from_slice(&published[0].1).unwrap();
        assert_eq!(json["ph"], 7.0);
        assert_eq!(json["orp"], 8.0);
        assert!(json["temp"].is_null());
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_network_down_skips_with_penalty() {
        let mut h = harness(MockNetworkDriver::never_associates(), MockAnalogSource::new(14, 16));
        let outcome = h.agent.tick().await;

        assert_eq!(outcome.skipped, Some(SkipReason::NetworkUnavailable));
        assert_eq!(outcome.sleep, Duration::from_secs(1));
        assert!(!outcome.publish_attempted());
        assert!(!outcome.alert.was_evaluated());
        assert_eq!(h.session.connect_attempts(), 0);
        assert_eq!(h.driver.connect_requests(), 1);
    }

    #[tokio::test]
    async fn test_sensor_failure_skips_publish_and_evaluate() {
        let source = MockAnalogSource::new(14, 16);
        source.set_failing(true);
        let mut h = harness(MockNetworkDriver::associated(), source);
        let outcome = h.agent.tick().await;

        assert_eq!(outcome.skipped, Some(SkipReason::SensorFailed));
        assert_eq!(outcome.sleep, Duration::from_secs(5));
        assert_eq!(h.session.publish_calls(), 0);
        assert!(!outcome.alert.was_evaluated());
    }

    #[tokio::test]
    async fn test_publish_failure_still_evaluates() {
        // raw 12 -> pH 6.0
        let mut h = harness(MockNetworkDriver::associated(), MockAnalogSource::new(12, 16));
        h.session.set_publish_failure(true);
        let outcome = h.agent.tick().await;

        assert_eq!(outcome.published, Some(false));
        assert!(outcome.alert.fired());
        assert_eq!(h.notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_boot_sends_notice_with_address() {
        let mut h = harness(MockNetworkDriver::associated(), MockAnalogSource::new(14, 16));
        assert!(h.agent.boot().await);
        assert_eq!(h.notifier.sent(), vec!["✅ tank1 booted. IP=192.168.1.40"]);
    }

    #[tokio::test]
    async fn test_boot_without_network_sends_nothing() {
        let mut h = harness(MockNetworkDriver::never_associates(), MockAnalogSource::new(14, 16));
        assert!(!h.agent.boot().await);
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_run_for_applies_outcome_sleeps() {
        let mut h = harness(MockNetworkDriver::associated(), MockAnalogSource::new(14, 16));
        let outcomes = h.agent.run_for(3).await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(h.agent.iterations(), 3);
        assert_eq!(h.clock.sleeps(), vec![Duration::from_secs(5); 3]);
        assert_eq!(h.session.published().len(), 3);
        assert_eq!(h.session.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_disconnects_broker() {
        let mut h = harness(MockNetworkDriver::associated(), MockAnalogSource::new(14, 16));
        h.agent.tick().await;
        h.agent.shutdown().await;

        assert_eq!(h.session.disconnects(), 1);
        assert_eq!(h.agent.broker().state(), ConnectionState::Down);
    }
}
