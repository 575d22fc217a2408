//! End-to-end behavior of the telemetry loop against mock capabilities
//!
//! Every wait runs on a manual clock, so minutes of simulated time pass
//! instantly and timing assertions are exact.


use hydroagent::agent::{AlertOutcome, SkipReason};
use hydroagent::alert::ViolatedField;
use hydroagent::protocol::TelemetryPayload;
use hydroagent::testing::mocks::{MockAnalogSource, MockBrokerSession, MockNetworkDriver};
use hydroagent::transport::ConnectionState;
use std::collections::BTreeSet;
use std::time::Duration;
use test_helpers::{harness, harness_with, test_config};

#[tokio::test]
async fn test_ph_on_lower_bound_does_not_alert() {
    let mut h = harness(65, 80);
    let outcome = h.agent.tick().await;

    assert_eq!(outcome.published, Some(true));
    assert_eq!(outcome.alert, AlertOutcome::InRange);
    assert!(h.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_ph_below_lower_bound_alerts_on_ph_only() {
    let mut h = harness(64, 80);
    let outcome = h.agent.tick().await;

    assert_eq!(
        outcome.alert,
        AlertOutcome::Sent(BTreeSet::from([ViolatedField::Ph]))
    );
    assert_eq!(
        h.notifier.sent(),
        vec!["⚠️ tank1 out of range\nph=6.4000\norp=8.0000"]
    );
}

#[tokio::test]
async fn test_two_bad_readings_ten_seconds_apart_notify_once() {
    let mut config = test_config();
    config.agent.interval_ms = 10_000;
    let mut h = harness_with(
        &config,
        MockNetworkDriver::associated(),
        MockBrokerSession::new(),
        MockAnalogSource::new(50, 80),
    );

    let outcomes = h.agent.run_for(2).await;

    assert!(outcomes[0].alert.fired());
    assert_eq!(outcomes[1].alert, AlertOutcome::Suppressed);
    assert_eq!(h.notifier.sent().len(), 1);
    // Suppressed readings are still published
    assert_eq!(h.session.published().len(), 2);
}

#[tokio::test]
async fn test_alert_fires_again_once_cooldown_elapsed() {
    let mut config = test_config();
    config.agent.interval_ms = 10_000;
    let mut h = harness_with(
        &config,
        MockNetworkDriver::associated(),
        MockBrokerSession::new(),
        MockAnalogSource::new(50, 80),
    );

    // Evaluations at 0, 10, ..., 60 s: fires at 0 and 60
    let outcomes = h.agent.run_for(7).await;
    let fired: Vec<usize> = outcomes
        .iter()
        .enumerate()
        .filter(|(_, o)| o.alert.fired())
        .map(|(i, _)| i)
        .collect();

    assert_eq!(fired, vec![0, 6]);
    assert_eq!(h.notifier.sent().len(), 2);
}

#[tokio::test]
async fn test_network_never_up_skips_everything_and_keeps_looping() {
    let mut h = harness_with(
        &test_config(),
        MockNetworkDriver::never_associates(),
        MockBrokerSession::new(),
        MockAnalogSource::new(50, 80),
    );

    let outcomes = h.agent.run_for(3).await;

    assert_eq!(h.agent.iterations(), 3);
    for outcome in &outcomes {
        assert_eq!(outcome.network, ConnectionState::Down);
        assert_eq!(outcome.broker, ConnectionState::Down);
        assert_eq!(outcome.skipped, Some(SkipReason::NetworkUnavailable));
        assert!(!outcome.publish_attempted());
        assert!(!outcome.alert.was_evaluated());
        assert_eq!(outcome.sleep, Duration::from_secs(1));
    }
    assert_eq!(h.session.publish_calls(), 0);
    assert_eq!(h.session.connect_attempts(), 0);
    assert!(h.source.reads().is_empty());
    assert!(h.notifier.sent().is_empty());
    assert_eq!(h.driver.connect_requests(), 3);
}

#[tokio::test]
async fn test_network_wait_is_bounded() {
    let mut h = harness_with(
        &test_config(),
        MockNetworkDriver::never_associates(),
        MockBrokerSession::new(),
        MockAnalogSource::new(70, 80),
    );

    h.agent.tick().await;
    let waited = h.clock.elapsed();
    assert!(waited >= Duration::from_secs(20));
    assert!(waited <= Duration::from_millis(20_300));
}

#[tokio::test]
async fn test_publish_only_while_both_links_up() {
    let mut h = harness(70, 80);

    h.agent.run_for(2).await;

    // Network drops and stays down for one iteration
    h.driver.set_associated(false);
    h.driver.set_reassociate(false);
    let outcome = h.agent.tick().await;
    assert_eq!(outcome.skipped, Some(SkipReason::NetworkUnavailable));
    assert_eq!(outcome.broker, ConnectionState::Down);
    assert_eq!(h.agent.broker().state(), ConnectionState::Down);
    assert_eq!(h.session.disconnects(), 1);

    // Network comes back: broker session is rebuilt before publishing
    h.driver.set_reassociate(true);
    let outcome = h.agent.tick().await;
    assert_eq!(outcome.published, Some(true));

    assert_eq!(h.session.connect_attempts(), 2);
    assert_eq!(h.session.published().len(), 3);
    assert!(h.session.publish_preconditions().iter().all(|up| *up));
}

#[tokio::test]
async fn test_broker_retries_until_accepted_with_fixed_client_id() {
    let mut h = harness_with(
        &test_config(),
        MockNetworkDriver::associated(),
        MockBrokerSession::failing_connects(3),
        MockAnalogSource::new(70, 80),
    );

    let outcome = h.agent.tick().await;

    assert_eq!(outcome.broker, ConnectionState::Up);
    assert_eq!(outcome.published, Some(true));
    assert_eq!(h.session.connect_attempts(), 4);
    assert_eq!(h.session.last_client_id().as_deref(), Some("esp32-tank1"));
    assert_eq!(h.clock.elapsed(), Duration::from_millis(3 * 500));
}

#[tokio::test]
async fn test_bounded_broker_policy_skips_iteration() {
    let mut config = test_config();
    config.mqtt.retry.max_attempts = Some(2);
    let mut h = harness_with(
        &config,
        MockNetworkDriver::associated(),
        MockBrokerSession::failing_connects(u32::MAX),
        MockAnalogSource::new(50, 80),
    );

    let outcome = h.agent.tick().await;

    assert_eq!(outcome.skipped, Some(SkipReason::BrokerUnavailable));
    assert_eq!(outcome.sleep, Duration::from_secs(1));
    assert!(!outcome.alert.was_evaluated());
    assert_eq!(h.session.publish_calls(), 0);
    assert_eq!(h.session.connect_attempts(), 2);
}

#[tokio::test]
async fn test_lost_broker_session_reconnects_next_iteration() {
    let mut h = harness(70, 80);

    h.agent.tick().await;
    h.session.drop_connection();
    let outcome = h.agent.tick().await;

    assert_eq!(outcome.published, Some(true));
    assert_eq!(h.session.connect_attempts(), 2);
    assert_eq!(h.agent.broker().reconnect_count(), 1);
}

#[tokio::test]
async fn test_failed_publish_is_dropped_not_retried() {
    let mut h = harness(70, 80);
    h.session.set_publish_failure(true);

    let outcomes = h.agent.run_for(2).await;

    assert!(outcomes.iter().all(|o| o.published == Some(false)));
    assert_eq!(h.session.publish_calls(), 2);
    assert!(h.session.published().is_empty());
    assert_eq!(h.agent.broker().state(), ConnectionState::Up);
}

#[tokio::test]
async fn test_undelivered_alert_still_starts_cooldown() {
    let mut config = test_config();
    config.agent.interval_ms = 10_000;
    let mut h = harness_with(
        &config,
        MockNetworkDriver::associated(),
        MockBrokerSession::new(),
        MockAnalogSource::new(50, 80),
    );
    h.notifier.set_succeed(false);

    let outcomes = h.agent.run_for(2).await;

    assert_eq!(
        outcomes[0].alert,
        AlertOutcome::DeliveryFailed(BTreeSet::from([ViolatedField::Ph]))
    );
    assert_eq!(outcomes[1].alert, AlertOutcome::Suppressed);
    assert_eq!(h.notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_sensor_failure_recovers_next_iteration() {
    let mut h = harness(70, 80);
    h.source.set_failing(true);
    let failed = h.agent.tick().await;
    h.source.set_failing(false);
    let recovered = h.agent.tick().await;

    assert_eq!(failed.skipped, Some(SkipReason::SensorFailed));
    assert!(!failed.publish_attempted());
    assert_eq!(recovered.published, Some(true));
    assert_eq!(h.session.published().len(), 1);
}

#[tokio::test]
async fn test_published_payload_matches_reading() {
    let mut h = harness_with(
        &test_config(),
        MockNetworkDriver::associated(),
        MockBrokerSession::new(),
        MockAnalogSource::sequence(vec![71, 72], vec![81, 82]),
    );

    h.agent.run_for(2).await;

    let published = h.session.published();
    assert_eq!(published.len(), 2);
    let second: TelemetryPayload = serde_json::from_slice(&published[1].1).unwrap();
    assert_eq!(second.device, "tank1");
    assert!((second.ph - 7.2).abs() < 1e-9);
    assert!((second.orp - 8.2).abs() < 1e-9);
    assert_eq!(second.temp, None);

    let raw = String::from_utf8(published[0].1.clone()).unwrap();
    assert_eq!(raw, r#"{"device":"tank1","ph":7.1000,"orp":8.1000,"temp":null}"#);
}

#[tokio::test]
async fn test_boot_notice_then_loop() {
    let mut h = harness(70, 80);

    assert!(h.agent.boot().await);
    h.agent.run_for(1).await;

    assert_eq!(h.notifier.sent(), vec!["✅ tank1 booted. IP=192.168.1.40"]);
    assert_eq!(h.session.published().len(), 1);
}
