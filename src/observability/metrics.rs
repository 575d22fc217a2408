//! Thread-safe metrics collection system
//!
//! Atomic counters for the telemetry loop, the broker session and alert
//! delivery, read back as a serializable snapshot by the health server.

use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Global metrics collector instance
pub static METRICS: Lazy<MetricsCollector> = Lazy::new(MetricsCollector::new);

/// Get reference to global metrics collector
pub fn metrics() -> &'static MetricsCollector {
    &METRICS
}

/// Thread-safe metrics collector using atomics
pub struct MetricsCollector {
    // Loop metrics
    iterations: AtomicU64,
    network_unavailable: AtomicU64,
    broker_unavailable: AtomicU64,
    readings_taken: AtomicU64,
    sensor_failures: AtomicU64,
    last_reading_at: AtomicU64,

    // Broker metrics
    broker_connected: AtomicBool,
    connection_attempts: AtomicU64,
    connections_established: AtomicU64,
    connection_failures: AtomicU64,
    connections_lost: AtomicU64,
    messages_published: AtomicU64,
    publish_failures: AtomicU64,
    connection_start_time: AtomicU64,

    // Alert metrics
    alerts_sent: AtomicU64,
    alerts_suppressed: AtomicU64,
    notify_failures: AtomicU64,

    // Lifecycle metrics
    agent_phase: Mutex<String>,
    uptime_start: AtomicU64,
    phase_transitions: AtomicU64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            iterations: AtomicU64::new(0),
            network_unavailable: AtomicU64::new(0),
            broker_unavailable: AtomicU64::new(0),
            readings_taken: AtomicU64::new(0),
            sensor_failures: AtomicU64::new(0),
            last_reading_at: AtomicU64::new(0),
            broker_connected: AtomicBool::new(false),
            connection_attempts: AtomicU64::new(0),
            connections_established: AtomicU64::new(0),
            connection_failures: AtomicU64::new(0),
            connections_lost: AtomicU64::new(0),
            messages_published: AtomicU64::new(0),
            publish_failures: AtomicU64::new(0),
            connection_start_time: AtomicU64::new(0),
            alerts_sent: AtomicU64::new(0),
            alerts_suppressed: AtomicU64::new(0),
            notify_failures: AtomicU64::new(0),
            agent_phase: Mutex::new("booting".to_string()),
            uptime_start: AtomicU64::new(current_timestamp()),
            phase_transitions: AtomicU64::new(0),
        }
    }

    // Loop metrics
    pub fn iteration_started(&self) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn network_unavailable(&self) {
        self.network_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn broker_unavailable(&self) {
        self.broker_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reading_taken(&self) {
        self.readings_taken.fetch_add(1, Ordering::Relaxed);
        self.last_reading_at
            .store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn sensor_failed(&self) {
        self.sensor_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Broker metrics
    pub fn broker_connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn broker_connection_established(&self) {
        self.connections_established.fetch_add(1, Ordering::Relaxed);
        self.broker_connected.store(true, Ordering::Relaxed);
        self.connection_start_time
            .store(current_timestamp(), Ordering::Relaxed);
    }

    pub fn broker_connection_failed(&self) {
        self.connection_failures.fetch_add(1, Ordering::Relaxed);
        self.broker_connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    pub fn broker_connection_lost(&self) {
        self.connections_lost.fetch_add(1, Ordering::Relaxed);
        self.broker_connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    /// Session closed on our side; not counted as a loss
    pub fn broker_disconnected(&self) {
        self.broker_connected.store(false, Ordering::Relaxed);
        self.connection_start_time.store(0, Ordering::Relaxed);
    }

    pub fn message_published(&self) {
        self.messages_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn publish_failed(&self) {
        self.publish_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Alert metrics
    pub fn alert_sent(&self) {
        self.alerts_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn alert_suppressed(&self) {
        self.alerts_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn notify_failed(&self) {
        self.notify_failures.fetch_add(1, Ordering::Relaxed);
    }

    // Lifecycle metrics
    pub fn set_agent_phase(&self, phase: &str) {
        if let Ok(mut current) = self.agent_phase.lock() {
            if *current != phase {
                self.phase_transitions.fetch_add(1, Ordering::Relaxed);
                *current = phase.to_string();
            }
        }
    }

    // Reset all metrics (useful for testing)
    pub fn reset(&self) {
        for counter in [
            &self.iterations,
            &self.network_unavailable,
            &self.broker_unavailable,
            &self.readings_taken,
            &self.sensor_failures,
            &self.last_reading_at,
            &self.connection_attempts,
            &self.connections_established,
            &self.connection_failures,
            &self.connections_lost,
            &self.messages_published,
            &self.publish_failures,
            &self.connection_start_time,
            &self.alerts_sent,
            &self.alerts_suppressed,
            &self.notify_failures,
            &self.phase_transitions,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.broker_connected.store(false, Ordering::Relaxed);
        self.uptime_start
            .store(current_timestamp(), Ordering::Relaxed);
        if let Ok(mut phase) = self.agent_phase.lock() {
            *phase = "booting".to_string();
        }
    }

    /// Calculate connection duration (pure function)
    fn calculate_connection_duration(&self, now: u64) -> u64 {
        if !self.broker_connected.load(Ordering::Relaxed) {
            return 0;
        }
        let start_time = self.connection_start_time.load(Ordering::Relaxed);
        if start_time > 0 {
            now.saturating_sub(start_time)
        } else {
            0
        }
    }

    fn current_phase(&self) -> String {
        self.agent_phase
            .lock()
            .map(|s| s.clone())
            .unwrap_or_else(|_| "unknown".to_string())
    }

    /// Get complete metrics snapshot
    pub fn get_metrics(&self) -> MetricsSnapshot {
        let now = current_timestamp();

        MetricsSnapshot {
            telemetry: TelemetryMetrics {
                iterations: self.iterations.load(Ordering::Relaxed),
                network_unavailable: self.network_unavailable.load(Ordering::Relaxed),
                broker_unavailable: self.broker_unavailable.load(Ordering::Relaxed),
                readings_taken: self.readings_taken.load(Ordering::Relaxed),
                sensor_failures: self.sensor_failures.load(Ordering::Relaxed),
                last_reading_at: self.last_reading_at.load(Ordering::Relaxed),
            },
            broker: BrokerMetrics {
                connected: self.broker_connected.load(Ordering::Relaxed),
                connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
                connections_established: self.connections_established.load(Ordering::Relaxed),
                connection_failures: self.connection_failures.load(Ordering::Relaxed),
                connections_lost: self.connections_lost.load(Ordering::Relaxed),
                messages_published: self.messages_published.load(Ordering::Relaxed),
                publish_failures: self.publish_failures.load(Ordering::Relaxed),
                connection_duration_seconds: self.calculate_connection_duration(now),
            },
            alerts: AlertMetrics {
                alerts_sent: self.alerts_sent.load(Ordering::Relaxed),
                alerts_suppressed: self.alerts_suppressed.load(Ordering::Relaxed),
                notify_failures: self.notify_failures.load(Ordering::Relaxed),
            },
            lifecycle: LifecycleMetrics {
                current_phase: self.current_phase(),
                uptime_seconds: now.saturating_sub(self.uptime_start.load(Ordering::Relaxed)),
                phase_transitions: self.phase_transitions.load(Ordering::Relaxed),
            },
            timestamp: now,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

// Public metrics structures
#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub telemetry: TelemetryMetrics,
    pub broker: BrokerMetrics,
    pub alerts: AlertMetrics,
    pub lifecycle: LifecycleMetrics,
    pub timestamp: u64,
}

#[derive(Debug, Serialize)]
pub struct TelemetryMetrics {
    pub iterations: u64,
    pub network_unavailable: u64,
    pub broker_unavailable: u64,
    pub readings_taken: u64,
    pub sensor_failures: u64,
    pub last_reading_at: u64,
}

#[derive(Debug, Serialize)]
pub struct BrokerMetrics {
    pub connected: bool,
    pub connection_attempts: u64,
    pub connections_established: u64,
    pub connection_failures: u64,
    pub connections_lost: u64,
    pub messages_published: u64,
    pub publish_failures: u64,
    pub connection_duration_seconds: u64,
}

#[derive(Debug, Serialize)]
pub struct AlertMetrics {
    pub alerts_sent: u64,
    pub alerts_suppressed: u64,
    pub notify_failures: u64,
}

#[derive(Debug, Serialize)]
pub struct LifecycleMetrics {
    pub current_phase: String,
    pub uptime_seconds: u64,
    pub phase_transitions: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
