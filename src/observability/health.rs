//! Health check HTTP server
//!
//! Serves `/health`, `/live` and `/metrics` from the process-global metrics,
//! so the agent loop never has to push state into the server.

use crate::observability::metrics::{metrics, MetricsSnapshot};
use serde::Serialize;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use warp::http::StatusCode;
use warp::Filter;

/// Readings older than this mark the telemetry check stale
const READING_STALENESS_THRESHOLD_SECONDS: u64 = 300;

/// HTTP health check server
pub struct HealthServer {
    device_id: String,
    port: u16,
}

impl HealthServer {
    pub fn new(device_id: String, port: u16) -> Self {
        Self { device_id, port }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Route table, separate from `start` so it can be exercised in-process
    pub fn routes(
        self: Arc<Self>,
    ) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
        let health_server = self.clone();

        // GET /health - broker and telemetry checks
        let health_route = warp::path("health")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(move || {
                let server = health_server.clone();
                async move {
                    let status = build_health_status(
                        &server.device_id,
                        &metrics().get_metrics(),
                        current_timestamp(),
                    );
                    let status_code = if status.status == "healthy" {
                        StatusCode::OK
                    } else {
                        StatusCode::SERVICE_UNAVAILABLE
                    };
                    Ok::<_, Infallible>(warp::reply::with_status(
                        warp::reply::json(&status),
                        status_code,
                    ))
                }
            });

        // GET /metrics - complete metrics export
        let metrics_route = warp::path("metrics")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(|| async move {
                Ok::<_, Infallible>(warp::reply::json(&metrics().get_metrics()))
            });

        // GET /live - liveness probe
        let live_route = warp::path("live")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(|| async move {
                let response = LivenessResponse {
                    alive: true,
                    timestamp: current_timestamp(),
                };
                Ok::<_, Infallible>(warp::reply::json(&response))
            });

        health_route.or(metrics_route).or(live_route)
    }

    /// Start the HTTP health server
    pub async fn start(self: Arc<Self>) {
        let port = self.port;
        let routes = self.routes();

        tracing::info!("Starting health server on port {}", port);

        warp::serve(routes).run(([0, 0, 0, 0], port)).await;
    }
}

/// Derive the health document from a metrics snapshot (pure function)
pub fn build_health_status(device_id: &str, snapshot: &MetricsSnapshot, now: u64) -> HealthStatus {
    let mut checks = HashMap::new();
    checks.insert("broker".to_string(), check_broker(snapshot, now));
    checks.insert("telemetry".to_string(), check_telemetry(snapshot, now));

    let overall_healthy = checks.values().all(|check| check.status == "healthy");

    HealthStatus {
        status: if overall_healthy { "healthy" } else { "degraded" }.to_string(),
        timestamp: now,
        device_id: device_id.to_string(),
        uptime_seconds: snapshot.lifecycle.uptime_seconds,
        phase: snapshot.lifecycle.current_phase.clone(),
        checks,
    }
}

fn check_broker(snapshot: &MetricsSnapshot, now: u64) -> HealthCheck {
    if snapshot.broker.connected {
        HealthCheck {
            status: "healthy".to_string(),
            message: Some("Broker session established".to_string()),
            last_check: now,
        }
    } else {
        HealthCheck {
            status: "unhealthy".to_string(),
            message: Some("Broker session down".to_string()),
            last_check: now,
        }
    }
}

fn check_telemetry(snapshot: &MetricsSnapshot, now: u64) -> HealthCheck {
    let last_reading = snapshot.telemetry.last_reading_at;

    if last_reading == 0 {
        HealthCheck {
            status: "healthy".to_string(),
            message: Some("No readings taken yet".to_string()),
            last_check: now,
        }
    } else if now.saturating_sub(last_reading) > READING_STALENESS_THRESHOLD_SECONDS {
        let stale_duration = now - last_reading;
        HealthCheck {
            status: "stale".to_string(),
            message: Some(format!("No reading for {stale_duration} seconds")),
            last_check: now,
        }
    } else {
        HealthCheck {
            status: "healthy".to_string(),
            message: Some("Recent reading".to_string()),
            last_check: now,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthCheck {
    pub status: String,
    pub message: Option<String>,
    pub last_check: u64,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: u64,
    pub device_id: String,
    pub uptime_seconds: u64,
    pub phase: String,
    pub checks: HashMap<String, HealthCheck>,
}

#[derive(Debug, Serialize)]
struct LivenessResponse {
    alive: bool,
    timestamp: u64,
}

fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::metrics::MetricsCollector;

    #[test]
    fn test_health_server_creation() {
        let health_server = HealthServer::new("tank1".to_string(), 8080);
        assert_eq!(health_server.device_id, "tank1");
        assert_eq!(health_server.port(), 8080);
    }

    #[test]
    fn test_health_check_logic() {
        let collector = MetricsCollector::new();
        let now = current_timestamp();

        let status = build_health_status("tank1", &collector.get_metrics(), now);
        assert_eq!(status.status, "degraded");
        assert_eq!(status.checks["broker"].status, "unhealthy");
        assert_eq!(status.checks["telemetry"].status, "healthy");

        collector.broker_connection_established();
        collector.reading_taken();
        let status = build_health_status("tank1", &collector.get_metrics(), now);
        assert_eq!(status.status, "healthy");
        assert_eq!(status.device_id, "tank1");
    }

    #[test]
    fn test_stale_readings_degrade_health() {
        let collector = MetricsCollector::new();
        collector.broker_connection_established();
        collector.reading_taken();

        let later = current_timestamp() + READING_STALENESS_THRESHOLD_SECONDS + 60;
        let status = build_health_status("tank1", &collector.get_metrics(), later);
        assert_eq!(status.checks["telemetry"].status, "stale");
        assert_eq!(status.status, "degraded");
    }

    #[tokio::test]
    async fn test_live_route() {
        let routes = Arc::new(HealthServer::new("tank1".to_string(), 0)).routes();
        let response = warp::test::request()
            .method("GET")
            .path("/live")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["alive"], true);
    }

    #[tokio::test]
    async fn test_metrics_route() {
        let routes = Arc::new(HealthServer::new("tank1".to_string(), 0)).routes();
        let response = warp::test::request()
            .method("GET")
            .path("/metrics")
            .reply(&routes)
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert!(body.get("broker").is_some());
        assert!(body.get("telemetry").is_some());
    }

    #[tokio::test]
    async fn test_health_route_reports_device() {
        let routes = Arc::new(HealthServer::new("tank1".to_string(), 0)).routes();
        let response = warp::test::request()
            .method("GET")
            .path("/health")
            .reply(&routes)
            .await;
        // Healthy or degraded depending on global metrics, but always a document
        assert!(
            response.status() == StatusCode::OK
                || response.status() == StatusCode::SERVICE_UNAVAILABLE
        );
        let body: serde_json::Value = serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body["device_id"], "tank1");
    }
}
