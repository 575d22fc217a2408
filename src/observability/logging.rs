//! Structured logging for the telemetry agent
//!
//! Output is configured from the environment once at startup:
//!
//! - `LOG_LEVEL`: ERROR, WARN, INFO, DEBUG or TRACE (default INFO)
//! - `LOG_FORMAT`: `json`, `pretty` or `compact` (default json)
//! - `LOG_SPANS`: `true` to log span open/close events
//! - `RUST_LOG`: replaces the whole filter when set
//!
//! ```bash
//! # On the device, shipped to a log collector
//! LOG_FORMAT=json ./hydroagent run
//!
//! # On a bench, watching one probe
//! LOG_FORMAT=compact LOG_LEVEL=DEBUG ./hydroagent sample
//! ```
//!
//! The span macros at the bottom tag every record emitted during one loop
//! iteration, broker operation or notification.

use std::env;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Dependencies that only log at WARN and above unless `RUST_LOG` says otherwise
const QUIET_TARGETS: [&str; 5] = ["rumqttc", "hyper", "reqwest", "warp", "tokio"];

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line
    Json,
    /// Multi-line, colored
    Pretty,
    /// Single line, colored, no targets
    Compact,
}

impl LogFormat {
    /// Parse a `LOG_FORMAT` value; anything unknown is JSON
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Json,
        }
    }
}

/// Parse a `LOG_LEVEL` value, falling back to INFO
pub fn parse_level(s: &str) -> Level {
    match s.to_uppercase().as_str() {
        "ERROR" => Level::ERROR,
        "WARN" => Level::WARN,
        "DEBUG" => Level::DEBUG,
        "TRACE" => Level::TRACE,
        _ => Level::INFO,
    }
}

/// Resolved logging configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
    pub level: Level,
    pub format: LogFormat,
    pub include_spans: bool,
    /// Raw `RUST_LOG`, used instead of the level-based filter
    pub filter_override: Option<String>,
}

impl LogSettings {
    /// Resolve settings through `lookup`, which maps a variable name to its value
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            level: lookup("LOG_LEVEL").map_or(Level::INFO, |v| parse_level(&v)),
            format: lookup("LOG_FORMAT").map_or(LogFormat::Json, |v| LogFormat::parse(&v)),
            include_spans: lookup("LOG_SPANS").is_some_and(|v| v.eq_ignore_ascii_case("true")),
            filter_override: lookup("RUST_LOG").filter(|v| !v.trim().is_empty()),
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same settings with the level replaced, e.g. from `-v` flags
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Filter directives this configuration installs
    pub fn filter(&self) -> EnvFilter {
        match &self.filter_override {
            Some(directives) => EnvFilter::new(directives),
            None => QUIET_TARGETS
                .iter()
                .filter_map(|target| format!("{target}=warn").parse().ok())
                .fold(EnvFilter::new(self.level.to_string()), |filter, directive| {
                    filter.add_directive(directive)
                }),
        }
    }

    fn span_events(&self) -> FmtSpan {
        if self.include_spans {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }

    /// Install the global subscriber. A second call is a no-op.
    pub fn install(&self) {
        let subscriber = tracing_subscriber::registry().with(self.filter());

        let result = match self.format {
            LogFormat::Json => subscriber
                .with(fmt::layer().json().with_span_events(self.span_events()))
                .try_init(),
            LogFormat::Pretty => subscriber
                .with(
                    fmt::layer()
                        .pretty()
                        .with_ansi(true)
                        .with_span_events(self.span_events()),
                )
                .try_init(),
            LogFormat::Compact => subscriber
                .with(
                    fmt::layer()
                        .compact()
                        .with_ansi(true)
                        .with_target(false)
                        .with_span_events(self.span_events()),
                )
                .try_init(),
        };

        if result.is_err() {
            tracing::debug!("Logging already initialized");
        }
    }
}

/// Initialize logging entirely from environment variables
pub fn init_default_logging() {
    LogSettings::from_env().install();
}

/// Initialize logging from environment variables with an explicit level
pub fn init_logging_with_level(level: Level) {
    LogSettings::from_env().with_level(level).install();
}

/// Create a span covering one loop iteration
#[macro_export]
macro_rules! iteration_span {
    ($($field:tt)*) => {
        tracing::info_span!("loop_iteration", $($field)*)
    };
}

/// Create a notification delivery span
#[macro_export]
macro_rules! notify_span {
    ($($field:tt)*) => {
        tracing::info_span!("notification", $($field)*)
    };
}

/// Create an MQTT operation span
#[macro_export]
macro_rules! mqtt_span {
    ($($field:tt)*) => {
        tracing::info_span!("mqtt_operation", $($field)*)
    };
}

/// Create a lifecycle event span
#[macro_export]
macro_rules! lifecycle_span {
    ($($field:tt)*) => {
        tracing::info_span!("lifecycle_event", $($field)*)
    };
}

// Re-export macros for convenience
pub use {iteration_span, lifecycle_span, mqtt_span, notify_span};

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolve(vars: &[(&str, &str)]) -> LogSettings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LogSettings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_without_environment() {
        let settings = resolve(&[]);
        assert_eq!(settings.level, Level::INFO);
        assert_eq!(settings.format, LogFormat::Json);
        assert!(!settings.include_spans);
        assert_eq!(settings.filter_override, None);
    }

    #[test]
    fn test_environment_values_applied() {
        let settings = resolve(&[
            ("LOG_LEVEL", "debug"),
            ("LOG_FORMAT", "Compact"),
            ("LOG_SPANS", "TRUE"),
        ]);
        assert_eq!(settings.level, Level::DEBUG);
        assert_eq!(settings.format, LogFormat::Compact);
        assert!(settings.include_spans);
    }

    #[test]
    fn test_only_literal_true_enables_spans() {
        for value in ["yes", "1", "", "on"] {
            assert!(!resolve(&[("LOG_SPANS", value)]).include_spans, "{value:?}");
        }
    }

    #[test]
    fn test_verbosity_overrides_environment_level() {
        let settings = resolve(&[("LOG_LEVEL", "ERROR")]).with_level(Level::TRACE);
        assert_eq!(settings.level, Level::TRACE);
    }

    #[test]
    fn test_filter_quiets_dependencies() {
        let filter = resolve(&[("LOG_LEVEL", "DEBUG")]).filter().to_string();
        assert!(filter.contains("debug"));
        assert!(filter.contains("rumqttc=warn"));
        assert!(filter.contains("reqwest=warn"));
    }

    #[test]
    fn test_rust_log_replaces_filter() {
        let filter = resolve(&[("RUST_LOG", "hydroagent=trace")]).filter().to_string();
        assert!(filter.contains("hydroagent=trace"));
        assert!(!filter.contains("rumqttc"));

        assert_eq!(resolve(&[("RUST_LOG", "  ")]).filter_override, None);
    }

    #[test]
    fn test_span_macros_build_spans() {
        let _iteration = iteration_span!(iteration = 1u64);
        let _notify = notify_span!(kind = "alert");
        let _mqtt = mqtt_span!(operation = "publish", topic = "sensors/water/tank1");
        let _lifecycle = lifecycle_span!(event = "boot");
    }
}
