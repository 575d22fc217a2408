//! Error types for the telemetry agent
//!
//! Each concern owns a focused error enum; [`AgentError`] folds them together
//! for the few call sites (startup, CLI) where errors actually propagate. Once
//! the main loop runs, errors are logged through [`sanitize_error_message`]
//! and swallowed.

use crate::config::ConfigError;
use crate::sensor::SensorError;
use crate::transport::mqtt::MqttError;
use crate::transport::network::NetworkError;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Main error type for agent operations
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error("Network error: {0}")]
    NetworkError(#[from] NetworkError),

    #[error("Broker error: {0}")]
    BrokerError(#[from] MqttError),

    #[error("Sensor error: {0}")]
    SensorError(#[from] SensorError),

    #[error("Notification failed: {message}")]
    NotifyError { message: String },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

impl AgentError {
    /// Create notification error
    pub fn notify_error<S: Into<String>>(message: S) -> Self {
        Self::NotifyError {
            message: message.into(),
        }
    }

    /// Error text safe to write to logs
    pub fn sanitized(&self) -> String {
        sanitize_error_message(&self.to_string())
    }
}

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("valid secret pattern")
});

// Telegram bot tokens travel in the URL path: /bot<digits>:<secret>/
static BOT_TOKEN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"bot\d+:[A-Za-z0-9_-]+").expect("valid bot token pattern"));

/// Sanitize error messages so credentials never reach the logs
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN
        .replace_all(message, "${1}=***")
        .to_string();

    sanitized = BOT_TOKEN_PATTERN
        .replace_all(&sanitized, "bot***")
        .to_string();

    // Truncate very long messages - ensure total length is <= 500
    if sanitized.len() > 500 {
        let truncate_suffix = "...[truncated]";
        let mut cut = 500 - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for agent operations
pub type AgentResult<T> = Result<T, AgentError>;
