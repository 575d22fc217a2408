//! Push notifications over the Telegram Bot API
//!
//! One POST per message, no retry. Delivery failures are logged (with the bot
//! token redacted) and reported as `false`; they never reach the caller as
//! errors.

use crate::alert::AlertEvent;
use crate::config::NotifierSection;
use crate::error::{sanitize_error_message, AgentError};
use async_trait::async_trait;
use reqwest::Client;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, warn};

/// Outbound messaging capability
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `text`; true when the service accepted it
    async fn send(&self, text: &str) -> bool;
}

/// Whether an HTTP status counts as delivered: `[1, 300)`
pub fn is_delivered(status: u16) -> bool {
    (1..300).contains(&status)
}

pub struct TelegramNotifier {
    client: Client,
    endpoint: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(config: &NotifierSection, bot_token: &str) -> Result<Self, AgentError> {
        if bot_token.is_empty() {
            return Err(AgentError::notify_error("Bot token is required"));
        }

        if config.insecure_tls {
            warn!("TLS certificate validation disabled for notifications");
        }

        // No idle connections are kept: every message opens a fresh one
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .pool_max_idle_per_host(0)
            .danger_accept_invalid_certs(config.insecure_tls)
            .build()
            .map_err(|e| AgentError::notify_error(sanitize_error_message(&e.to_string())))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/bot{}/sendMessage",
                config.api_base.trim_end_matches('/'),
                bot_token
            ),
            chat_id: config.chat_id.clone(),
        })
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, text: &str) -> bool {
        let result = self
            .client
            .post(&self.endpoint)
            .form(&[("chat_id", self.chat_id.as_str()), ("text", text)])
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                if is_delivered(status) {
                    debug!(status, "Notification delivered");
                    true
                } else {
                    warn!(status, "Notification rejected");
                    false
                }
            }
            Err(e) => {
                warn!(
                    error = %sanitize_error_message(&e.to_string()),
                    "Notification request failed"
                );
                false
            }
        }
    }
}

/// Startup notice
pub fn boot_message(device_id: &str, address: Option<IpAddr>) -> String {
    let address = address.map_or_else(|| "unknown".to_string(), |addr| addr.to_string());
    format!("✅ {device_id} booted. IP={address}")
}

/// Alert notice carrying the offending reading
pub fn alert_message(event: &AlertEvent) -> String {
    format!(
        "⚠️ {} out of range\nph={:.4}\norp={:.4}",
        event.device_id, event.reading.ph, event.reading.orp
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::ViolatedField;
    use crate::sensor::Reading;
    use chrono::Utc;
    use std::collections::BTreeSet;

    fn section() -> NotifierSection {
        NotifierSection {
            api_base: "https://api.telegram.org/".to_string(),
            bot_token_env: "TG_BOT_TOKEN".to_string(),
            chat_id: "123456789".to_string(),
            insecure_tls: false,
            timeout_ms: 1_000,
        }
    }

    #[test]
    fn test_status_classification() {
        assert!(is_delivered(200));
        assert!(is_delivered(204));
        assert!(is_delivered(101));
        assert!(!is_delivered(0));
        assert!(!is_delivered(300));
        assert!(!is_delivered(403));
        assert!(!is_delivered(500));
    }

    #[test]
    fn test_endpoint_built_from_base_and_token() {
        let notifier = TelegramNotifier::new(&section(), "42:abc").unwrap();
        assert_eq!(
            notifier.endpoint,
            "https://api.telegram.org/bot42:abc/sendMessage"
        );
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(matches!(
            TelegramNotifier::new(&section(), ""),
            Err(AgentError::NotifyError { .. })
        ));
    }

    #[test]
    fn test_boot_message() {
        assert_eq!(
            boot_message("tank1", Some(IpAddr::from([192, 168, 1, 40]))),
            "✅ tank1 booted. IP=192.168.1.40"
        );
        assert_eq!(boot_message("tank1", None), "✅ tank1 booted. IP=unknown");
    }

    #[test]
    fn test_alert_message() {
        let event = AlertEvent {
            device_id: "tank1".to_string(),
            reading: Reading {
                device_id: "tank1".to_string(),
                ph: 6.4,
                orp: 0.81234,
                temperature: f64::NAN,
                taken_at: Utc::now(),
            },
            violated: BTreeSet::from([ViolatedField::Ph]),
        };
        assert_eq!(
            alert_message(&event),
            "⚠️ tank1 out of range\nph=6.4000\norp=0.8123"
        );
    }
}
