//! Topic construction and device ID validation
//!
//! Device IDs end up in MQTT topics and in the client identifier, so they are
//! restricted to a conservative character set. Publish topics must not carry
//! MQTT wildcards.

use thiserror::Error;

/// Default per-device telemetry topic: `sensors/water/<device_id>`
pub fn telemetry_topic(device_id: &str) -> String {
    format!("sensors/water/{device_id}")
}

/// Topic carrying the retained offline marker for a telemetry topic
pub fn status_topic(telemetry_topic: &str) -> String {
    format!("{}/status", telemetry_topic.trim_end_matches('/'))
}

pub fn validate_device_id(device_id: &str) -> Result<(), ValidationError> {
    if device_id.is_empty() {
        return Err(ValidationError::EmptyDeviceId);
    }

    for ch in device_id.chars() {
        if !ch.is_ascii_alphanumeric() && ch != '.' && ch != '_' && ch != '-' {
            return Err(ValidationError::InvalidDeviceIdChar(ch));
        }
    }

    Ok(())
}

/// Check a topic is usable for PUBLISH
pub fn validate_publish_topic(topic: &str) -> Result<(), ValidationError> {
    if topic.is_empty() {
        return Err(ValidationError::EmptyTopic);
    }
    if topic.len() > u16::MAX as usize {
        return Err(ValidationError::TopicTooLong(topic.len()));
    }
    if let Some(ch) = topic.chars().find(|c| matches!(c, '+' | '#' | '\0')) {
        return Err(ValidationError::InvalidTopicChar(ch));
    }
    Ok(())
}

/// Validation errors for identities and topics
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Device ID cannot be empty")]
    EmptyDeviceId,
    #[error("Device ID contains invalid character: '{0}'")]
    InvalidDeviceIdChar(char),
    #[error("Topic cannot be empty")]
    EmptyTopic,
    #[error("Topic is {0} bytes, longer than MQTT allows")]
    TopicTooLong(usize),
    #[error("Topic contains character not allowed in a publish topic: {0:?}")]
    InvalidTopicChar(char),
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_topic_construction() {
        assert_eq!(telemetry_topic("tank1"), "sensors/water/tank1");
        assert_eq!(status_topic("sensors/water/tank1"), "sensors/water/tank1/status");
        assert_eq!(status_topic("sensors/water/tank1/"), "sensors/water/tank1/status");
    }

    proptest! {
        #[test]
        fn test_valid_device_id_format(id in "[a-zA-Z0-9._-]{1,64}") {
            prop_assert!(validate_device_id(&id).is_ok(), "Valid device ID should pass: {}", id);
        }

        #[test]
        fn test_invalid_device_id_chars(id in "[^a-zA-Z0-9._-]{1}[a-zA-Z0-9._-]*") {
            prop_assert!(validate_device_id(&id).is_err(), "Invalid device ID should fail: {}", id);
        }

        #[test]
        fn telemetry_topic_of_valid_id_is_publishable(id in "[a-zA-Z0-9._-]{1,64}") {
            prop_assert!(validate_publish_topic(&telemetry_topic(&id)).is_ok());
            prop_assert!(validate_publish_topic(&status_topic(&telemetry_topic(&id))).is_ok());
        }
    }

    #[test]
    fn test_device_id_validation_examples() {
        assert!(validate_device_id("tank1").is_ok());
        assert!(validate_device_id("tank_1.a-b").is_ok());

        assert_eq!(validate_device_id(""), Err(ValidationError::EmptyDeviceId));
        assert_eq!(
            validate_device_id("tank/1"),
            Err(ValidationError::InvalidDeviceIdChar('/'))
        );
        assert_eq!(
            validate_device_id("tank 1"),
            Err(ValidationError::InvalidDeviceIdChar(' '))
        );
        assert!(validate_device_id("tank#1").is_err());
    }

    #[test]
    fn test_publish_topic_validation() {
        assert!(validate_publish_topic("sensors/water/tank1").is_ok());
        assert_eq!(validate_publish_topic(""), Err(ValidationError::EmptyTopic));
        assert_eq!(
            validate_publish_topic("sensors/+/tank1"),
            Err(ValidationError::InvalidTopicChar('+'))
        );
        assert_eq!(
            validate_publish_topic("sensors/#"),
            Err(ValidationError::InvalidTopicChar('#'))
        );
        assert!(matches!(
            validate_publish_topic(&"a".repeat(70_000)),
            Err(ValidationError::TopicTooLong(70_000))
        ));
    }
}
