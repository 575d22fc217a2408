//! Threshold evaluation with a fire-rate limit
//!
//! A reading violates a bound only when strictly outside `[low, high]`; NaN
//! never violates. Once an alert fires, further violations are dropped (not
//! queued) until the cooldown has elapsed.

use crate::config::ThresholdConfig;
use crate::sensor::Reading;
use std::collections::BTreeSet;
use std::fmt;
use std::time::{Duration, Instant};

/// Measurement that left its allowed range
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ViolatedField {
    Ph,
    Orp,
}

impl fmt::Display for ViolatedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolatedField::Ph => write!(f, "ph"),
            ViolatedField::Orp => write!(f, "orp"),
        }
    }
}

/// An alert to deliver now
#[derive(Debug, Clone, PartialEq)]
pub struct AlertEvent {
    pub device_id: String,
    pub reading: Reading,
    pub violated: BTreeSet<ViolatedField>,
}

/// Result of one evaluation
#[derive(Debug, Clone, PartialEq)]
pub enum AlertDecision {
    InRange,
    Fire(AlertEvent),
    /// Out of range, but an alert fired less than `cooldown` ago
    Suppressed { remaining: Duration },
}

/// When the last alert fired
#[derive(Debug, Clone, PartialEq)]
pub struct AlertCooldown {
    pub last_fired_at: Option<Instant>,
    pub cooldown: Duration,
}

impl AlertCooldown {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            last_fired_at: None,
            cooldown,
        }
    }

    /// Time left before another alert may fire, `None` if one may fire now
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let last = self.last_fired_at?;
        let since = now.saturating_duration_since(last);
        (since < self.cooldown).then(|| self.cooldown - since)
    }
}

/// Pure bounds check
pub fn violations(thresholds: &ThresholdConfig, reading: &Reading) -> BTreeSet<ViolatedField> {
    let mut violated = BTreeSet::new();
    if reading.ph < thresholds.ph_low || reading.ph > thresholds.ph_high {
        violated.insert(ViolatedField::Ph);
    }
    if reading.orp < thresholds.orp_low || reading.orp > thresholds.orp_high {
        violated.insert(ViolatedField::Orp);
    }
    violated
}

pub struct AlertEvaluator {
    thresholds: ThresholdConfig,
    cooldown: AlertCooldown,
}

impl AlertEvaluator {
    pub fn new(thresholds: ThresholdConfig, cooldown: Duration) -> Self {
        Self {
            thresholds,
            cooldown: AlertCooldown::new(cooldown),
        }
    }

    pub fn thresholds(&self) -> &ThresholdConfig {
        &self.thresholds
    }

    pub fn cooldown(&self) -> &AlertCooldown {
        &self.cooldown
    }

    /// Evaluate a reading, stamping the cooldown when an alert fires
    pub fn decide(&mut self, reading: &Reading, now: Instant) -> AlertDecision {
        let violated = violations(&self.thresholds, reading);
        if violated.is_empty() {
            return AlertDecision::InRange;
        }

        if let Some(remaining) = self.cooldown.remaining(now) {
            return AlertDecision::Suppressed { remaining };
        }

        self.cooldown.last_fired_at = Some(now);
        AlertDecision::Fire(AlertEvent {
            device_id: reading.device_id.clone(),
            reading: reading.clone(),
            violated,
        })
    }

    pub fn evaluate(&mut self, reading: &Reading, now: Instant) -> Option<AlertEvent> {
        match self.decide(reading, now) {
            AlertDecision::Fire(event) => Some(event),
            AlertDecision::InRange | AlertDecision::Suppressed { .. } => None,
        }
    }
}
