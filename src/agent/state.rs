//! Phases of one loop iteration and the pure transition table between them

use crate::alert::ViolatedField;
use crate::transport::ConnectionState;
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// Where the agent is within an iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AgentPhase {
    #[default]
    EnsuringNetwork,
    EnsuringBroker,
    Sampling,
    Publishing,
    Evaluating,
    Sleeping,
}

impl AgentPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentPhase::EnsuringNetwork => "ensuring_network",
            AgentPhase::EnsuringBroker => "ensuring_broker",
            AgentPhase::Sampling => "sampling",
            AgentPhase::Publishing => "publishing",
            AgentPhase::Evaluating => "evaluating",
            AgentPhase::Sleeping => "sleeping",
        }
    }
}

impl fmt::Display for AgentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a phase ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseResult {
    Continue,
    NetworkDown,
    BrokerDown,
    SensorFailed,
}

/// Transition table (pure function)
///
/// Every phase advances unconditionally except the three early exits to
/// `Sleeping`: no network, no broker session and a failed sensor read.
pub fn next_phase(current: AgentPhase, result: PhaseResult) -> AgentPhase {
    use AgentPhase::*;

    match (current, result) {
        (EnsuringNetwork, PhaseResult::NetworkDown) => Sleeping,
        (EnsuringNetwork, _) => EnsuringBroker,
        (EnsuringBroker, PhaseResult::BrokerDown) => Sleeping,
        (EnsuringBroker, _) => Sampling,
        (Sampling, PhaseResult::SensorFailed) => Sleeping,
        (Sampling, _) => Publishing,
        (Publishing, _) => Evaluating,
        (Evaluating, _) => Sleeping,
        (Sleeping, _) => EnsuringNetwork,
    }
}

/// Why an iteration stopped before publishing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NetworkUnavailable,
    BrokerUnavailable,
    SensorFailed,
}

impl SkipReason {
    /// Connectivity skips take the short penalty pause instead of the
    /// regular interval
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            SkipReason::NetworkUnavailable | SkipReason::BrokerUnavailable
        )
    }
}

/// What happened to the alert check this iteration
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AlertOutcome {
    #[default]
    NotEvaluated,
    InRange,
    Sent(BTreeSet<ViolatedField>),
    DeliveryFailed(BTreeSet<ViolatedField>),
    Suppressed,
}

impl AlertOutcome {
    pub fn was_evaluated(&self) -> bool {
        !matches!(self, AlertOutcome::NotEvaluated)
    }

    /// An alert fired, whether or not the service accepted it
    pub fn fired(&self) -> bool {
        matches!(
            self,
            AlertOutcome::Sent(_) | AlertOutcome::DeliveryFailed(_)
        )
    }
}

/// Result of one [`crate::agent::TelemetryAgent::tick`]
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    pub iteration: u64,
    pub network: ConnectionState,
    pub broker: ConnectionState,
    pub skipped: Option<SkipReason>,
    /// `None` when no publish was attempted
    pub published: Option<bool>,
    pub alert: AlertOutcome,
    /// Pause to apply before the next iteration
    pub sleep: Duration,
}

impl TickOutcome {
    pub fn new(iteration: u64, sleep: Duration) -> Self {
        Self {
            iteration,
            network: ConnectionState::Down,
            broker: ConnectionState::Down,
            skipped: None,
            published: None,
            alert: AlertOutcome::NotEvaluated,
            sleep,
        }
    }

    pub fn publish_attempted(&self) -> bool {
        self.published.is_some()
    }
}
