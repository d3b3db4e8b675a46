//! Engine response types.
//!
//! One [`RuleResponse`] per processed rule, aggregated into an
//! [`EngineResponse`] per admission event. Consumers serialize these into
//! admission-controller events and reports.

use std::fmt;
use std::time::Duration;

use jiff::Timestamp;
use serde::Serialize;
use serde_json::Value;

use crate::policy::ValidationFailureAction;

/// Outcome of a single rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RuleStatus {
    Pass,
    Fail,
    Skip,
    Error,
    Warn,
}

impl fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleStatus::Pass => write!(f, "pass"),
            RuleStatus::Fail => write!(f, "fail"),
            RuleStatus::Skip => write!(f, "skip"),
            RuleStatus::Error => write!(f, "error"),
            RuleStatus::Warn => write!(f, "warn"),
        }
    }
}

/// The kind of rule that produced a response. This engine only emits
/// validation responses; mutation and generation live in sibling engines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RuleType {
    Validation,
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleType::Validation => write!(f, "Validation"),
        }
    }
}

/// Result of applying one rule to one admission event.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleResponse {
    pub name: String,
    pub rule_type: RuleType,
    pub message: String,
    pub status: RuleStatus,
    /// Time spent processing this rule; stamped by the driver.
    pub processing_time: Duration,
    pub timestamp: Timestamp,
}

impl RuleResponse {
    /// Create a response with zeroed stats; the driver stamps timing
    /// when the response is appended.
    pub fn new(name: impl Into<String>, message: impl Into<String>, status: RuleStatus) -> Self {
        Self {
            name: name.into(),
            rule_type: RuleType::Validation,
            message: message.into(),
            status,
            processing_time: Duration::ZERO,
            timestamp: Timestamp::UNIX_EPOCH,
        }
    }
}

/// Policy identifiers copied into the response.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyIdentifier {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Identity of the resource the response refers to.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceIdentifier {
    pub kind: String,
    pub api_version: String,
    pub namespace: String,
    pub name: String,
}

/// Per-policy portion of the engine response.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyResponse {
    pub policy: PolicyIdentifier,
    pub resource: ResourceIdentifier,
    pub validation_failure_action: ValidationFailureAction,
    pub rules: Vec<RuleResponse>,
    /// Number of rules that ran to a Pass or Fail verdict.
    pub rules_applied_count: u32,
    /// Number of rules that errored.
    pub rules_error_count: u32,
    pub processing_time: Duration,
    pub timestamp: Timestamp,
}

impl Default for PolicyResponse {
    fn default() -> Self {
        Self {
            policy: PolicyIdentifier::default(),
            resource: ResourceIdentifier::default(),
            validation_failure_action: ValidationFailureAction::default(),
            rules: Vec::new(),
            rules_applied_count: 0,
            rules_error_count: 0,
            processing_time: Duration::ZERO,
            timestamp: Timestamp::UNIX_EPOCH,
        }
    }
}

/// Aggregate response for one admission event.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineResponse {
    /// The resource the response refers to: the new resource, or the old
    /// one for delete events.
    pub patched_resource: Value,
    pub policy_response: PolicyResponse,
}

impl EngineResponse {
    /// Whether no rule failed or errored.
    pub fn is_successful(&self) -> bool {
        !self
            .policy_response
            .rules
            .iter()
            .any(|r| matches!(r.status, RuleStatus::Fail | RuleStatus::Error))
    }
}
