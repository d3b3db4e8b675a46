//! Policy schema types.
//!
//! Mirrors the admission-controller CRD schema: a policy is an ordered
//! list of rules, each with match/exclude selectors, context entries,
//! preconditions and a validation body. Unknown fields are ignored so the
//! schema stays forward-compatible.

mod condition;
mod rule;

pub use condition::{AnyAllConditions, Condition, ConditionOperator};
pub use rule::{
    ApiCallSource, ConfigMapSource, ContextEntry, Deny, ForEachValidation, ImageRegistrySource,
    LabelSelector, LabelSelectorRequirement, MatchResources, ResourceDescription, Rule, Subject,
    Validation, ValidationCheck, VariableSource,
};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A validation policy: identity plus an ordered rule set.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    /// Policy name, copied into every response.
    #[serde(default)]
    pub name: String,

    /// Namespace for namespaced policies; `None` for cluster-scoped ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    pub spec: PolicySpec,
}

/// The policy spec: rules plus fields forwarded verbatim into responses.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    /// Rules, processed in declared order.
    #[serde(default)]
    pub rules: Vec<Rule>,

    /// What the caller should do with a failed validation.
    #[serde(default)]
    pub validation_failure_action: ValidationFailureAction,

    /// Whether the policy also applies to existing resources in
    /// background scans.
    #[serde(default)]
    pub background: bool,

    /// Whether existing resources are re-evaluated when the policy
    /// itself changes.
    #[serde(default)]
    pub mutate_existing_on_policy_update: bool,
}

/// Enforcement mode forwarded to the caller; the engine itself never
/// enforces.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ValidationFailureAction {
    /// Report the violation but admit the resource.
    #[default]
    #[serde(rename = "audit", alias = "Audit")]
    Audit,
    /// Block the resource.
    #[serde(rename = "enforce", alias = "Enforce")]
    Enforce,
}
