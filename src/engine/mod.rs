//! Engine module for policy-engine.
//!
//! Contains the policy driver, the per-event context store, context
//! loading, variable substitution, condition evaluation, pattern
//! matching and the per-rule validator.
//!
//! One [`validate`] call handles one admission event. Events are
//! independent: each owns its [`PolicyContext`], so the only shared
//! state is the caller's [`loader::ResourceCache`].

pub mod conditions;
pub mod context;
pub mod error;
pub mod filter;
pub mod loader;
pub mod pattern;
pub mod response;
pub mod validation;
pub mod variables;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, debug_span};

use crate::policy::Policy;
use crate::resource;
use context::Context;
use loader::ResourceCache;
use response::{
    EngineResponse, PolicyIdentifier, ResourceIdentifier, RuleResponse, RuleStatus,
};

/// The admission operation being checked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Operation {
    #[default]
    Create,
    Update,
    Delete,
    Connect,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Create => write!(f, "CREATE"),
            Operation::Update => write!(f, "UPDATE"),
            Operation::Delete => write!(f, "DELETE"),
            Operation::Connect => write!(f, "CONNECT"),
        }
    }
}

impl Operation {
    /// Parse an operation from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "CREATE" => Some(Operation::Create),
            "UPDATE" => Some(Operation::Update),
            "DELETE" => Some(Operation::Delete),
            "CONNECT" => Some(Operation::Connect),
            _ => None,
        }
    }
}

/// Identity of the actor behind an admission event.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionInfo {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub cluster_roles: Vec<String>,
    #[serde(default)]
    pub operation: Operation,
}

/// Everything the engine needs for one admission event. Owned by the
/// caller for the life of the event.
///
/// At most one of `new_resource`/`old_resource` may be empty: create
/// events have no old resource, delete events no new one.
#[derive(Clone)]
pub struct PolicyContext {
    pub policy: Policy,
    pub new_resource: Value,
    pub old_resource: Value,
    pub admission_info: AdmissionInfo,
    /// Group and role names ignored when evaluating `exclude` blocks.
    pub exclude_group_role: Vec<String>,
    /// Labels of the resource's namespace, for namespace selectors.
    pub namespace_labels: BTreeMap<String, String>,
    /// The per-event context store.
    pub json_context: Context,
    /// Shared read-through cache for external lookups; `None` disables
    /// the external context sources.
    pub resource_cache: Option<Arc<dyn ResourceCache>>,
    /// Deadline derived from the webhook's timeout budget.
    pub deadline: Option<Timestamp>,
}

impl PolicyContext {
    /// Create a context with empty resources and a fresh store.
    pub fn new(policy: Policy) -> Self {
        Self {
            policy,
            new_resource: Value::Null,
            old_resource: Value::Null,
            admission_info: AdmissionInfo::default(),
            exclude_group_role: Vec::new(),
            namespace_labels: BTreeMap::new(),
            json_context: Context::new(),
            resource_cache: None,
            deadline: None,
        }
    }

    /// Set the new resource and publish it into the store.
    pub fn with_new_resource(mut self, resource: Value) -> Self {
        self.json_context.add_resource(&resource);
        self.new_resource = resource;
        self
    }

    /// Set the old resource and publish it into the store.
    pub fn with_old_resource(mut self, resource: Value) -> Self {
        self.json_context.add_old_resource(&resource);
        self.old_resource = resource;
        self
    }

    /// Set actor metadata and publish it into the store.
    pub fn with_admission_info(mut self, info: AdmissionInfo) -> Self {
        self.json_context.add_user_info(&info);
        self.admission_info = info;
        self
    }

    pub fn with_namespace_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.namespace_labels = labels;
        self
    }

    pub fn with_exclude_group_role(mut self, groups: Vec<String>) -> Self {
        self.exclude_group_role = groups;
        self
    }

    pub fn with_resource_cache(mut self, cache: Arc<dyn ResourceCache>) -> Self {
        self.resource_cache = Some(cache);
        self
    }

    pub fn with_deadline(mut self, deadline: Timestamp) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Apply the policy's validation rules to one admission event.
///
/// Every matching rule with a validation body yields at most one rule
/// response; errors inside a rule never abort the remaining rules. The
/// context store leaves this call in the state it entered it.
pub fn validate(ctx: &mut PolicyContext) -> EngineResponse {
    let start = Instant::now();
    let timestamp = Timestamp::now();

    let subject = if resource::is_empty(&ctx.new_resource) {
        &ctx.old_resource
    } else {
        &ctx.new_resource
    };
    let span = debug_span!(
        "validate",
        policy = %ctx.policy.name,
        kind = %resource::kind(subject),
        namespace = %resource::namespace(subject),
        name = %resource::name(subject),
    );
    let _guard = span.enter();
    debug!("start policy processing");

    let mut response = EngineResponse::default();

    if resource::is_managed_pod(&ctx.new_resource) {
        debug!("skip validation of pods managed by workload controllers");
        build_response(ctx, &mut response, start, timestamp);
        return response;
    }

    ctx.json_context.checkpoint();
    let rules = ctx.policy.spec.rules.clone();
    for rule in &rules {
        if !rule.has_validate() {
            continue;
        }
        if !filter::rule_matches(rule, ctx) {
            continue;
        }
        debug!(rule = %rule.name, "matched validate rule");
        ctx.json_context.reset();

        let rule_start = Instant::now();
        if let Some(mut rule_response) = validation::process_rule(ctx, rule) {
            rule_response.processing_time = rule_start.elapsed();
            rule_response.timestamp = Timestamp::now();
            debug!(
                rule = %rule.name,
                status = %rule_response.status,
                processing_time = ?rule_response.processing_time,
                "finished processing rule"
            );
            add_rule_response(&mut response, rule_response);
        }
    }
    ctx.json_context.restore();

    build_response(ctx, &mut response, start, timestamp);
    debug!(
        rules_applied = response.policy_response.rules_applied_count,
        processing_time = ?response.policy_response.processing_time,
        "finished policy processing"
    );
    response
}

fn add_rule_response(response: &mut EngineResponse, rule_response: RuleResponse) {
    match rule_response.status {
        RuleStatus::Pass | RuleStatus::Fail => {
            response.policy_response.rules_applied_count += 1;
        }
        RuleStatus::Error => {
            response.policy_response.rules_error_count += 1;
        }
        RuleStatus::Skip | RuleStatus::Warn => {}
    }
    response.policy_response.rules.push(rule_response);
}

fn build_response(
    ctx: &PolicyContext,
    response: &mut EngineResponse,
    start: Instant,
    timestamp: Timestamp,
) {
    if resource::is_empty(&response.patched_resource) {
        // delete requests report the old resource since the new one is empty
        let patched = if resource::is_empty(&ctx.new_resource) {
            &ctx.old_resource
        } else {
            &ctx.new_resource
        };
        response.patched_resource = patched.clone();
    }

    response.policy_response.policy = PolicyIdentifier {
        name: ctx.policy.name.clone(),
        namespace: ctx.policy.namespace.clone(),
    };
    response.policy_response.resource = ResourceIdentifier {
        kind: resource::kind(&response.patched_resource).to_string(),
        api_version: resource::api_version(&response.patched_resource).to_string(),
        namespace: resource::namespace(&response.patched_resource).to_string(),
        name: resource::name(&response.patched_resource).to_string(),
    };
    response.policy_response.validation_failure_action = ctx.policy.spec.validation_failure_action;
    response.policy_response.processing_time = start.elapsed();
    response.policy_response.timestamp = timestamp;
}
