//! Test fixtures and builder patterns for policies and resources.

use policy_engine::Policy;
use serde_json::{Value, json};

/// Builder for creating policy test fixtures.
///
/// # Example
/// ```
/// let policy = PolicyBuilder::new("restrict-images")
///     .rule(json!({"name": "r", "validate": {"pattern": {"kind": "Pod"}}}))
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct PolicyBuilder {
    name: String,
    validation_failure_action: Option<String>,
    rules: Vec<Value>,
}

impl PolicyBuilder {
    /// Create a new builder with the given policy name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            validation_failure_action: None,
            rules: Vec::new(),
        }
    }

    /// Append a rule given as raw JSON.
    pub fn rule(mut self, rule: Value) -> Self {
        self.rules.push(rule);
        self
    }

    /// Set the validation failure action (`audit` or `enforce`).
    pub fn validation_failure_action(mut self, action: impl Into<String>) -> Self {
        self.validation_failure_action = Some(action.into());
        self
    }

    /// Build the policy.
    pub fn build(self) -> Policy {
        let mut spec = json!({"rules": self.rules});
        if let Some(action) = self.validation_failure_action {
            spec["validationFailureAction"] = json!(action);
        }
        serde_json::from_value(json!({"name": self.name, "spec": spec}))
            .expect("fixture policy is valid")
    }
}

/// A Pod with a single container carrying the given security context
/// flag.
pub fn pod_with_run_as_non_root(run_as_non_root: bool) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": "web", "namespace": "prod"},
        "spec": {"containers": [
            {"name": "web", "securityContext": {"runAsNonRoot": run_as_non_root}}
        ]}
    })
}

/// A Pod with one container per image.
pub fn pod_with_images(images: &[&str]) -> Value {
    let containers: Vec<Value> = images
        .iter()
        .enumerate()
        .map(|(index, image)| json!({"name": format!("c{index}"), "image": image}))
        .collect();
    json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": "web", "namespace": "prod"},
        "spec": {"containers": containers}
    })
}

/// The baseline security rule: containers must set `runAsNonRoot`.
pub fn run_as_non_root_rule() -> Value {
    json!({
        "name": "check-non-root",
        "match": {"resources": {"kinds": ["Pod"]}},
        "validate": {
            "pattern": {"spec": {"containers": [
                {"securityContext": {"runAsNonRoot": true}}
            ]}}
        }
    })
}
