//! Pattern and anyPattern rules, including old/new idempotence.

use policy_engine::{PolicyContext, RuleStatus, validate};
use serde_json::json;

use crate::common::fixtures::{PolicyBuilder, pod_with_run_as_non_root, run_as_non_root_rule};

#[test]
fn test_pattern_failure_reports_path() {
    let policy = PolicyBuilder::new("pod-security")
        .rule(run_as_non_root_rule())
        .build();
    let mut ctx =
        PolicyContext::new(policy).with_new_resource(pod_with_run_as_non_root(false));

    let response = validate(&mut ctx);

    assert_eq!(response.policy_response.rules.len(), 1);
    let rule = &response.policy_response.rules[0];
    assert_eq!(rule.status, RuleStatus::Fail);
    assert!(
        rule.message
            .contains("path spec.containers[0].securityContext.runAsNonRoot"),
        "unexpected message: {}",
        rule.message
    );
    assert_eq!(response.policy_response.rules_applied_count, 1);
    assert_eq!(response.policy_response.rules_error_count, 0);
}

#[test]
fn test_pattern_pass() {
    let policy = PolicyBuilder::new("pod-security")
        .rule(run_as_non_root_rule())
        .build();
    let mut ctx = PolicyContext::new(policy).with_new_resource(pod_with_run_as_non_root(true));

    let response = validate(&mut ctx);

    assert!(response.is_successful());
    assert_eq!(response.policy_response.rules[0].status, RuleStatus::Pass);
    assert_eq!(response.policy_response.rules_applied_count, 1);
}

#[test]
fn test_update_with_unchanged_violation_is_silent() {
    // the violation predates the update: only the labels changed, so the
    // rule must not re-fire
    let mut old = pod_with_run_as_non_root(false);
    old["metadata"]["labels"] = json!({"a": "1"});
    let mut new = pod_with_run_as_non_root(false);
    new["metadata"]["labels"] = json!({"a": "2"});

    let policy = PolicyBuilder::new("pod-security")
        .rule(run_as_non_root_rule())
        .build();
    let mut ctx = PolicyContext::new(policy)
        .with_old_resource(old)
        .with_new_resource(new);

    let response = validate(&mut ctx);

    assert!(response.policy_response.rules.is_empty());
    assert_eq!(response.policy_response.rules_applied_count, 0);
}

#[test]
fn test_update_introducing_a_violation_is_reported() {
    let policy = PolicyBuilder::new("pod-security")
        .rule(run_as_non_root_rule())
        .build();
    let mut ctx = PolicyContext::new(policy)
        .with_old_resource(pod_with_run_as_non_root(true))
        .with_new_resource(pod_with_run_as_non_root(false));

    let response = validate(&mut ctx);

    assert_eq!(response.policy_response.rules.len(), 1);
    assert_eq!(response.policy_response.rules[0].status, RuleStatus::Fail);
}

#[test]
fn test_any_pattern_short_circuits_on_first_match() {
    // the second pattern is malformed; a pass proves it was never
    // evaluated
    let policy = PolicyBuilder::new("either")
        .rule(json!({
            "name": "kind-or-broken",
            "match": {"resources": {"kinds": ["Pod"]}},
            "validate": {"anyPattern": [
                {"kind": "Pod"},
                {"spec": "> not-a-number"}
            ]}
        }))
        .build();
    let mut ctx = PolicyContext::new(policy).with_new_resource(pod_with_run_as_non_root(true));

    let response = validate(&mut ctx);

    let rule = &response.policy_response.rules[0];
    assert_eq!(rule.status, RuleStatus::Pass);
    assert!(
        rule.message.contains("anyPattern[0] passed"),
        "unexpected message: {}",
        rule.message
    );
}

#[test]
fn test_any_pattern_failure_lists_every_index() {
    let policy = PolicyBuilder::new("either")
        .rule(json!({
            "name": "strict",
            "match": {"resources": {"kinds": ["Pod"]}},
            "validate": {
                "message": "pod must be host-networked or non-root",
                "anyPattern": [
                    {"spec": {"hostNetwork": true}},
                    {"spec": {"containers": [{"securityContext": {"runAsNonRoot": true}}]}}
                ]
            }
        }))
        .build();
    let mut ctx = PolicyContext::new(policy).with_new_resource(pod_with_run_as_non_root(false));

    let response = validate(&mut ctx);

    let rule = &response.policy_response.rules[0];
    assert_eq!(rule.status, RuleStatus::Fail);
    assert!(rule.message.starts_with("validation error: pod must be host-networked or non-root."));
    assert!(rule.message.contains("strict[0] failed at path spec.hostNetwork"));
    assert!(rule.message.contains("strict[1] failed at path"));
}

#[test]
fn test_pattern_variables_are_substituted_before_matching() {
    let policy = PolicyBuilder::new("self-reference")
        .rule(json!({
            "name": "namespace-matches-label",
            "match": {"resources": {"kinds": ["Pod"]}},
            "validate": {
                "pattern": {"metadata": {"labels": {"env": "{{ request.object.metadata.namespace }}"}}}
            }
        }))
        .build();

    let mut pod = pod_with_run_as_non_root(true);
    pod["metadata"]["labels"] = json!({"env": "prod"});
    let mut ctx = PolicyContext::new(policy).with_new_resource(pod);

    let response = validate(&mut ctx);
    assert_eq!(response.policy_response.rules[0].status, RuleStatus::Pass);
}
