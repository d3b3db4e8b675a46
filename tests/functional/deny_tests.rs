//! Deny rules: condition evaluation and message substitution.

use policy_engine::{AdmissionInfo, Operation, PolicyContext, RuleStatus, validate};
use serde_json::json;

use crate::common::fixtures::{PolicyBuilder, pod_with_run_as_non_root};

fn anonymous_user() -> AdmissionInfo {
    AdmissionInfo {
        username: "system:anonymous".to_string(),
        groups: vec!["system:unauthenticated".to_string()],
        operation: Operation::Create,
        ..AdmissionInfo::default()
    }
}

#[test]
fn test_deny_with_message_substitution() {
    let policy = PolicyBuilder::new("block-anonymous")
        .rule(json!({
            "name": "no-anonymous",
            "match": {"resources": {"kinds": ["Pod"]}},
            "validate": {
                "message": "user {{ request.userInfo.username }} may not create resources",
                "deny": {"conditions": {"all": [
                    {"key": "{{ request.userInfo.username }}", "operator": "Equals", "value": "system:anonymous"}
                ]}}
            }
        }))
        .build();
    let mut ctx = PolicyContext::new(policy)
        .with_new_resource(pod_with_run_as_non_root(true))
        .with_admission_info(anonymous_user());

    let response = validate(&mut ctx);

    let rule = &response.policy_response.rules[0];
    assert_eq!(rule.status, RuleStatus::Fail);
    assert_eq!(
        rule.message,
        "user system:anonymous may not create resources"
    );
    assert_eq!(response.policy_response.rules_applied_count, 1);
}

#[test]
fn test_deny_passes_for_other_users() {
    let policy = PolicyBuilder::new("block-anonymous")
        .rule(json!({
            "name": "no-anonymous",
            "match": {"resources": {"kinds": ["Pod"]}},
            "validate": {
                "deny": {"conditions": {"all": [
                    {"key": "{{ request.userInfo.username }}", "operator": "Equals", "value": "system:anonymous"}
                ]}}
            }
        }))
        .build();
    let mut ctx = PolicyContext::new(policy)
        .with_new_resource(pod_with_run_as_non_root(true))
        .with_admission_info(AdmissionInfo {
            username: "alice".to_string(),
            operation: Operation::Create,
            ..AdmissionInfo::default()
        });

    let response = validate(&mut ctx);

    let rule = &response.policy_response.rules[0];
    assert_eq!(rule.status, RuleStatus::Pass);
    assert_eq!(rule.message, "validation rule 'no-anonymous' passed.");
}

#[test]
fn test_deny_any_group_semantics() {
    // any: one of the two conditions matching is enough to deny
    let policy = PolicyBuilder::new("change-windows")
        .rule(json!({
            "name": "freeze",
            "match": {"resources": {"kinds": ["Pod"]}},
            "validate": {
                "message": "deploys are frozen",
                "deny": {"conditions": {"any": [
                    {"key": "{{ request.operation }}", "operator": "Equals", "value": "DELETE"},
                    {"key": "{{ request.userInfo.username }}", "operator": "In", "value": ["intern", "contractor"]}
                ]}}
            }
        }))
        .build();
    let mut ctx = PolicyContext::new(policy)
        .with_new_resource(pod_with_run_as_non_root(true))
        .with_admission_info(AdmissionInfo {
            username: "intern".to_string(),
            operation: Operation::Update,
            ..AdmissionInfo::default()
        });

    let response = validate(&mut ctx);
    assert_eq!(response.policy_response.rules[0].status, RuleStatus::Fail);
}

#[test]
fn test_deny_uses_context_entries() {
    // a context entry feeds the deny condition; ordering matters since
    // the second entry references the first
    let policy = PolicyBuilder::new("registry-allowlist")
        .rule(json!({
            "name": "allowed-registries",
            "match": {"resources": {"kinds": ["Pod"]}},
            "context": [
                {"name": "allowed", "variable": {"value": ["ghcr.io", "docker.io"]}},
                {"name": "primary", "variable": {"value": "{{ allowed }}", "jmesPath": "[0]"}}
            ],
            "validate": {
                "message": "images must come from {{ primary }}",
                "deny": {"conditions": {"all": [
                    {"key": "quay.io", "operator": "NotIn", "value": "{{ allowed }}"}
                ]}}
            }
        }))
        .build();
    let mut ctx =
        PolicyContext::new(policy).with_new_resource(pod_with_run_as_non_root(true));

    let response = validate(&mut ctx);

    let rule = &response.policy_response.rules[0];
    assert_eq!(rule.status, RuleStatus::Fail);
    assert_eq!(rule.message, "images must come from ghcr.io");
}

#[test]
fn test_unresolvable_deny_condition_is_an_error() {
    let policy = PolicyBuilder::new("broken")
        .rule(json!({
            "name": "broken-deny",
            "match": {"resources": {"kinds": ["Pod"]}},
            "validate": {
                "deny": {"conditions": {"all": [
                    {"key": "{{ no.such.key }}", "operator": "Equals", "value": "x"}
                ]}}
            }
        }))
        .build();
    let mut ctx =
        PolicyContext::new(policy).with_new_resource(pod_with_run_as_non_root(true));

    let response = validate(&mut ctx);

    let rule = &response.policy_response.rules[0];
    assert_eq!(rule.status, RuleStatus::Error);
    assert_eq!(response.policy_response.rules_error_count, 1);
    assert_eq!(response.policy_response.rules_applied_count, 0);
}
