//! Foreach rules: per-element iteration, short-circuit and nesting.

use policy_engine::{PolicyContext, RuleStatus, validate};
use serde_json::json;

use crate::common::fixtures::{PolicyBuilder, pod_with_images};

fn no_latest_rule() -> serde_json::Value {
    json!({
        "name": "require-tagged-images",
        "match": {"resources": {"kinds": ["Pod"]}},
        "validate": {
            "foreach": {
                "list": "request.object.spec.containers",
                "pattern": {"image": "!*:latest"}
            }
        }
    })
}

#[test]
fn test_foreach_all_elements_pass() {
    let policy = PolicyBuilder::new("image-policy")
        .rule(no_latest_rule())
        .build();
    let mut ctx = PolicyContext::new(policy)
        .with_new_resource(pod_with_images(&["nginx:1.25", "redis:7"]));

    let response = validate(&mut ctx);

    let rule = &response.policy_response.rules[0];
    assert_eq!(rule.status, RuleStatus::Pass);
    assert_eq!(rule.message, "rule passed");
    assert_eq!(response.policy_response.rules_applied_count, 1);
}

#[test]
fn test_foreach_short_circuits_on_failure() {
    let policy = PolicyBuilder::new("image-policy")
        .rule(no_latest_rule())
        .build();
    let mut ctx = PolicyContext::new(policy)
        .with_new_resource(pod_with_images(&["nginx:1.25", "foo:latest", "redis:7"]));

    let response = validate(&mut ctx);

    let rule = &response.policy_response.rules[0];
    assert_eq!(rule.status, RuleStatus::Fail);
    assert!(
        rule.message.contains("validation failed in foreach rule"),
        "unexpected message: {}",
        rule.message
    );
}

#[test]
fn test_foreach_over_empty_list_skips() {
    let policy = PolicyBuilder::new("image-policy")
        .rule(no_latest_rule())
        .build();
    let mut ctx = PolicyContext::new(policy).with_new_resource(json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": "empty", "namespace": "prod"},
        "spec": {"containers": []}
    }));

    let response = validate(&mut ctx);

    let rule = &response.policy_response.rules[0];
    assert_eq!(rule.status, RuleStatus::Skip);
    assert_eq!(response.policy_response.rules_applied_count, 0);
}

#[test]
fn test_foreach_wraps_single_values_in_a_list() {
    let policy = PolicyBuilder::new("single")
        .rule(json!({
            "name": "restart-policy",
            "match": {"resources": {"kinds": ["Pod"]}},
            "validate": {
                "foreach": {
                    "list": "request.object.spec.restartPolicy",
                    "pattern": "Always|OnFailure"
                }
            }
        }))
        .build();
    let mut ctx = PolicyContext::new(policy).with_new_resource(json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": "web", "namespace": "prod"},
        "spec": {"restartPolicy": "Always"}
    }));

    let response = validate(&mut ctx);
    assert_eq!(response.policy_response.rules[0].status, RuleStatus::Pass);
}

#[test]
fn test_foreach_element_is_visible_to_deny_conditions() {
    let policy = PolicyBuilder::new("image-policy")
        .rule(json!({
            "name": "no-latest-deny",
            "match": {"resources": {"kinds": ["Pod"]}},
            "validate": {
                "message": "image {{ element.image }} is not allowed",
                "foreach": {
                    "list": "request.object.spec.containers",
                    "deny": {"conditions": {"all": [
                        {"key": "{{ element.image }}", "operator": "Equals", "value": "*:latest"}
                    ]}}
                }
            }
        }))
        .build();
    let mut ctx =
        PolicyContext::new(policy).with_new_resource(pod_with_images(&["nginx:latest"]));

    let response = validate(&mut ctx);

    let rule = &response.policy_response.rules[0];
    assert_eq!(rule.status, RuleStatus::Fail);
    assert_eq!(
        rule.message,
        "validation failed in foreach rule for image nginx:latest is not allowed"
    );
}

#[test]
fn test_foreach_preconditions_skip_elements() {
    // only containers with a tag are checked; the untagged one is
    // skipped, so the rule still passes
    let policy = PolicyBuilder::new("image-policy")
        .rule(json!({
            "name": "tagged-only",
            "match": {"resources": {"kinds": ["Pod"]}},
            "validate": {
                "foreach": {
                    "list": "request.object.spec.containers",
                    "preconditions": {"all": [
                        {"key": "{{ element.image }}", "operator": "Equals", "value": "*:*"}
                    ]},
                    "pattern": {"image": "!*:latest"}
                }
            }
        }))
        .build();
    let mut ctx = PolicyContext::new(policy)
        .with_new_resource(pod_with_images(&["nginx:1.25", "untagged"]));

    let response = validate(&mut ctx);
    assert_eq!(response.policy_response.rules[0].status, RuleStatus::Pass);
}

#[test]
fn test_nested_foreach() {
    let policy = PolicyBuilder::new("ports")
        .rule(json!({
            "name": "unprivileged-ports",
            "match": {"resources": {"kinds": ["Pod"]}},
            "validate": {
                "foreach": {
                    "list": "request.object.spec.containers",
                    "foreach": {
                        "list": "element.ports",
                        "pattern": {"containerPort": ">1024"}
                    }
                }
            }
        }))
        .build();

    let pod = json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": "web", "namespace": "prod"},
        "spec": {"containers": [
            {"name": "web", "ports": [{"containerPort": 8080}, {"containerPort": 9090}]},
            {"name": "admin", "ports": [{"containerPort": 8443}]}
        ]}
    });

    let mut ctx = PolicyContext::new(policy.clone()).with_new_resource(pod);
    let response = validate(&mut ctx);
    assert_eq!(response.policy_response.rules[0].status, RuleStatus::Pass);

    let offending = json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": "web", "namespace": "prod"},
        "spec": {"containers": [
            {"name": "web", "ports": [{"containerPort": 80}]}
        ]}
    });

    let mut ctx = PolicyContext::new(policy).with_new_resource(offending);
    let response = validate(&mut ctx);
    assert_eq!(response.policy_response.rules[0].status, RuleStatus::Fail);
}

#[test]
fn test_store_round_trip_across_foreach_nesting() {
    let policy = PolicyBuilder::new("ports")
        .rule(json!({
            "name": "unprivileged-ports",
            "match": {"resources": {"kinds": ["Pod"]}},
            "validate": {
                "foreach": {
                    "list": "request.object.spec.containers",
                    "context": [{"name": "scope", "variable": {"value": "inner"}}],
                    "foreach": {
                        "list": "element.ports",
                        "pattern": {"containerPort": ">1024"}
                    }
                }
            }
        }))
        .build();

    let pod = json!({
        "apiVersion": "v1",
        "kind": "Pod",
        "metadata": {"name": "web", "namespace": "prod"},
        "spec": {"containers": [
            {"name": "web", "ports": [{"containerPort": 8080}]}
        ]}
    });

    let mut ctx = PolicyContext::new(policy).with_new_resource(pod);
    let before = ctx.json_context.root().clone();

    validate(&mut ctx);

    assert_eq!(ctx.json_context.root(), &before);
}
