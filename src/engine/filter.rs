//! Rule selection.
//!
//! Decides whether a rule applies to an admission event by evaluating
//! its `match` block against the new resource, falling back to the old
//! one, and then checking the `exclude` block. Non-matching rules are
//! skipped silently, without a rule response.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::engine::pattern::wildcard;
use crate::engine::{AdmissionInfo, PolicyContext};
use crate::policy::{LabelSelector, MatchResources, ResourceDescription, Rule, Subject};
use crate::resource;

/// Whether either the new or the old resource satisfies the rule's
/// match/exclude filters.
pub(crate) fn rule_matches(rule: &Rule, ctx: &PolicyContext) -> bool {
    if matches_resource_description(&ctx.new_resource, rule, ctx) {
        return true;
    }
    if !resource::is_empty(&ctx.old_resource)
        && matches_resource_description(&ctx.old_resource, rule, ctx)
    {
        return true;
    }
    debug!(rule = %rule.name, "resource does not match rule");
    false
}

fn matches_resource_description(subject: &Value, rule: &Rule, ctx: &PolicyContext) -> bool {
    if resource::is_empty(subject) {
        return false;
    }
    if !block_matches(&rule.match_resources, subject, ctx, &[]) {
        return false;
    }
    // an empty exclude block excludes nothing
    if !rule.exclude.is_empty()
        && block_matches(&rule.exclude, subject, ctx, &ctx.exclude_group_role)
    {
        return false;
    }
    true
}

/// Every selector the block actually sets must match. `skip_groups`
/// carries the group/role names ignored when evaluating exclusion.
fn block_matches(
    block: &MatchResources,
    subject: &Value,
    ctx: &PolicyContext,
    skip_groups: &[String],
) -> bool {
    let description = &block.resources;
    if !description.is_empty() && !description_matches(description, subject, ctx) {
        return false;
    }
    if !block.subjects.is_empty()
        && !subjects_match(&block.subjects, &ctx.admission_info, skip_groups)
    {
        return false;
    }
    if !block.roles.is_empty()
        && !block
            .roles
            .iter()
            .any(|role| ctx.admission_info.roles.contains(role))
    {
        return false;
    }
    if !block.cluster_roles.is_empty()
        && !block
            .cluster_roles
            .iter()
            .filter(|role| !skip_groups.contains(role))
            .any(|role| ctx.admission_info.cluster_roles.contains(role))
    {
        return false;
    }
    true
}

fn description_matches(
    description: &ResourceDescription,
    subject: &Value,
    ctx: &PolicyContext,
) -> bool {
    if !description.kinds.is_empty()
        && !description
            .kinds
            .iter()
            .any(|kind| wildcard::matches(kind, resource::kind(subject)))
    {
        return false;
    }

    let name = resource::name(subject);
    if let Some(pattern) = &description.name
        && !wildcard::matches(pattern, name)
    {
        return false;
    }
    if !description.names.is_empty()
        && !description
            .names
            .iter()
            .any(|pattern| wildcard::matches(pattern, name))
    {
        return false;
    }

    if !description.namespaces.is_empty()
        && !description
            .namespaces
            .iter()
            .any(|pattern| wildcard::matches(pattern, resource::namespace(subject)))
    {
        return false;
    }

    if let Some(selector) = &description.selector
        && !selector_matches(selector, &resource_labels(subject))
    {
        return false;
    }
    if let Some(selector) = &description.namespace_selector
        && !selector_matches(selector, &ctx.namespace_labels)
    {
        return false;
    }

    true
}

fn resource_labels(subject: &Value) -> BTreeMap<String, String> {
    resource::labels(subject)
        .map(|labels| {
            labels
                .iter()
                .filter_map(|(key, value)| {
                    value.as_str().map(|v| (key.clone(), v.to_string()))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn selector_matches(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> bool {
    for (key, value) in &selector.match_labels {
        if labels.get(key) != Some(value) {
            return false;
        }
    }
    for requirement in &selector.match_expressions {
        let actual = labels.get(&requirement.key);
        let satisfied = match requirement.operator.as_str() {
            "In" => actual.is_some_and(|value| requirement.values.contains(value)),
            "NotIn" => actual.is_none_or(|value| !requirement.values.contains(value)),
            "Exists" => actual.is_some(),
            "DoesNotExist" => actual.is_none(),
            _ => false,
        };
        if !satisfied {
            return false;
        }
    }
    true
}

fn subjects_match(subjects: &[Subject], info: &AdmissionInfo, skip_groups: &[String]) -> bool {
    subjects.iter().any(|subject| match subject.kind.as_str() {
        "User" => wildcard::matches(&subject.name, &info.username),
        "Group" => info
            .groups
            .iter()
            .filter(|group| !skip_groups.contains(group))
            .any(|group| wildcard::matches(&subject.name, group)),
        "ServiceAccount" => {
            let namespace = subject.namespace.as_deref().unwrap_or("default");
            info.username == format!("system:serviceaccount:{namespace}:{}", subject.name)
        }
        _ => false,
    })
}
