//! Helpers for working with untyped resource documents.
//!
//! Resources are schema-less `serde_json::Value` trees identified by
//! `apiVersion`, `kind`, `metadata.namespace` and `metadata.name`. The
//! engine never mutates them.

use serde_json::Value;

/// Workload controllers whose Pods are validated at the controller level,
/// not individually.
const WORKLOAD_CONTROLLER_KINDS: &[&str] = &[
    "DaemonSet",
    "Deployment",
    "Job",
    "ReplicaSet",
    "ReplicationController",
    "StatefulSet",
];

/// The `apiVersion` of a resource, or `""` when absent.
pub fn api_version(resource: &Value) -> &str {
    resource
        .get("apiVersion")
        .and_then(Value::as_str)
        .unwrap_or("")
}

/// The `kind` of a resource, or `""` when absent.
pub fn kind(resource: &Value) -> &str {
    resource.get("kind").and_then(Value::as_str).unwrap_or("")
}

/// The `metadata.name` of a resource, or `""` when absent.
pub fn name(resource: &Value) -> &str {
    metadata_str(resource, "name")
}

/// The `metadata.namespace` of a resource; empty for cluster-scoped
/// resources.
pub fn namespace(resource: &Value) -> &str {
    metadata_str(resource, "namespace")
}

/// The `metadata.labels` map, if present.
pub fn labels(resource: &Value) -> Option<&serde_json::Map<String, Value>> {
    resource
        .get("metadata")
        .and_then(|m| m.get("labels"))
        .and_then(Value::as_object)
}

fn metadata_str<'a>(resource: &'a Value, field: &str) -> &'a str {
    resource
        .get("metadata")
        .and_then(|m| m.get(field))
        .and_then(Value::as_str)
        .unwrap_or("")
}

/// Whether a resource document is empty (null or an empty mapping).
///
/// Create events have an empty old resource; delete events have an empty
/// new resource.
pub fn is_empty(resource: &Value) -> bool {
    match resource {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Whether the resource is a Pod owned by a workload controller.
///
/// Such Pods are skipped entirely: the controller-level resource is the
/// one that gets validated.
pub fn is_managed_pod(resource: &Value) -> bool {
    if kind(resource) != "Pod" {
        return false;
    }

    let owner_refs = resource
        .get("metadata")
        .and_then(|m| m.get("ownerReferences"))
        .and_then(Value::as_array);

    let Some(owner_refs) = owner_refs else {
        return false;
    };

    owner_refs.iter().any(|owner| {
        let owner_kind = owner.get("kind").and_then(Value::as_str).unwrap_or("");
        WORKLOAD_CONTROLLER_KINDS.contains(&owner_kind)
    })
}
