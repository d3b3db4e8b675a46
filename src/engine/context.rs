//! The context store.
//!
//! A per-event, hierarchical JSON document that rules query through
//! JMESPath. The request resource, admission info, pre-loaded external
//! data and per-iteration bindings are all published into it under
//! conventional keys:
//!
//! - `request.object` / `resource` — the new resource
//! - `request.oldObject` / `oldResource` — the old resource
//! - `request.userInfo`, `request.operation` — actor metadata
//! - `serviceAccountName`, `serviceAccountNamespace` — derived from
//!   service-account usernames
//! - `element` — the current foreach element
//!
//! Checkpoints snapshot the whole document and form a stack; `restore`
//! pops, `reset` restores the top snapshot without popping. Deep copies
//! are fine at webhook latencies.

use serde_json::{Map, Value, json};

use crate::engine::AdmissionInfo;
use crate::engine::error::{EngineError, Result};

const SERVICE_ACCOUNT_PREFIX: &str = "system:serviceaccount:";

/// Per-event context store with checkpoint/restore semantics.
#[derive(Clone, Debug)]
pub struct Context {
    root: Value,
    checkpoints: Vec<Value>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl Context {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            root: Value::Object(Map::new()),
            checkpoints: Vec::new(),
        }
    }

    /// The current document. Mostly useful for assertions in tests.
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// Publish the new resource at `request.object` and `resource`.
    pub fn add_resource(&mut self, resource: &Value) {
        self.add_variable("request.object", resource.clone());
        self.add_variable("resource", resource.clone());
    }

    /// Publish the old resource at `request.oldObject` and `oldResource`.
    pub fn add_old_resource(&mut self, resource: &Value) {
        self.add_variable("request.oldObject", resource.clone());
        self.add_variable("oldResource", resource.clone());
    }

    /// Publish actor metadata under `request`, deriving the service
    /// account keys when the username has the conventional prefix.
    pub fn add_user_info(&mut self, info: &AdmissionInfo) {
        self.add_variable(
            "request.userInfo",
            json!({"username": info.username, "groups": info.groups}),
        );
        self.add_variable("request.roles", json!(info.roles));
        self.add_variable("request.clusterRoles", json!(info.cluster_roles));
        self.add_variable("request.operation", json!(info.operation.to_string()));

        if let Some((namespace, name)) = split_service_account(&info.username) {
            self.add_variable("serviceAccountNamespace", json!(namespace));
            self.add_variable("serviceAccountName", json!(name));
        }
    }

    /// Replace `request.object` with an arbitrary value. Used by foreach
    /// iteration to stand each element in for the resource.
    pub fn add_resource_as_object(&mut self, value: &Value) {
        self.add_variable("request.object", value.clone());
    }

    /// Write a value at a dot-separated path, creating intermediate maps
    /// as needed.
    pub fn add_variable(&mut self, path: &str, value: Value) {
        let mut segments: Vec<&str> = path.split('.').collect();
        let Some(last) = segments.pop() else {
            return;
        };

        let mut node = ensure_object(&mut self.root);
        for segment in segments {
            let child = node
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            node = ensure_object(child);
        }
        node.insert(last.to_string(), value);
    }

    /// Evaluate a JMESPath expression against the current document.
    ///
    /// A null result is reported as the distinguished
    /// [`EngineError::NotFound`]: the JMESPath library resolves missing
    /// keys to null, but callers need to tell "absent" apart from a
    /// successful query.
    pub fn query(&self, expression: &str) -> Result<Value> {
        search(expression, &self.root)
    }

    /// Push a snapshot of the current document.
    pub fn checkpoint(&mut self) {
        self.checkpoints.push(self.root.clone());
    }

    /// Pop the most recent snapshot and restore it.
    pub fn restore(&mut self) {
        if let Some(snapshot) = self.checkpoints.pop() {
            self.root = snapshot;
        }
    }

    /// Restore the most recent snapshot without popping it.
    pub fn reset(&mut self) {
        if let Some(snapshot) = self.checkpoints.last() {
            self.root = snapshot.clone();
        }
    }
}

/// Evaluate a JMESPath expression against an arbitrary document.
pub(crate) fn search(expression: &str, document: &Value) -> Result<Value> {
    let compiled = jmespath::compile(expression)
        .map_err(|err| EngineError::Jmespath(format!("invalid expression '{expression}': {err}")))?;
    let data = jmespath::Variable::from_serializable(document)
        .map_err(|err| EngineError::Jmespath(err.to_string()))?;
    let result = compiled
        .search(data)
        .map_err(|err| EngineError::Jmespath(format!("query '{expression}' failed: {err}")))?;

    if result.is_null() {
        return Err(EngineError::NotFound(expression.to_string()));
    }

    Ok(serde_json::to_value(result.as_ref())?)
}

fn ensure_object(value: &mut Value) -> &mut Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => map,
        _ => unreachable!("value was just replaced with an object"),
    }
}

fn split_service_account(username: &str) -> Option<(&str, &str)> {
    username
        .strip_prefix(SERVICE_ACCOUNT_PREFIX)?
        .split_once(':')
}
