//! Context loading.
//!
//! Resolves a rule's declared context entries in order and publishes
//! them into the context store. Later entries may reference earlier ones
//! through variables. External lookups go through the caller-provided
//! [`ResourceCache`], which is the only place the engine may block.

use jiff::Timestamp;
use serde_json::Value;
use tracing::debug;

use crate::engine::PolicyContext;
use crate::engine::context;
use crate::engine::error::{EngineError, Result};
use crate::engine::variables::substitute_all;
use crate::policy::ContextEntry;

/// Read-through cache for external data, shared across admission events.
///
/// Implementations must be thread-safe; a single-flight guarantee per
/// key avoids duplicate upstream calls. Each method takes the deadline
/// derived from the webhook's timeout budget and must return an error
/// once it expires.
pub trait ResourceCache: Send + Sync {
    /// Fetch a resource from the Kubernetes API.
    fn get_resource(
        &self,
        api_version: &str,
        kind: &str,
        namespace: &str,
        name: &str,
        deadline: Option<Timestamp>,
    ) -> Result<Value>;

    /// Fetch a ConfigMap by namespace and name.
    fn get_config_map(
        &self,
        namespace: &str,
        name: &str,
        deadline: Option<Timestamp>,
    ) -> Result<Value>;

    /// Fetch an image descriptor by reference string.
    fn get_image_descriptor(&self, reference: &str, deadline: Option<Timestamp>) -> Result<Value>;
}

/// Resolve all entries in declared order, publishing each under its name.
///
/// A `NotFound` from a `variable` source is logged and the entry is
/// skipped; every other failure aborts the rule.
pub fn load_context(ctx: &mut PolicyContext, entries: &[ContextEntry], rule: &str) -> Result<()> {
    for entry in entries {
        if deadline_expired(ctx.deadline) {
            return Err(EngineError::DeadlineExceeded);
        }

        let value = match resolve_entry(ctx, entry) {
            Ok(Some(value)) => value,
            Ok(None) => continue,
            Err(err) => {
                return Err(EngineError::ContextLoad(format!(
                    "entry '{}' in rule '{rule}': {err}",
                    entry.name
                )));
            }
        };

        ctx.json_context.add_variable(&entry.name, value);
    }

    Ok(())
}

pub(crate) fn deadline_expired(deadline: Option<Timestamp>) -> bool {
    deadline.is_some_and(|deadline| Timestamp::now() >= deadline)
}

/// Resolve one entry. `Ok(None)` means the entry is skipped.
fn resolve_entry(ctx: &PolicyContext, entry: &ContextEntry) -> Result<Option<Value>> {
    if let Some(variable) = &entry.variable {
        let jmes_path = match &variable.jmes_path {
            Some(path) => Some(substitute_to_string(ctx, path)?),
            None => None,
        };

        if let Some(value) = &variable.value {
            let substituted = substitute_all(&ctx.json_context, value)?;
            let resolved = match &jmes_path {
                Some(path) => context::search(path, &substituted),
                None => Ok(substituted),
            };
            return fallback_on_not_found(resolved, variable.default.as_ref(), &entry.name);
        }

        if let Some(path) = &jmes_path {
            let resolved = ctx.json_context.query(path);
            return fallback_on_not_found(resolved, variable.default.as_ref(), &entry.name);
        }

        return Err(EngineError::ContextLoad(
            "variable needs a value or a jmesPath".to_string(),
        ));
    }

    if let Some(api_call) = &entry.api_call {
        let url_path = substitute_to_string(ctx, &api_call.url_path)?;
        let target = ApiPath::parse(&url_path)?;
        let cache = require_cache(ctx)?;
        let document = cache.get_resource(
            &target.api_version,
            &target.resource,
            &target.namespace,
            &target.name,
            ctx.deadline,
        )?;
        return apply_jmes_path(ctx, document, api_call.jmes_path.as_deref()).map(Some);
    }

    if let Some(config_map) = &entry.config_map {
        let name = substitute_to_string(ctx, &config_map.name)?;
        let namespace = match &config_map.namespace {
            Some(namespace) => substitute_to_string(ctx, namespace)?,
            None => "default".to_string(),
        };
        let cache = require_cache(ctx)?;
        let document = cache.get_config_map(&namespace, &name, ctx.deadline)?;
        return Ok(Some(document));
    }

    if let Some(image_registry) = &entry.image_registry {
        let reference = substitute_to_string(ctx, &image_registry.reference)?;
        let cache = require_cache(ctx)?;
        let descriptor = cache.get_image_descriptor(&reference, ctx.deadline)?;
        return apply_jmes_path(ctx, descriptor, image_registry.jmes_path.as_deref()).map(Some);
    }

    Err(EngineError::ContextLoad("entry has no source".to_string()))
}

fn fallback_on_not_found(
    resolved: Result<Value>,
    default: Option<&Value>,
    entry: &str,
) -> Result<Option<Value>> {
    match resolved {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => match default {
            Some(default) => Ok(Some(default.clone())),
            None => {
                debug!(entry = %entry, reason = %err, "context entry not found, skipping");
                Ok(None)
            }
        },
        Err(err) => Err(err),
    }
}

fn apply_jmes_path(
    ctx: &PolicyContext,
    document: Value,
    jmes_path: Option<&str>,
) -> Result<Value> {
    match jmes_path {
        Some(path) => {
            let path = substitute_to_string(ctx, path)?;
            context::search(&path, &document)
        }
        None => Ok(document),
    }
}

fn substitute_to_string(ctx: &PolicyContext, input: &str) -> Result<String> {
    match substitute_all(&ctx.json_context, &Value::String(input.to_string()))? {
        Value::String(s) => Ok(s),
        other => Ok(stringified(&other)),
    }
}

fn stringified(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn require_cache(ctx: &PolicyContext) -> Result<&dyn ResourceCache> {
    ctx.resource_cache
        .as_deref()
        .ok_or_else(|| EngineError::ContextLoad("no resource cache configured".to_string()))
}

/// A parsed API server path.
///
/// Accepts the two standard shapes, optionally namespaced and optionally
/// ending in a resource name:
///
/// - `/api/<version>/...`
/// - `/apis/<group>/<version>/...`
#[derive(Clone, Debug, PartialEq, Eq)]
struct ApiPath {
    api_version: String,
    resource: String,
    namespace: String,
    name: String,
}

impl ApiPath {
    fn parse(path: &str) -> Result<Self> {
        let without_query = path.split('?').next().unwrap_or(path);
        let segments: Vec<&str> = without_query.split('/').filter(|s| !s.is_empty()).collect();

        let invalid = || EngineError::ContextLoad(format!("unsupported API path '{path}'"));

        let (api_version, rest) = match segments.split_first() {
            Some((&"api", rest)) => {
                let (version, rest) = rest.split_first().ok_or_else(invalid)?;
                ((*version).to_string(), rest)
            }
            Some((&"apis", rest)) => {
                let (group, rest) = rest.split_first().ok_or_else(invalid)?;
                let (version, rest) = rest.split_first().ok_or_else(invalid)?;
                (format!("{group}/{version}"), rest)
            }
            _ => return Err(invalid()),
        };

        let (namespace, rest) = match rest.split_first() {
            Some((&"namespaces", tail)) if tail.len() >= 2 => {
                let (namespace, tail) = tail.split_first().ok_or_else(invalid)?;
                ((*namespace).to_string(), tail)
            }
            _ => (String::new(), rest),
        };

        let resource = rest.first().ok_or_else(invalid)?;
        let name = rest.get(1).map(|s| (*s).to_string()).unwrap_or_default();

        Ok(Self {
            api_version,
            resource: (*resource).to_string(),
            namespace,
            name,
        })
    }
}
