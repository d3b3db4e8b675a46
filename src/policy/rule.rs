//! Rule schema: selectors, context entries and validation bodies.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single policy rule.
///
/// A rule selects resources via `match`/`exclude`, optionally loads
/// context entries and checks preconditions, then applies exactly one
/// validation body.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub name: String,

    /// Resources and actors this rule applies to.
    #[serde(default, rename = "match")]
    pub match_resources: MatchResources,

    /// Resources and actors this rule never applies to.
    #[serde(default)]
    pub exclude: MatchResources,

    /// Context entries resolved before the rule body runs, in declared
    /// order. Later entries may reference earlier ones.
    #[serde(default)]
    pub context: Vec<ContextEntry>,

    /// An any/all condition tree evaluated before the validation body;
    /// kept as raw JSON until variables are substituted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preconditions: Option<Value>,

    /// The validation body. Rules without one are ignored by this engine.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validate: Option<Validation>,
}

impl Rule {
    /// Whether this rule carries a validation body.
    pub fn has_validate(&self) -> bool {
        self.validate.is_some()
    }
}

/// Resource and actor selectors for `match`/`exclude` blocks.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct MatchResources {
    #[serde(default)]
    pub resources: ResourceDescription,

    /// Actors the block applies to.
    #[serde(default)]
    pub subjects: Vec<Subject>,

    /// Namespaced role names.
    #[serde(default)]
    pub roles: Vec<String>,

    /// Cluster role names.
    #[serde(default)]
    pub cluster_roles: Vec<String>,
}

impl MatchResources {
    /// Whether no selector field is set at all.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
            && self.subjects.is_empty()
            && self.roles.is_empty()
            && self.cluster_roles.is_empty()
    }
}

/// Selects resources by kind, name, namespace and labels. Kind, name and
/// namespace entries support `*` and `?` wildcards.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescription {
    #[serde(default)]
    pub kinds: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default)]
    pub names: Vec<String>,

    #[serde(default)]
    pub namespaces: Vec<String>,

    /// Matched against the resource's labels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<LabelSelector>,

    /// Matched against the labels of the resource's namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_selector: Option<LabelSelector>,
}

impl ResourceDescription {
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
            && self.name.is_none()
            && self.names.is_empty()
            && self.namespaces.is_empty()
            && self.selector.is_none()
            && self.namespace_selector.is_none()
    }
}

/// An actor reference in a `match`/`exclude` block.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    /// `User`, `Group` or `ServiceAccount`.
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// A label selector with equality terms and set-based requirements.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    #[serde(default)]
    pub match_labels: std::collections::BTreeMap<String, String>,

    #[serde(default)]
    pub match_expressions: Vec<LabelSelectorRequirement>,
}

/// A single set-based label requirement.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelectorRequirement {
    pub key: String,
    /// `In`, `NotIn`, `Exists` or `DoesNotExist`.
    pub operator: String,
    #[serde(default)]
    pub values: Vec<String>,
}

/// The validation body of a rule: a user message plus exactly one of
/// `pattern`, `anyPattern`, `deny` or `foreach`.
///
/// Patterns are kept as raw JSON: they are co-shaped with the target
/// resource and only get variable-substituted, never deserialized.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Validation {
    /// User-facing message included in failure responses. May contain
    /// `{{ ... }}` variables.
    #[serde(default)]
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub any_pattern: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deny: Option<Deny>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreach: Option<ForEachValidation>,
}

impl Validation {
    /// The validation body as a tagged variant, so dispatch happens in
    /// one place. Returns `None` when no body is set.
    pub fn check(&self) -> Option<ValidationCheck<'_>> {
        if let Some(foreach) = &self.foreach {
            return Some(ValidationCheck::ForEach(foreach));
        }
        if let Some(pattern) = &self.pattern {
            return Some(ValidationCheck::Pattern(pattern));
        }
        if let Some(any_pattern) = &self.any_pattern {
            return Some(ValidationCheck::AnyPattern(any_pattern));
        }
        if let Some(deny) = &self.deny {
            return Some(ValidationCheck::Deny(deny));
        }
        None
    }
}

/// Borrowed view of a validation body.
#[derive(Clone, Copy, Debug)]
pub enum ValidationCheck<'a> {
    Pattern(&'a Value),
    AnyPattern(&'a Value),
    Deny(&'a Deny),
    ForEach(&'a ForEachValidation),
}

/// Deny conditions: the rule fails when they evaluate to true.
///
/// Conditions stay raw JSON until after variable substitution.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Deny {
    #[serde(default)]
    pub conditions: Value,
}

/// Per-element validation over a list extracted from the resource.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForEachValidation {
    /// JMESPath expression yielding the element list. A non-list result
    /// is treated as a single-element list.
    #[serde(default)]
    pub list: String,

    /// Context entries resolved once per element.
    #[serde(default)]
    pub context: Vec<ContextEntry>,

    /// Preconditions evaluated once per element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preconditions: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub any_pattern: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deny: Option<Deny>,

    /// Nested iteration over a list extracted from the current element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreach: Option<Box<ForEachValidation>>,
}

/// A named context entry with exactly one source.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ContextEntry {
    /// Name the resolved value is published under in the context store.
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable: Option<VariableSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_call: Option<ApiCallSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_map: Option<ConfigMapSource>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_registry: Option<ImageRegistrySource>,
}

/// A literal or JMESPath-computed variable.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VariableSource {
    /// Literal value; variable-substituted before use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    /// JMESPath applied to `value` when set, otherwise to the context
    /// store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jmes_path: Option<String>,

    /// Fallback when the JMESPath query finds nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

/// A Kubernetes API lookup.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiCallSource {
    /// API server path, e.g.
    /// `/api/v1/namespaces/{{request.namespace}}/pods`.
    pub url_path: String,

    /// Optional JMESPath applied to the fetched document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jmes_path: Option<String>,
}

/// A ConfigMap read.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMapSource {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// An image descriptor lookup by reference string.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImageRegistrySource {
    /// Image reference, e.g. `ghcr.io/acme/web:1.2`.
    pub reference: String,

    /// Optional JMESPath applied to the descriptor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jmes_path: Option<String>,
}
