//! Typed condition trees.
//!
//! Preconditions and deny conditions travel as raw JSON until variables
//! are substituted, then parse into these types. Both the `{any, all}`
//! object form and the legacy bare list form (treated as `all`) are
//! accepted.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single `key <operator> value` condition, evaluated after variable
/// substitution.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(default)]
    pub key: Value,
    pub operator: ConditionOperator,
    #[serde(default)]
    pub value: Value,
}

/// Condition operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum ConditionOperator {
    #[serde(alias = "Equal")]
    Equals,
    #[serde(alias = "NotEqual")]
    NotEquals,
    In,
    NotIn,
    GreaterThan,
    GreaterThanOrEquals,
    LessThan,
    LessThanOrEquals,
    DurationGreaterThan,
    DurationGreaterThanOrEquals,
    DurationLessThan,
    DurationLessThanOrEquals,
    /// Regex match of the value against the stringified key.
    Matches,
    NotMatches,
}

impl Default for ConditionOperator {
    fn default() -> Self {
        Self::Equals
    }
}

/// A condition group. `all` passes when every element passes; `any`
/// passes when at least one does; an empty list is true.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnyAllConditions {
    #[serde(default)]
    pub any: Vec<Condition>,
    #[serde(default)]
    pub all: Vec<Condition>,
}

impl AnyAllConditions {
    /// Parse a substituted condition document. A bare list becomes an
    /// `all` group; null means no conditions.
    pub fn from_json(conditions: &Value) -> Result<Self, serde_json::Error> {
        match conditions {
            Value::Null => Ok(Self::default()),
            Value::Array(_) => {
                let all: Vec<Condition> = serde_json::from_value(conditions.clone())?;
                Ok(Self {
                    any: Vec::new(),
                    all,
                })
            }
            _ => serde_json::from_value(conditions.clone()),
        }
    }
}
