//! Condition evaluation.
//!
//! Interprets an any/all condition tree into a boolean. A condition that
//! fails to evaluate (bad regex, non-numeric operand) is logged and
//! counts as false; the group keeps going.

use jiff::{Span, Unit};
use serde_json::Value;
use tracing::debug;

use crate::engine::pattern::wildcard;
use crate::policy::{AnyAllConditions, Condition, ConditionOperator};

/// Evaluate a condition group. `all` passes when every element passes;
/// `any` passes when at least one does; empty lists are true.
pub fn evaluate_conditions(conditions: &AnyAllConditions) -> bool {
    let all_pass = conditions.all.iter().all(evaluate_checked);
    let any_pass = conditions.any.is_empty() || conditions.any.iter().any(evaluate_checked);
    all_pass && any_pass
}

fn evaluate_checked(condition: &Condition) -> bool {
    match evaluate_condition(condition) {
        Ok(result) => result,
        Err(reason) => {
            debug!(
                operator = ?condition.operator,
                reason = %reason,
                "condition failed to evaluate, treating as false"
            );
            false
        }
    }
}

fn evaluate_condition(condition: &Condition) -> Result<bool, String> {
    let key = &condition.key;
    let value = &condition.value;

    match condition.operator {
        ConditionOperator::Equals => Ok(values_equal(key, value)),
        ConditionOperator::NotEquals => Ok(!values_equal(key, value)),
        ConditionOperator::In => contains_all(value, key),
        ConditionOperator::NotIn => contains_none(value, key),
        ConditionOperator::GreaterThan => numeric(key, value).map(|(k, v)| k > v),
        ConditionOperator::GreaterThanOrEquals => numeric(key, value).map(|(k, v)| k >= v),
        ConditionOperator::LessThan => numeric(key, value).map(|(k, v)| k < v),
        ConditionOperator::LessThanOrEquals => numeric(key, value).map(|(k, v)| k <= v),
        ConditionOperator::DurationGreaterThan => duration(key, value).map(|(k, v)| k > v),
        ConditionOperator::DurationGreaterThanOrEquals => duration(key, value).map(|(k, v)| k >= v),
        ConditionOperator::DurationLessThan => duration(key, value).map(|(k, v)| k < v),
        ConditionOperator::DurationLessThanOrEquals => duration(key, value).map(|(k, v)| k <= v),
        ConditionOperator::Matches => regex_match(key, value),
        ConditionOperator::NotMatches => regex_match(key, value).map(|matched| !matched),
    }
}

/// Equality with numeric coercion; string comparisons honor `*`/`?`
/// wildcards in the expected value.
fn values_equal(key: &Value, value: &Value) -> bool {
    match (key, value) {
        (Value::String(k), Value::String(v)) => wildcard::matches(v, k),
        (Value::Number(_), _) | (_, Value::Number(_)) => match (as_number(key), as_number(value)) {
            (Some(k), Some(v)) => k == v,
            _ => key == value,
        },
        _ => key == value,
    }
}

fn contains_all(list: &Value, key: &Value) -> Result<bool, String> {
    let items = list
        .as_array()
        .ok_or_else(|| format!("expected a list, got {list}"))?;
    match key {
        Value::Array(keys) => Ok(keys
            .iter()
            .all(|k| items.iter().any(|item| values_equal(k, item)))),
        scalar => Ok(items.iter().any(|item| values_equal(scalar, item))),
    }
}

fn contains_none(list: &Value, key: &Value) -> Result<bool, String> {
    let items = list
        .as_array()
        .ok_or_else(|| format!("expected a list, got {list}"))?;
    match key {
        Value::Array(keys) => Ok(!keys
            .iter()
            .any(|k| items.iter().any(|item| values_equal(k, item)))),
        scalar => Ok(!items.iter().any(|item| values_equal(scalar, item))),
    }
}

fn numeric(key: &Value, value: &Value) -> Result<(f64, f64), String> {
    match (as_number(key), as_number(value)) {
        (Some(k), Some(v)) => Ok((k, v)),
        _ => Err(format!("expected numeric operands, got {key} and {value}")),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn duration(key: &Value, value: &Value) -> Result<(f64, f64), String> {
    match (as_duration_secs(key), as_duration_secs(value)) {
        (Some(k), Some(v)) => Ok((k, v)),
        _ => Err(format!("expected duration operands, got {key} and {value}")),
    }
}

/// A duration is either a bare number of seconds or a duration string
/// such as `"1h"` or `"30m"`.
fn as_duration_secs(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            if let Ok(seconds) = s.trim().parse::<f64>() {
                return Some(seconds);
            }
            let span: Span = s.trim().parse().ok()?;
            span.total(Unit::Second).ok()
        }
        _ => None,
    }
}

fn regex_match(key: &Value, value: &Value) -> Result<bool, String> {
    let pattern = value
        .as_str()
        .ok_or_else(|| format!("expected a regex string, got {value}"))?;
    let regex = regex::Regex::new(pattern).map_err(|err| err.to_string())?;
    let subject = match key {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Ok(regex.is_match(&subject))
}
