//! Pattern matching.
//!
//! Compares a resource document against a pattern document of the same
//! shape. Leaves may carry extended-match operators (`!`, `|`, `>`, `<`,
//! `>=`, `<=`, `*`, `?`) and map keys may be anchored (see [`anchor`]).
//!
//! A mismatch carries the dot/bracket path into the resource; a
//! malformed pattern carries an empty path so callers can tell a
//! user-facing failure from a config error.

pub mod anchor;
pub mod operator;
pub mod wildcard;

use serde_json::{Map, Value};
use thiserror::Error;

use anchor::Anchor;
use operator::Operator;

/// Pattern match failure. An empty `path` means the pattern itself is
/// malformed.
#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct PatternError {
    pub path: String,
    pub message: String,
}

/// Internal failure kind; `GlobalSkip` unwinds to the top where it turns
/// into a vacuous pass.
enum MatchFailure {
    Mismatch { path: String, message: String },
    Malformed { message: String },
    GlobalSkip,
}

fn mismatch(path: &str, message: String) -> MatchFailure {
    MatchFailure::Mismatch {
        path: path.to_string(),
        message,
    }
}

/// Match a resource document against a pattern document.
pub fn match_pattern(resource: &Value, pattern: &Value) -> Result<(), PatternError> {
    match validate_element(resource, pattern, "") {
        Ok(()) | Err(MatchFailure::GlobalSkip) => Ok(()),
        Err(MatchFailure::Mismatch { path, message }) => Err(PatternError { path, message }),
        Err(MatchFailure::Malformed { message }) => Err(PatternError {
            path: String::new(),
            message,
        }),
    }
}

fn validate_element(resource: &Value, pattern: &Value, path: &str) -> Result<(), MatchFailure> {
    match pattern {
        Value::Object(pattern_map) => match resource {
            Value::Object(resource_map) => validate_map(resource_map, pattern_map, path),
            _ => Err(mismatch(
                path,
                format!("expected a mapping, found {resource}"),
            )),
        },
        Value::Array(pattern_items) => match resource {
            Value::Array(resource_items) => validate_array(resource_items, pattern_items, path),
            _ => Err(mismatch(path, format!("expected a list, found {resource}"))),
        },
        leaf => validate_value(resource, leaf, path),
    }
}

fn validate_map(
    resource: &Map<String, Value>,
    pattern: &Map<String, Value>,
    path: &str,
) -> Result<(), MatchFailure> {
    // anchors decide whether and how the plain keys apply
    for (key, anchored_pattern) in pattern {
        let Some(parsed) = anchor::parse(key) else {
            continue;
        };
        let child = child_path(path, parsed.key());

        match parsed {
            Anchor::Condition(name) => match resource.get(name) {
                Some(actual) => match validate_element(actual, anchored_pattern, &child) {
                    Ok(()) => {}
                    Err(MatchFailure::Mismatch { .. }) => return Ok(()),
                    Err(other) => return Err(other),
                },
                None => return Ok(()),
            },
            Anchor::Global(name) => {
                let matched = match resource.get(name) {
                    Some(actual) => validate_element(actual, anchored_pattern, &child).is_ok(),
                    None => false,
                };
                if !matched {
                    return Err(MatchFailure::GlobalSkip);
                }
            }
            Anchor::Existence(name) => match resource.get(name) {
                Some(actual) => validate_element(actual, anchored_pattern, &child)?,
                None => {
                    return Err(mismatch(&child, format!("field {name} must be present")));
                }
            },
            Anchor::Negation(name) => {
                if resource.contains_key(name) {
                    return Err(mismatch(&child, format!("field {name} is not allowed")));
                }
            }
        }
    }

    for (key, value_pattern) in pattern {
        if anchor::parse(key).is_some() {
            continue;
        }
        let child = child_path(path, key);
        match resource.get(key) {
            Some(actual) => validate_element(actual, value_pattern, &child)?,
            None => return Err(mismatch(&child, format!("field {key} is missing"))),
        }
    }

    Ok(())
}

fn validate_array(
    resource: &[Value],
    pattern: &[Value],
    path: &str,
) -> Result<(), MatchFailure> {
    // a single map pattern applies to every element; anchors inside it
    // select which elements the plain keys constrain
    if let [single] = pattern
        && single.is_object()
    {
        for (index, item) in resource.iter().enumerate() {
            validate_element(item, single, &format!("{path}[{index}]"))?;
        }
        return Ok(());
    }

    if resource.len() != pattern.len() {
        return Err(mismatch(
            path,
            format!(
                "list length mismatch: expected {}, found {}",
                pattern.len(),
                resource.len()
            ),
        ));
    }

    for (index, (item, item_pattern)) in resource.iter().zip(pattern).enumerate() {
        validate_element(item, item_pattern, &format!("{path}[{index}]"))?;
    }

    Ok(())
}

fn validate_value(resource: &Value, pattern: &Value, path: &str) -> Result<(), MatchFailure> {
    match pattern {
        Value::String(s) => validate_string_pattern(resource, s, path),
        Value::Bool(_) | Value::Number(_) | Value::Null => {
            if scalars_equal(resource, pattern) {
                Ok(())
            } else {
                Err(mismatch(
                    path,
                    format!("expected {pattern}, found {resource}"),
                ))
            }
        }
        _ => Err(MatchFailure::Malformed {
            message: format!("invalid pattern leaf {pattern}"),
        }),
    }
}

fn validate_string_pattern(
    resource: &Value,
    pattern: &str,
    path: &str,
) -> Result<(), MatchFailure> {
    // alternatives: any may match
    if pattern.contains('|') {
        for alternative in pattern.split('|') {
            if validate_string_pattern(resource, alternative.trim(), path).is_ok() {
                return Ok(());
            }
        }
        return Err(mismatch(
            path,
            format!("no alternative of '{pattern}' matched {resource}"),
        ));
    }

    let (op, operand) = operator::parse(pattern);
    match op {
        Operator::Equals => {
            if string_equal(resource, operand) {
                Ok(())
            } else {
                Err(mismatch(
                    path,
                    format!("expected '{operand}', found {resource}"),
                ))
            }
        }
        Operator::Not => {
            if string_equal(resource, operand) {
                Err(mismatch(
                    path,
                    format!("value {resource} must not match '{operand}'"),
                ))
            } else {
                Ok(())
            }
        }
        Operator::MoreThan
        | Operator::LessThan
        | Operator::MoreThanOrEquals
        | Operator::LessThanOrEquals => {
            let expected: f64 = operand.trim().parse().map_err(|_| MatchFailure::Malformed {
                message: format!("non-numeric operand in pattern '{pattern}'"),
            })?;
            let Some(actual) = numeric_value(resource) else {
                return Err(mismatch(
                    path,
                    format!("expected a number, found {resource}"),
                ));
            };
            let satisfied = match op {
                Operator::MoreThan => actual > expected,
                Operator::LessThan => actual < expected,
                Operator::MoreThanOrEquals => actual >= expected,
                Operator::LessThanOrEquals => actual <= expected,
                _ => false,
            };
            if satisfied {
                Ok(())
            } else {
                Err(mismatch(
                    path,
                    format!("value {resource} fails check '{pattern}'"),
                ))
            }
        }
    }
}

/// String-pattern equality: wildcards for strings, numeric coercion for
/// numbers, literal spelling for booleans.
fn string_equal(resource: &Value, operand: &str) -> bool {
    match resource {
        Value::String(s) => wildcard::matches(operand, s),
        Value::Number(n) => match operand.trim().parse::<f64>() {
            Ok(expected) => n.as_f64() == Some(expected),
            Err(_) => false,
        },
        Value::Bool(b) => operand.trim() == b.to_string(),
        _ => false,
    }
}

fn scalars_equal(resource: &Value, pattern: &Value) -> bool {
    match (resource, pattern) {
        (Value::Number(_), _) | (_, Value::Number(_)) => {
            match (numeric_value(resource), numeric_value(pattern)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            }
        }
        _ => resource == pattern,
    }
}

fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn child_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}
