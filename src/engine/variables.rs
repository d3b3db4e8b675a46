//! Variable substitution.
//!
//! Walks an arbitrary JSON-shaped document, replacing `{{ expression }}`
//! placeholders in string leaves with values queried from the context
//! store. A string that is exactly one placeholder keeps the queried
//! value's type; placeholders embedded in larger strings stringify it.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::engine::context::Context;
use crate::engine::error::{EngineError, Result};

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| match Regex::new(r"\{\{([^{}]*)\}\}") {
        Ok(regex) => regex,
        Err(_) => unreachable!("placeholder pattern is valid"),
    })
}

/// Substitute every placeholder in the document, returning a new
/// document. Fails on the first unresolvable variable.
pub fn substitute_all(ctx: &Context, value: &Value) -> Result<Value> {
    match value {
        Value::String(s) => substitute_string(ctx, s),
        Value::Array(items) => {
            let substituted = items
                .iter()
                .map(|item| substitute_all(ctx, item))
                .collect::<Result<Vec<_>>>()?;
            Ok(Value::Array(substituted))
        }
        Value::Object(map) => {
            let mut substituted = Map::with_capacity(map.len());
            for (key, item) in map {
                substituted.insert(key.clone(), substitute_all(ctx, item)?);
            }
            Ok(Value::Object(substituted))
        }
        other => Ok(other.clone()),
    }
}

/// Substitute variables in a precondition tree. The `any`/`all` shape is
/// preserved: only string leaves are rewritten.
pub fn substitute_all_in_preconditions(ctx: &Context, conditions: &Value) -> Result<Value> {
    substitute_all(ctx, conditions)
}

fn substitute_string(ctx: &Context, input: &str) -> Result<Value> {
    let regex = placeholder_regex();

    // a string that is exactly one placeholder keeps the queried type
    if let Some(captures) = regex.captures(input)
        && let (Some(whole), Some(expression)) = (captures.get(0), captures.get(1))
        && whole.start() == 0
        && whole.end() == input.len()
    {
        return resolve(ctx, expression.as_str(), input);
    }

    let mut output = String::new();
    let mut consumed = 0;
    for captures in regex.captures_iter(input) {
        let (Some(whole), Some(expression)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        output.push_str(&input[consumed..whole.start()]);
        let resolved = resolve(ctx, expression.as_str(), input)?;
        output.push_str(&stringify(&resolved));
        consumed = whole.end();
    }
    output.push_str(&input[consumed..]);

    Ok(Value::String(output))
}

fn resolve(ctx: &Context, expression: &str, original: &str) -> Result<Value> {
    ctx.query(expression.trim())
        .map_err(|err| EngineError::Substitution(format!("'{original}': {err}")))
}

fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
