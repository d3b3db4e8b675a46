//! Per-rule validation.
//!
//! Orchestrates a single rule: load its context entries, evaluate
//! preconditions, then dispatch to pattern, deny or foreach handling and
//! assemble the rule response. The context store is checkpointed around
//! each rule so no rule's bindings leak into the next.

use serde_json::Value;
use tracing::{debug, warn};

use crate::engine::PolicyContext;
use crate::engine::conditions::evaluate_conditions;
use crate::engine::error::{EngineError, Result};
use crate::engine::loader;
use crate::engine::pattern::{self, PatternError};
use crate::engine::response::{RuleResponse, RuleStatus};
use crate::engine::variables::{substitute_all, substitute_all_in_preconditions};
use crate::policy::{
    AnyAllConditions, ContextEntry, Deny, ForEachValidation, Rule, Validation, ValidationCheck,
};
use crate::resource;

/// Run one rule to a response. Returns `None` when the rule decides the
/// event needs no report (deleted resource, unchanged violation).
pub(crate) fn process_rule(ctx: &mut PolicyContext, rule: &Rule) -> Option<RuleResponse> {
    if loader::deadline_expired(ctx.deadline) {
        return Some(rule_error(
            &rule.name,
            "failed to process rule",
            &EngineError::DeadlineExceeded,
        ));
    }

    ctx.json_context.checkpoint();
    let response = {
        let mut validator = Validator::new(ctx, rule);
        match rule.validate.as_ref().and_then(Validation::check) {
            Some(ValidationCheck::ForEach(_)) => validator.validate_foreach(),
            _ => validator.validate(),
        }
    };
    ctx.json_context.restore();
    response
}

/// Working copy of one rule body. The rule is copied in so substitution
/// never touches the caller's policy.
struct Validator<'a> {
    ctx: &'a mut PolicyContext,
    rule_name: String,
    message: String,
    context_entries: Vec<ContextEntry>,
    preconditions: Option<Value>,
    pattern: Option<Value>,
    any_pattern: Option<Value>,
    deny: Option<Deny>,
    foreach: Option<ForEachValidation>,
}

impl<'a> Validator<'a> {
    fn new(ctx: &'a mut PolicyContext, rule: &Rule) -> Self {
        let validate = rule.validate.clone().unwrap_or_default();
        Self {
            ctx,
            rule_name: rule.name.clone(),
            message: validate.message,
            context_entries: rule.context.clone(),
            preconditions: rule.preconditions.clone(),
            pattern: validate.pattern,
            any_pattern: validate.any_pattern,
            deny: validate.deny,
            foreach: validate.foreach,
        }
    }

    /// Validator for one foreach element; the inner block brings its own
    /// context and preconditions, the message stays the rule's.
    fn for_element(
        ctx: &'a mut PolicyContext,
        rule_name: &str,
        message: &str,
        foreach: &ForEachValidation,
    ) -> Self {
        Self {
            ctx,
            rule_name: rule_name.to_string(),
            message: message.to_string(),
            context_entries: foreach.context.clone(),
            preconditions: foreach.preconditions.clone(),
            pattern: foreach.pattern.clone(),
            any_pattern: foreach.any_pattern.clone(),
            deny: foreach.deny.clone(),
            foreach: foreach.foreach.as_deref().cloned(),
        }
    }

    fn validate(&mut self) -> Option<RuleResponse> {
        if let Err(err) = self.load_context() {
            return Some(rule_error(&self.rule_name, "failed to load context", &err));
        }

        match self.check_preconditions() {
            Err(err) => {
                return Some(rule_error(
                    &self.rule_name,
                    "failed to evaluate preconditions",
                    &err,
                ));
            }
            Ok(false) => {
                return Some(RuleResponse::new(
                    &self.rule_name,
                    "preconditions not met",
                    RuleStatus::Skip,
                ));
            }
            Ok(true) => {}
        }

        if self.pattern.is_some() || self.any_pattern.is_some() {
            if let Err(err) = self.substitute_patterns() {
                return Some(rule_error(
                    &self.rule_name,
                    "variable substitution failed",
                    &err,
                ));
            }
            return self.validate_resource_with_rule();
        }

        if self.deny.is_some() {
            return Some(self.validate_deny());
        }

        warn!(
            rule = %self.rule_name,
            "invalid validation rule: either patterns or deny conditions are expected"
        );
        None
    }

    fn validate_foreach(&mut self) -> Option<RuleResponse> {
        if let Err(err) = self.load_context() {
            return Some(rule_error(&self.rule_name, "failed to load context", &err));
        }

        match self.check_preconditions() {
            Err(err) => {
                return Some(rule_error(
                    &self.rule_name,
                    "failed to evaluate preconditions",
                    &err,
                ));
            }
            Ok(false) => {
                return Some(RuleResponse::new(
                    &self.rule_name,
                    "preconditions not met",
                    RuleStatus::Skip,
                ));
            }
            Ok(true) => {}
        }

        let foreach = self.foreach.clone()?;

        let elements = match self.evaluate_list(&foreach.list) {
            Ok(elements) => elements,
            Err(err) => {
                let message = format!("failed to evaluate list {}", foreach.list);
                return Some(rule_error(&self.rule_name, &message, &err));
            }
        };

        self.ctx.json_context.checkpoint();
        let saved_resource = self.ctx.new_resource.clone();
        let response = self.iterate(&foreach, &elements);
        self.ctx.new_resource = saved_resource;
        self.ctx.json_context.restore();

        Some(response)
    }

    fn iterate(&mut self, foreach: &ForEachValidation, elements: &[Value]) -> RuleResponse {
        let mut applied = 0;
        for element in elements {
            self.ctx.json_context.reset();
            add_element_to_context(self.ctx, element);

            let mut inner =
                Validator::for_element(&mut *self.ctx, &self.rule_name, &self.message, foreach);
            let response = if inner.foreach.is_some() {
                inner.validate_foreach()
            } else {
                inner.validate()
            };

            match response {
                None => continue,
                Some(inner_response) if inner_response.status == RuleStatus::Skip => {
                    debug!(rule = %self.rule_name, "skipping element, preconditions not met");
                    continue;
                }
                Some(inner_response) if inner_response.status != RuleStatus::Pass => {
                    let message = format!(
                        "validation failed in foreach rule for {}",
                        inner_response.message
                    );
                    return RuleResponse::new(&self.rule_name, message, inner_response.status);
                }
                Some(_) => applied += 1,
            }
        }

        if applied == 0 {
            RuleResponse::new(&self.rule_name, "rule skipped", RuleStatus::Skip)
        } else {
            RuleResponse::new(&self.rule_name, "rule passed", RuleStatus::Pass)
        }
    }

    fn evaluate_list(&self, expression: &str) -> Result<Vec<Value>> {
        let value = self.ctx.json_context.query(expression)?;
        match value {
            Value::Array(items) => Ok(items),
            single => Ok(vec![single]),
        }
    }

    fn load_context(&mut self) -> Result<()> {
        loader::load_context(self.ctx, &self.context_entries, &self.rule_name)
    }

    fn check_preconditions(&self) -> Result<bool> {
        let Some(conditions) = &self.preconditions else {
            return Ok(true);
        };
        let substituted = substitute_all_in_preconditions(&self.ctx.json_context, conditions)?;
        let parsed = AnyAllConditions::from_json(&substituted).map_err(|err| {
            EngineError::Condition(format!("failed to parse preconditions: {err}"))
        })?;
        Ok(evaluate_conditions(&parsed))
    }

    fn substitute_patterns(&mut self) -> Result<()> {
        if let Some(pattern) = self.pattern.take() {
            self.pattern = Some(substitute_all(&self.ctx.json_context, &pattern)?);
        }
        if let Some(any_pattern) = self.any_pattern.take() {
            self.any_pattern = Some(substitute_all(&self.ctx.json_context, &any_pattern)?);
        }
        Ok(())
    }

    fn validate_deny(&mut self) -> RuleResponse {
        let conditions = self
            .deny
            .as_ref()
            .map(|deny| deny.conditions.clone())
            .unwrap_or(Value::Null);

        let substituted = match substitute_all(&self.ctx.json_context, &conditions) {
            Ok(substituted) => substituted,
            Err(err) => {
                return rule_error(
                    &self.rule_name,
                    "failed to substitute variables in deny conditions",
                    &err,
                );
            }
        };

        let parsed = match AnyAllConditions::from_json(&substituted) {
            Ok(parsed) => parsed,
            Err(err) => {
                return rule_error(
                    &self.rule_name,
                    "invalid deny conditions",
                    &EngineError::Condition(err.to_string()),
                );
            }
        };

        let denied = evaluate_conditions(&parsed);
        let message = self.deny_message(denied);
        let status = if denied {
            RuleStatus::Fail
        } else {
            RuleStatus::Pass
        };
        RuleResponse::new(&self.rule_name, message, status)
    }

    fn deny_message(&self, denied: bool) -> String {
        if !denied {
            return format!("validation rule '{}' passed.", self.rule_name);
        }
        if self.message.is_empty() {
            return format!("validation error: rule {} failed", self.rule_name);
        }
        // fall back to the raw message when substitution fails
        match substitute_all(
            &self.ctx.json_context,
            &Value::String(self.message.clone()),
        ) {
            Ok(Value::String(message)) => message,
            _ => self.message.clone(),
        }
    }

    /// Pattern validation with old/new idempotence: a violation that
    /// already existed on the old resource is not re-flagged on update.
    fn validate_resource_with_rule(&mut self) -> Option<RuleResponse> {
        if resource::is_empty(&self.ctx.old_resource) {
            let new_resource = self.ctx.new_resource.clone();
            return Some(self.validate_patterns(&new_resource));
        }

        if resource::is_empty(&self.ctx.new_resource) {
            debug!(rule = %self.rule_name, "skipping validation on deleted resource");
            return None;
        }

        let old_resource = self.ctx.old_resource.clone();
        let new_resource = self.ctx.new_resource.clone();
        let old_response = self.validate_patterns(&old_resource);
        let new_response = self.validate_patterns(&new_resource);

        if is_same_rule_response(&old_response, &new_response) {
            debug!(
                rule = %self.rule_name,
                "skipping modified resource as validation results have not changed"
            );
            return None;
        }

        Some(new_response)
    }

    /// Validate a single resource against `pattern` or `anyPattern`.
    fn validate_patterns(&self, subject: &Value) -> RuleResponse {
        if let Some(pattern) = &self.pattern {
            return match pattern::match_pattern(subject, pattern) {
                Ok(()) => {
                    debug!(rule = %self.rule_name, "successfully processed rule");
                    let message = format!("validation rule '{}' passed.", self.rule_name);
                    RuleResponse::new(&self.rule_name, message, RuleStatus::Pass)
                }
                Err(err) if err.path.is_empty() => {
                    let message = self.build_error_message(&err, "");
                    RuleResponse::new(&self.rule_name, message, RuleStatus::Error)
                }
                Err(err) => {
                    debug!(rule = %self.rule_name, path = %err.path, "validation error");
                    let message = self.build_error_message(&err, &err.path);
                    RuleResponse::new(&self.rule_name, message, RuleStatus::Fail)
                }
            };
        }

        if let Some(any_pattern) = &self.any_pattern {
            let Some(patterns) = any_pattern.as_array() else {
                return RuleResponse::new(
                    &self.rule_name,
                    "failed to deserialize anyPattern, expected type array",
                    RuleStatus::Error,
                );
            };

            let mut failures = Vec::new();
            for (index, pattern) in patterns.iter().enumerate() {
                match pattern::match_pattern(subject, pattern) {
                    Ok(()) => {
                        let message = format!(
                            "validation rule '{}' anyPattern[{index}] passed.",
                            self.rule_name
                        );
                        return RuleResponse::new(&self.rule_name, message, RuleStatus::Pass);
                    }
                    Err(err) if err.path.is_empty() => {
                        failures.push(format!("Rule {}[{index}] failed: {err}.", self.rule_name));
                    }
                    Err(err) => {
                        failures.push(format!(
                            "Rule {}[{index}] failed at path {}.",
                            self.rule_name, err.path
                        ));
                    }
                }
            }

            let message = build_any_pattern_message(&self.message, &failures);
            return RuleResponse::new(&self.rule_name, message, RuleStatus::Fail);
        }

        RuleResponse::new(&self.rule_name, self.message.clone(), RuleStatus::Pass)
    }

    fn build_error_message(&self, err: &PatternError, path: &str) -> String {
        if self.message.is_empty() {
            if path.is_empty() {
                return format!(
                    "validation error: rule {} execution error: {err}",
                    self.rule_name
                );
            }
            return format!(
                "validation error: rule {} failed at path {path}",
                self.rule_name
            );
        }

        let mut message = match substitute_all(
            &self.ctx.json_context,
            &Value::String(self.message.clone()),
        ) {
            Ok(Value::String(message)) => message,
            _ => self.message.clone(),
        };
        if !message.ends_with('.') {
            message.push('.');
        }

        if path.is_empty() {
            format!(
                "validation error: {message} Rule {} execution error: {err}",
                self.rule_name
            )
        } else {
            format!(
                "validation error: {message} Rule {} failed at path {path}",
                self.rule_name
            )
        }
    }
}

fn add_element_to_context(ctx: &mut PolicyContext, element: &Value) {
    ctx.new_resource = element.clone();
    ctx.json_context.add_resource_as_object(element);
    ctx.json_context.add_variable("element", element.clone());
}

fn build_any_pattern_message(message: &str, failures: &[String]) -> String {
    let joined = failures.join(" ");
    if message.is_empty() {
        return format!("validation error: {joined}");
    }
    if message.ends_with('.') {
        format!("validation error: {message} {joined}")
    } else {
        format!("validation error: {message}. {joined}")
    }
}

fn is_same_rule_response(left: &RuleResponse, right: &RuleResponse) -> bool {
    left.name == right.name
        && left.rule_type == right.rule_type
        && left.message == right.message
        && left.status == right.status
}

fn rule_error(rule: &str, message: &str, err: &EngineError) -> RuleResponse {
    RuleResponse::new(rule, format!("{message}: {err}"), RuleStatus::Error)
}
