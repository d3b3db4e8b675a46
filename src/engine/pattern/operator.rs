//! Leaf operator parsing.
//!
//! A string leaf in a pattern may start with a comparison or negation
//! operator; the rest of the string is the operand.

/// Operators recognized at the start of a string pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Operator {
    Equals,
    Not,
    MoreThan,
    LessThan,
    MoreThanOrEquals,
    LessThanOrEquals,
}

/// Split a string pattern into its operator and operand. Longer
/// operators are tried first so `>=` is not read as `>`.
pub fn parse(pattern: &str) -> (Operator, &str) {
    if let Some(rest) = pattern.strip_prefix(">=") {
        return (Operator::MoreThanOrEquals, rest.trim_start());
    }
    if let Some(rest) = pattern.strip_prefix("<=") {
        return (Operator::LessThanOrEquals, rest.trim_start());
    }
    if let Some(rest) = pattern.strip_prefix('>') {
        return (Operator::MoreThan, rest.trim_start());
    }
    if let Some(rest) = pattern.strip_prefix('<') {
        return (Operator::LessThan, rest.trim_start());
    }
    if let Some(rest) = pattern.strip_prefix('!') {
        return (Operator::Not, rest.trim_start());
    }
    (Operator::Equals, pattern)
}
