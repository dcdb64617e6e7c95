//! Field permission checks
//!
//! Decides whether a single `field: value` clause is allowed by the schema.
//! A denial always carries exactly one [`Violation`]; structural problems
//! (nesting deeper than the configured limit) are returned as errors.
//!
//! `$not` and `$elemMatch` are unwrapped recursively:
//! - `{ $not: expr }` needs `$not` on the field and `expr` to pass for the same field
//! - `{ $elemMatch: { $gt: .. } }` checks the inner operators against the same field
//! - `{ $elemMatch: { rate: .. } }` checks each key as the nested field `field.rate`

use serde_json::Value;
use tracing::trace;

use crate::config::FilterConfig;
use crate::error::{FilterError, Result};
use crate::operators::{ValueShape, ELEM_MATCH_OPERATOR, NOT_OPERATOR};
use crate::report::Violation;
use crate::schema::FieldDefinition;

/// Outcome of a permission check
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Allow,
    Deny(Violation),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Verdict::Allow)
    }

    pub fn violation(&self) -> Option<&Violation> {
        match self {
            Verdict::Allow => None,
            Verdict::Deny(violation) => Some(violation),
        }
    }
}

/// Check one field clause at the document root
pub fn is_field_allowed(name: &str, value: &Value, config: &FilterConfig) -> Result<Verdict> {
    check_field(name, value, config, 0)
}

pub(crate) fn check_field(
    name: &str,
    value: &Value,
    config: &FilterConfig,
    depth: usize,
) -> Result<Verdict> {
    if depth > config.max_depth {
        return Err(FilterError::DepthExceeded {
            limit: config.max_depth,
        });
    }

    let definition = match config.schema.lookup(name) {
        Some(definition) if definition.allowed => definition,
        _ => return Ok(Verdict::Deny(Violation::field(name, value))),
    };

    if definition.operators.is_none() {
        return Ok(Verdict::Allow);
    }

    let shape = ValueShape::of(value);

    if let Some(negated) = shape.sole_operand(NOT_OPERATOR) {
        if !definition.permits(NOT_OPERATOR) {
            return Ok(deny_operators(name, value, definition, vec![NOT_OPERATOR]));
        }
        return check_field(name, negated, config, depth + 1);
    }

    // A disallowed $elemMatch is rejected with the other operators below
    if let Some(payload) = shape.sole_operand(ELEM_MATCH_OPERATOR) {
        if definition.permits(ELEM_MATCH_OPERATOR) {
            return check_elem_match(definition, name, payload, config, depth + 1);
        }
    }

    let rejected: Vec<&str> = shape
        .operator_names()
        .into_iter()
        .filter(|operator| !definition.permits(operator))
        .collect();

    if rejected.is_empty() {
        Ok(Verdict::Allow)
    } else {
        Ok(deny_operators(name, value, definition, rejected))
    }
}

fn check_elem_match(
    definition: &FieldDefinition,
    name: &str,
    payload: &Value,
    config: &FilterConfig,
    depth: usize,
) -> Result<Verdict> {
    match ValueShape::of(payload) {
        ValueShape::Operand(Value::Object(members)) => {
            for (key, member) in members {
                let nested = format!("{}.{}", definition.field, key);
                trace!(field = %nested, "Checking $elemMatch member");
                if let Verdict::Deny(violation) = check_field(&nested, member, config, depth)? {
                    return Ok(Verdict::Deny(violation));
                }
            }
            Ok(Verdict::Allow)
        }
        // Operator expressions and bare operands apply to the array field itself
        _ => check_field(name, payload, config, depth),
    }
}

fn deny_operators(
    name: &str,
    value: &Value,
    definition: &FieldDefinition,
    rejected: Vec<&str>,
) -> Verdict {
    let rejected = rejected.into_iter().map(str::to_string).collect();
    Verdict::Deny(Violation::operators(name, value, definition, rejected))
}
