//! Operator classification
//!
//! Pure lookup tables that decide how the walker treats each key of a query
//! document, and how a field's value is interpreted by the permission checks.

use serde_json::{Map, Value};

/// Logical operators whose value is a list of sub-queries
pub const ARRAY_LOGICAL_OPERATORS: &[&str] = &["$and", "$or", "$nor"];

/// Query-wide operators that are only valid at the document root
pub const SPECIAL_TOP_LEVEL_OPERATORS: &[&str] = &["$expr", "$text", "$where", "$comment"];

/// Operator applied when a field is compared against a plain value
pub const IMPLICIT_OPERATOR: &str = "$eq";

pub const NOT_OPERATOR: &str = "$not";

pub const ELEM_MATCH_OPERATOR: &str = "$elemMatch";

pub fn is_array_logical_operator(key: &str) -> bool {
    ARRAY_LOGICAL_OPERATORS.contains(&key)
}

pub fn is_special_top_level_operator(key: &str) -> bool {
    SPECIAL_TOP_LEVEL_OPERATORS.contains(&key)
}

/// Returns true for any key written in operator form (`$` prefix)
pub fn is_operator(key: &str) -> bool {
    key.starts_with('$')
}

/// Role of a key at the top of a query document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKey<'a> {
    /// `$and`, `$or`, `$nor`
    ArrayLogical(&'a str),
    /// `$expr`, `$text`, `$where`, `$comment`
    SpecialTopLevel(&'a str),
    /// Anything else is a (possibly dotted) field reference
    Field(&'a str),
}

impl<'a> QueryKey<'a> {
    pub fn classify(key: &'a str) -> Self {
        if is_array_logical_operator(key) {
            QueryKey::ArrayLogical(key)
        } else if is_special_top_level_operator(key) {
            QueryKey::SpecialTopLevel(key)
        } else {
            QueryKey::Field(key)
        }
    }
}

/// How a field's value is read by the permission checks
///
/// A mapping whose keys are all operators is an operator expression. Any
/// other value is an operand compared with the implicit `$eq`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueShape<'a> {
    Operand(&'a Value),
    Expression(&'a Map<String, Value>),
}

impl<'a> ValueShape<'a> {
    pub fn of(value: &'a Value) -> Self {
        match value {
            Value::Object(map) if map.keys().all(|key| is_operator(key)) => {
                ValueShape::Expression(map)
            }
            other => ValueShape::Operand(other),
        }
    }

    /// Operator names in expression order; `["$eq"]` for a plain operand
    pub fn operator_names(&self) -> Vec<&'a str> {
        match *self {
            ValueShape::Operand(_) => vec![IMPLICIT_OPERATOR],
            ValueShape::Expression(map) => map.keys().map(String::as_str).collect(),
        }
    }

    /// The payload of a single-operator expression, if `self` is exactly that
    pub fn sole_operand(&self, operator: &str) -> Option<&'a Value> {
        match *self {
            ValueShape::Expression(map) if map.len() == 1 => map.get(operator),
            _ => None,
        }
    }
}
