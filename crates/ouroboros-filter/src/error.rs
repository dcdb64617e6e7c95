//! Error types for ouroboros-filter

use thiserror::Error;

use crate::report::Violation;

/// Result type alias for filter operations
pub type Result<T> = std::result::Result<T, FilterError>;

/// Unified error type for query filtering
///
/// Structural errors describe malformed input and are raised regardless of
/// the configured error handling. `Rejected` is only produced when the
/// policy asks for violations to be raised.
#[derive(Error, Debug, Clone)]
pub enum FilterError {
    #[error("Query must be an object")]
    NotAnObject,

    #[error("Expected array value for operator {operator}, got {found}")]
    ExpectedArray { operator: String, found: &'static str },

    #[error("Expected object elements for operator {operator}, got {found}")]
    ExpectedObject { operator: String, found: &'static str },

    #[error("Query exceeds maximum nesting depth of {limit}")]
    DepthExceeded { limit: usize },

    /// Policy violation raised in throw mode
    #[error("{}", .0.message)]
    Rejected(Violation),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FilterError {
    /// Returns true if this error is caused by the shape of the input
    /// rather than by the permission policy
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            FilterError::NotAnObject
                | FilterError::ExpectedArray { .. }
                | FilterError::ExpectedObject { .. }
                | FilterError::DepthExceeded { .. }
        )
    }

    /// Returns the rejected clause if this error is a policy violation
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            FilterError::Rejected(violation) => Some(violation),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for FilterError {
    fn from(err: serde_json::Error) -> Self {
        FilterError::Config(err.to_string())
    }
}

/// JSON type name used in structural error messages
pub(crate) fn json_type_name(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;

    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
