//! Violation records and error-handling dispatch
//!
//! The walker collects one [`Violation`] per rejected clause. Once the walk
//! is over, [`dispatch`] applies the configured mode: raise the first one,
//! hand each to the callback, or drop them.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::FilterConfig;
use crate::error::{FilterError, Result};
use crate::schema::FieldDefinition;

/// What part of a clause was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViolationKind {
    /// Field missing from the schema or not allowed
    Field,
    /// Operator not allowed on the field, or top-level operator not enabled
    Operator,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ViolationKind::Field => write!(f, "field"),
            ViolationKind::Operator => write!(f, "operator"),
        }
    }
}

/// Details of one rejected clause
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorContext {
    pub kind: ViolationKind,
    /// Field path or top-level operator name
    pub field_name: String,
    /// The rejected value, as found in the query
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_definition: Option<FieldDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejected_operators: Option<Vec<String>>,
}

/// A rejected clause
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub message: String,
    pub context: ErrorContext,
}

impl Violation {
    pub fn field(name: &str, value: &Value) -> Self {
        Self {
            message: format!("Field {} not allowed by schema.", name),
            context: ErrorContext {
                kind: ViolationKind::Field,
                field_name: name.to_string(),
                value: value.clone(),
                matched_definition: None,
                rejected_operators: None,
            },
        }
    }

    pub fn operators(
        name: &str,
        value: &Value,
        definition: &FieldDefinition,
        rejected: Vec<String>,
    ) -> Self {
        Self {
            message: format!(
                "Operator(s) {} for field {} are not allowed.",
                rejected.join(", "),
                name
            ),
            context: ErrorContext {
                kind: ViolationKind::Operator,
                field_name: name.to_string(),
                value: value.clone(),
                matched_definition: Some(definition.clone()),
                rejected_operators: Some(rejected),
            },
        }
    }

    pub fn top_level_operator(operator: &str, value: &Value) -> Self {
        Self {
            message: format!("Operator {} not allowed.", operator),
            context: ErrorContext {
                kind: ViolationKind::Operator,
                field_name: operator.to_string(),
                value: value.clone(),
                matched_definition: None,
                rejected_operators: None,
            },
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Payload handed to the `on_error` callback
#[derive(Debug, Clone, Copy)]
pub struct ErrorEvent<'a> {
    pub config: &'a FilterConfig,
    pub message: &'a str,
    pub context: &'a ErrorContext,
}

/// Callback invoked synchronously for every violation in callback mode
pub type ErrorCallback = Arc<dyn Fn(&ErrorEvent<'_>) + Send + Sync>;

/// Active reporting mode of a configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportMode {
    /// Abort on the first violation
    Raise,
    /// Call `on_error` per violation and keep going
    Callback,
    /// Drop violations
    Silent,
}

/// Apply the configured error handling to the collected violations
///
/// `throw_on_error` takes precedence over `on_error` when both are set.
pub fn dispatch(config: &FilterConfig, violations: Vec<Violation>) -> Result<()> {
    match config.error_handling.mode() {
        ReportMode::Raise => match violations.into_iter().next() {
            Some(violation) => Err(FilterError::Rejected(violation)),
            None => Ok(()),
        },
        ReportMode::Callback => {
            if let Some(callback) = &config.error_handling.on_error {
                for violation in &violations {
                    callback(&ErrorEvent {
                        config,
                        message: &violation.message,
                        context: &violation.context,
                    });
                }
            }
            Ok(())
        }
        ReportMode::Silent => {
            if !violations.is_empty() {
                debug!(count = violations.len(), "Dropped rejected clauses silently");
            }
            Ok(())
        }
    }
}
