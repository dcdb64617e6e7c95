//! Filter configuration
//!
//! A [`FilterConfig`] is the resolved, immutable policy for one evaluation.
//! Callers usually supply a [`ConfigOverride`] instead; it is merged field by
//! field over the process-wide defaults (see [`crate::defaults`]) and the
//! allow-list is normalized once.
//!
//! Merging is shallow: an `error_handling` override replaces the default's
//! whole error-handling object.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::report::{ErrorCallback, ErrorEvent, ReportMode};
use crate::schema::{FieldSpec, Schema};

/// Default limit on query nesting, counted across logical operators and
/// `$not` / `$elemMatch` nesting
pub const DEFAULT_MAX_DEPTH: usize = 64;

// ============================================================================
// Error Handling
// ============================================================================

/// How violations are surfaced
///
/// `throw_on_error` takes precedence: when it is set, `on_error` is never
/// called. With neither set, violations are dropped silently.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ErrorHandling {
    /// Abort the evaluation on the first violation
    #[serde(rename = "throw", alias = "throwOnError", default)]
    pub throw_on_error: bool,

    /// Called for every violation when not raising
    #[serde(skip)]
    pub on_error: Option<ErrorCallback>,
}

impl ErrorHandling {
    /// Raise on the first violation
    pub fn raise() -> Self {
        Self {
            throw_on_error: true,
            on_error: None,
        }
    }

    /// Drop violations and return what is allowed
    pub fn silent() -> Self {
        Self::default()
    }

    /// Report violations to `callback` and return what is allowed
    pub fn callback<F>(callback: F) -> Self
    where
        F: Fn(&ErrorEvent<'_>) + Send + Sync + 'static,
    {
        Self {
            throw_on_error: false,
            on_error: Some(Arc::new(callback)),
        }
    }

    pub fn mode(&self) -> ReportMode {
        if self.throw_on_error {
            ReportMode::Raise
        } else if self.on_error.is_some() {
            ReportMode::Callback
        } else {
            ReportMode::Silent
        }
    }
}

impl fmt::Debug for ErrorHandling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorHandling")
            .field("throw_on_error", &self.throw_on_error)
            .field("on_error", &self.on_error.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

// ============================================================================
// Resolved Config
// ============================================================================

/// Resolved policy for one evaluation
#[derive(Debug, Clone)]
pub struct FilterConfig {
    pub schema: Schema,
    /// Top-level operators enabled at the document root (`"$expr" => true`)
    pub top_level_operators: HashMap<String, bool>,
    pub error_handling: ErrorHandling,
    pub max_depth: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        DefaultConfig::base().resolve()
    }
}

impl FilterConfig {
    pub fn top_level_operator_enabled(&self, operator: &str) -> bool {
        self.top_level_operators.get(operator).copied().unwrap_or(false)
    }
}

// ============================================================================
// Defaults
// ============================================================================

/// Unnormalized configuration used as the base of every merge
#[derive(Debug, Clone)]
pub struct DefaultConfig {
    pub allowed_fields: Vec<FieldSpec>,
    pub top_level_operators: HashMap<String, bool>,
    pub error_handling: ErrorHandling,
    pub max_depth: usize,
}

impl DefaultConfig {
    /// Built-in base: nothing allowed, raise on error
    pub fn base() -> Self {
        Self {
            allowed_fields: Vec::new(),
            top_level_operators: HashMap::new(),
            error_handling: ErrorHandling::raise(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Shallow merge of `overrides` over `self`, override wins
    pub fn merged(&self, overrides: &ConfigOverride) -> Self {
        Self {
            allowed_fields: overrides
                .allowed_fields
                .clone()
                .unwrap_or_else(|| self.allowed_fields.clone()),
            top_level_operators: overrides
                .top_level_operators
                .clone()
                .unwrap_or_else(|| self.top_level_operators.clone()),
            error_handling: overrides
                .error_handling
                .clone()
                .unwrap_or_else(|| self.error_handling.clone()),
            max_depth: overrides.max_depth.unwrap_or(self.max_depth),
        }
    }

    /// Normalize the allow-list into a [`FilterConfig`]
    pub fn resolve(&self) -> FilterConfig {
        FilterConfig {
            schema: Schema::from_specs(&self.allowed_fields),
            top_level_operators: self.top_level_operators.clone(),
            error_handling: self.error_handling.clone(),
            max_depth: self.max_depth,
        }
    }
}

impl Default for DefaultConfig {
    fn default() -> Self {
        Self::base()
    }
}

// ============================================================================
// Overrides
// ============================================================================

/// Caller-supplied partial configuration; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigOverride {
    pub allowed_fields: Option<Vec<FieldSpec>>,
    pub top_level_operators: Option<HashMap<String, bool>>,
    pub error_handling: Option<ErrorHandling>,
    pub max_depth: Option<usize>,
}

impl ConfigOverride {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON policy document
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Replace the allow-list
    pub fn allowed_fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<FieldSpec>,
    {
        self.allowed_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Append one field to the allow-list
    pub fn allow_field(mut self, field: impl Into<FieldSpec>) -> Self {
        self.allowed_fields
            .get_or_insert_with(Vec::new)
            .push(field.into());
        self
    }

    /// Enable or disable one top-level operator
    pub fn top_level_operator(mut self, operator: impl Into<String>, enabled: bool) -> Self {
        self.top_level_operators
            .get_or_insert_with(HashMap::new)
            .insert(operator.into(), enabled);
        self
    }

    pub fn error_handling(mut self, error_handling: ErrorHandling) -> Self {
        self.error_handling = Some(error_handling);
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = Some(max_depth);
        self
    }

    /// Merge over `defaults` and normalize
    pub fn resolve_against(&self, defaults: &DefaultConfig) -> FilterConfig {
        defaults.merged(self).resolve()
    }
}
