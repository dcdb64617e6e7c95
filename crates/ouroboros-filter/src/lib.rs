//! Ouroboros Filter
//!
//! Schema-driven permission filter for MongoDB-style query documents.
//!
//! Given an untrusted filter document and a policy (queryable fields, the
//! operators allowed on each, and which top-level operators are enabled),
//! the filter returns a copy of the query with only the permitted clauses,
//! or fails on the first violation, depending on the error handling.
//!
//! # Example
//!
//! ```rust
//! use ouroboros_filter::{process_query, ConfigOverride, ErrorHandling, FieldSpec};
//! use serde_json::json;
//!
//! let policy = ConfigOverride::new()
//!     .allowed_fields([
//!         FieldSpec::name("age"),
//!         FieldSpec::with_operators("name", [("$eq", true)]),
//!     ])
//!     .error_handling(ErrorHandling::silent());
//!
//! let query = json!({"age": {"$gt": 18}, "name": {"$regex": ".*"}, "password": "x"});
//! let cleaned = process_query(&query, &policy).unwrap();
//! assert_eq!(cleaned, json!({"age": {"$gt": 18}}));
//! ```

pub mod config;
pub mod defaults;
pub mod error;
pub mod operators;
pub mod permission;
pub mod report;
pub mod schema;
pub mod walker;

use serde_json::Value;
use tracing::trace;

pub use config::{ConfigOverride, DefaultConfig, ErrorHandling, FilterConfig, DEFAULT_MAX_DEPTH};
pub use defaults::{default_config, reset_default_config, set_default_config};
pub use error::{FilterError, Result};
pub use operators::{QueryKey, ValueShape};
pub use permission::{is_field_allowed, Verdict};
pub use report::{ErrorCallback, ErrorContext, ErrorEvent, ReportMode, Violation, ViolationKind};
pub use schema::{normalize, FieldDeclaration, FieldDefinition, FieldOperators, FieldSpec, Schema};
pub use walker::FilterOutcome;

/// Sanitize `query` with `overrides` merged over the current default config
///
/// # Errors
/// - [`FilterError::NotAnObject`] if `query` is not a JSON object
/// - other structural errors for malformed logical operators or excessive nesting
/// - [`FilterError::Rejected`] for the first violation when the resolved
///   config raises on error
pub fn process_query(query: &Value, overrides: &ConfigOverride) -> Result<Value> {
    QueryFilter::from_override(overrides).process(query)
}

/// A resolved policy that can sanitize many queries
#[derive(Debug, Clone)]
pub struct QueryFilter {
    config: FilterConfig,
}

impl QueryFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    /// Resolve `overrides` against the current default config
    pub fn from_override(overrides: &ConfigOverride) -> Self {
        Self::new(overrides.resolve_against(&default_config()))
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Sanitize `query`, reporting violations per the config's error handling
    pub fn process(&self, query: &Value) -> Result<Value> {
        let query = query.as_object().ok_or(FilterError::NotAnObject)?;
        trace!(keys = query.len(), "Filtering query");
        walker::evaluate(query, &self.config).map(Value::Object)
    }

    /// Sanitize `query` and return the removed clauses
    ///
    /// Violations are neither raised nor passed to the callback; only
    /// structural errors fail.
    pub fn inspect(&self, query: &Value) -> Result<FilterOutcome> {
        let query = query.as_object().ok_or(FilterError::NotAnObject)?;
        walker::collect(query, &self.config)
    }
}

impl From<FilterConfig> for QueryFilter {
    fn from(config: FilterConfig) -> Self {
        Self::new(config)
    }
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
