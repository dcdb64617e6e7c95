//! Query tree walker
//!
//! Descends a query document and rebuilds it with only the allowed clauses.
//! Keys are visited in document order; accepted keys keep that order in the
//! output, rejected keys are left out.

use serde_json::{Map, Value};
use tracing::debug;

use crate::config::FilterConfig;
use crate::error::{json_type_name, FilterError, Result};
use crate::operators::QueryKey;
use crate::permission::{check_field, Verdict};
use crate::report::{dispatch, ReportMode, Violation};

/// Sanitized query together with every clause that was removed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterOutcome {
    pub query: Map<String, Value>,
    pub violations: Vec<Violation>,
}

impl FilterOutcome {
    /// True if nothing was removed
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }
}

struct Walker<'a> {
    config: &'a FilterConfig,
    /// Stop at the first violation instead of collecting
    fail_fast: bool,
}

impl<'a> Walker<'a> {
    fn walk(&self, query: &Map<String, Value>, level: usize) -> Result<FilterOutcome> {
        if level > self.config.max_depth {
            return Err(FilterError::DepthExceeded {
                limit: self.config.max_depth,
            });
        }

        let mut outcome = FilterOutcome::default();

        for (key, value) in query {
            match QueryKey::classify(key) {
                QueryKey::ArrayLogical(operator) => {
                    let elements = value.as_array().ok_or_else(|| FilterError::ExpectedArray {
                        operator: operator.to_string(),
                        found: json_type_name(value),
                    })?;

                    let mut cleaned = Vec::with_capacity(elements.len());
                    for element in elements {
                        let sub_query =
                            element.as_object().ok_or_else(|| FilterError::ExpectedObject {
                                operator: operator.to_string(),
                                found: json_type_name(element),
                            })?;
                        let child = self.walk(sub_query, level + 1)?;
                        outcome.violations.extend(child.violations);
                        cleaned.push(Value::Object(child.query));
                    }
                    outcome.query.insert(key.clone(), Value::Array(cleaned));
                }
                QueryKey::SpecialTopLevel(operator) => {
                    if level == 0 && self.config.top_level_operator_enabled(operator) {
                        outcome.query.insert(key.clone(), value.clone());
                    } else {
                        self.reject(&mut outcome, Violation::top_level_operator(operator, value))?;
                    }
                }
                QueryKey::Field(name) => match check_field(name, value, self.config, level)? {
                    Verdict::Allow => {
                        outcome.query.insert(key.clone(), value.clone());
                    }
                    Verdict::Deny(violation) => self.reject(&mut outcome, violation)?,
                },
            }
        }

        Ok(outcome)
    }

    fn reject(&self, outcome: &mut FilterOutcome, violation: Violation) -> Result<()> {
        debug!(
            kind = %violation.context.kind,
            field = %violation.context.field_name,
            "Rejected query clause: {}",
            violation.message
        );
        if self.fail_fast {
            return Err(FilterError::Rejected(violation));
        }
        outcome.violations.push(violation);
        Ok(())
    }
}

/// Sanitize `query`, applying the configured error handling
///
/// In raise mode the first violation aborts the walk. Otherwise every
/// violation is reported (or dropped) after the walk and the sanitized query
/// is returned.
pub fn evaluate(query: &Map<String, Value>, config: &FilterConfig) -> Result<Map<String, Value>> {
    let walker = Walker {
        config,
        fail_fast: config.error_handling.mode() == ReportMode::Raise,
    };
    let outcome = walker.walk(query, 0)?;
    dispatch(config, outcome.violations)?;
    Ok(outcome.query)
}

/// Sanitize `query` and return the removed clauses without reporting them
///
/// Structural errors are still returned as errors.
pub fn collect(query: &Map<String, Value>, config: &FilterConfig) -> Result<FilterOutcome> {
    let walker = Walker {
        config,
        fail_fast: false,
    };
    walker.walk(query, 0)
}
