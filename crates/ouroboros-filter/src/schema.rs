//! Field allow-list
//!
//! Policies declare queryable fields either as a bare name or as an explicit
//! definition with per-operator permissions. Both forms are normalized once,
//! when the configuration is resolved, into [`FieldDefinition`] records.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Per-operator permissions of one field (`"$gt" => true`)
pub type FieldOperators = BTreeMap<String, bool>;

/// Field declaration as written in a policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldSpec {
    /// `"age"`
    Shorthand(String),
    /// `{ "field": "age", "operators": { "$eq": true } }`
    Explicit(FieldDeclaration),
}

/// Explicit field declaration before normalization
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FieldDeclaration {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operators: Option<FieldOperators>,
}

impl FieldSpec {
    /// Shorthand declaration: the field is allowed with any operator
    pub fn name(field: impl Into<String>) -> Self {
        FieldSpec::Shorthand(field.into())
    }

    /// Explicit declaration restricted to the given operators
    pub fn with_operators<I, K>(field: impl Into<String>, operators: I) -> Self
    where
        I: IntoIterator<Item = (K, bool)>,
        K: Into<String>,
    {
        FieldSpec::Explicit(FieldDeclaration {
            field: field.into(),
            allowed: None,
            operators: Some(operators.into_iter().map(|(k, v)| (k.into(), v)).collect()),
        })
    }

    pub fn field(&self) -> &str {
        match self {
            FieldSpec::Shorthand(name) => name,
            FieldSpec::Explicit(decl) => &decl.field,
        }
    }
}

impl From<&str> for FieldSpec {
    fn from(field: &str) -> Self {
        FieldSpec::Shorthand(field.to_string())
    }
}

impl From<String> for FieldSpec {
    fn from(field: String) -> Self {
        FieldSpec::Shorthand(field)
    }
}

impl From<FieldDeclaration> for FieldSpec {
    fn from(decl: FieldDeclaration) -> Self {
        FieldSpec::Explicit(decl)
    }
}

/// Normalized schema entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    /// Dot-separated path, e.g. `emails.sent`
    pub field: String,
    pub allowed: bool,
    /// `None` means every operator is allowed on this field
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operators: Option<FieldOperators>,
}

impl FieldDefinition {
    /// Whether `operator` is explicitly allowed on this field
    ///
    /// Operators missing from the map are denied. Only meaningful when the
    /// definition carries an operator map.
    pub fn permits(&self, operator: &str) -> bool {
        self.operators
            .as_ref()
            .and_then(|ops| ops.get(operator))
            .copied()
            .unwrap_or(false)
    }
}

/// Expand declarations into definitions
///
/// Every entry comes out with `allowed = true`: appearing in the allow-list
/// is what makes a field queryable, whatever the declaration says.
pub fn normalize(fields: &[FieldSpec]) -> Vec<FieldDefinition> {
    fields
        .iter()
        .map(|spec| match spec {
            FieldSpec::Shorthand(field) => FieldDefinition {
                field: field.clone(),
                allowed: true,
                operators: None,
            },
            FieldSpec::Explicit(decl) => FieldDefinition {
                field: decl.field.clone(),
                allowed: true,
                operators: decl.operators.clone(),
            },
        })
        .collect()
}

/// Ordered field definitions with first-match lookup
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    definitions: Vec<FieldDefinition>,
    index: HashMap<String, usize>,
}

impl Schema {
    pub fn new(definitions: Vec<FieldDefinition>) -> Self {
        let mut index = HashMap::with_capacity(definitions.len());
        for (position, def) in definitions.iter().enumerate() {
            if index.contains_key(&def.field) {
                warn!(field = %def.field, "Duplicate field definition ignored, first entry wins");
                continue;
            }
            index.insert(def.field.clone(), position);
        }
        Self { definitions, index }
    }

    pub fn from_specs(fields: &[FieldSpec]) -> Self {
        Self::new(normalize(fields))
    }

    /// First definition declared for `field`
    pub fn lookup(&self, field: &str) -> Option<&FieldDefinition> {
        self.index.get(field).map(|&position| &self.definitions[position])
    }

    pub fn definitions(&self) -> &[FieldDefinition] {
        &self.definitions
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
