//! # Validator Module
//!
//! Validation of extracted response bodies against a schema.
//!
//! The dispatcher does not know any schema language. It talks to a [`Validate`]
//! implementation, which receives a schema descriptor and the extracted body and
//! returns either the validated value or a [`Diagnostic`]. Two adapters ship
//! with the crate:
//!
//! - [`JsonSchemaValidator`] - JSON Schema via the `jsonschema` crate, with
//!   compiled validators shared through a [`ValidatorCache`]
//! - [`FnValidator`] - the schema is itself a checking closure, which lets any
//!   other validation library plug in
//!
//! A validator may return a value that differs from its input: the JSON Schema
//! adapter can strip object members the schema does not declare.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::validator_cache::{self, ValidatorCache};

/// One problem found while validating a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Issue {
    /// Location of the offending member, when the validator reports one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub message: String,
}

impl Issue {
    pub fn new(message: impl Into<String>) -> Self {
        Issue {
            path: None,
            message: message.into(),
        }
    }

    pub fn at(path: impl Into<String>, message: impl Into<String>) -> Self {
        Issue {
            path: Some(path.into()),
            message: message.into(),
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) if !path.is_empty() => write!(f, "{path}: {}", self.message),
            _ => f.write_str(&self.message),
        }
    }
}

/// Description of a failed validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    /// The value that was rejected.
    pub received: Value,
    /// The schema it was checked against, when it can be expressed as JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    pub issues: Vec<Issue>,
}

impl Diagnostic {
    pub fn new(received: Value, issues: Vec<Issue>) -> Self {
        Diagnostic {
            received,
            schema: None,
            issues,
        }
    }

    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} issue(s)", self.issues.len())?;
        for (i, issue) in self.issues.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{issue}")?;
        }
        Ok(())
    }
}

/// Validation capability used by a dispatcher.
pub trait Validate: Send + Sync + 'static {
    /// Schema descriptor attached to handler entries.
    type Schema: Clone + Send + Sync + 'static;

    /// Check `value` against `schema`.
    ///
    /// Returns the validated value (possibly coerced) or a diagnostic.
    fn validate(&self, schema: &Self::Schema, value: &Value) -> Result<Value, Diagnostic>;
}

/// JSON Schema adapter backed by the `jsonschema` crate.
#[derive(Debug, Clone)]
pub struct JsonSchemaValidator {
    cache: ValidatorCache,
    strip_unknown: bool,
}

impl Default for JsonSchemaValidator {
    fn default() -> Self {
        Self::with_cache(validator_cache::global().clone())
    }
}

impl JsonSchemaValidator {
    /// Adapter using the process-wide validator cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapter using an explicit cache.
    pub fn with_cache(cache: ValidatorCache) -> Self {
        Self {
            cache,
            strip_unknown: false,
        }
    }

    /// Remove object members the schema does not declare from validated values.
    #[must_use]
    pub fn strip_unknown(mut self, strip: bool) -> Self {
        self.strip_unknown = strip;
        self
    }

    #[must_use]
    pub fn cache(&self) -> &ValidatorCache {
        &self.cache
    }
}

impl Validate for JsonSchemaValidator {
    type Schema = Value;

    fn validate(&self, schema: &Value, value: &Value) -> Result<Value, Diagnostic> {
        let validator = match self.cache.get_or_compile(schema) {
            Ok(v) => v,
            Err(e) => {
                return Err(Diagnostic::new(value.clone(), vec![Issue::at("schema", e.to_string())])
                    .with_schema(schema.clone()));
            }
        };

        let issues: Vec<Issue> = validator
            .iter_errors(value)
            .map(|e| Issue::at(e.instance_path().as_str(), e.to_string()))
            .collect();
        if !issues.is_empty() {
            debug!(issues = issues.len(), "Value rejected by JSON Schema");
            return Err(Diagnostic::new(value.clone(), issues).with_schema(schema.clone()));
        }

        let mut validated = value.clone();
        if self.strip_unknown {
            strip_undeclared(schema, &mut validated);
        }
        Ok(validated)
    }
}

/// Drop members of `value` that `schema` does not list under `properties`,
/// recursing through `properties` and `items`. Objects whose schema allows
/// additional properties are left intact.
fn strip_undeclared(schema: &Value, value: &mut Value) {
    match value {
        Value::Object(members) => {
            let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
                return;
            };
            let keeps_extra = matches!(
                schema.get("additionalProperties"),
                Some(Value::Bool(true)) | Some(Value::Object(_))
            );
            if !keeps_extra {
                members.retain(|key, _| properties.contains_key(key));
            }
            for (key, member) in members.iter_mut() {
                if let Some(sub) = properties.get(key) {
                    strip_undeclared(sub, member);
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items").filter(|s| s.is_object()) {
                for item in items {
                    strip_undeclared(item_schema, item);
                }
            }
        }
        _ => {}
    }
}

/// Schema descriptor for [`FnValidator`]: a checking closure.
pub type SchemaFn = Arc<dyn Fn(&Value) -> Result<Value, Diagnostic> + Send + Sync>;

/// Wrap a checking closure as a [`SchemaFn`].
pub fn schema_fn<F>(f: F) -> SchemaFn
where
    F: Fn(&Value) -> Result<Value, Diagnostic> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Adapter whose schemas are closures.
#[derive(Debug, Clone, Copy, Default)]
pub struct FnValidator;

impl Validate for FnValidator {
    type Schema = SchemaFn;

    fn validate(&self, schema: &SchemaFn, value: &Value) -> Result<Value, Diagnostic> {
        schema(value)
    }
}
