//! Schema validation for settings documents
//!
//! A schema is a Rust type: serde supplies the shape and the default values,
//! `validator` supplies the constraints. Validating a document therefore also
//! default-fills it.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// Aggregated schema violations for one document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaErrors {
    errors: Vec<String>,
}

impl SchemaErrors {
    #[cfg(test)]
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    fn from_deserialize(err: serde_json::Error) -> Self {
        Self {
            errors: vec![format!("data {}", err)],
        }
    }

    fn from_validation(errs: &ValidationErrors) -> Self {
        let mut errors = Vec::new();
        collect_violations("data", errs, &mut errors);
        errors.sort();
        Self { errors }
    }
}

fn collect_violations(prefix: &str, errs: &ValidationErrors, out: &mut Vec<String>) {
    for (field, kind) in errs.errors() {
        let path = format!("{}.{}", prefix, field);
        match kind {
            ValidationErrorsKind::Field(violations) => {
                for violation in violations {
                    let text = violation
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("failed {} check", violation.code));
                    out.push(format!("{} {}", path, text));
                }
            }
            ValidationErrorsKind::Struct(nested) => collect_violations(&path, nested, out),
            ValidationErrorsKind::List(items) => {
                for (index, nested) in items {
                    collect_violations(&format!("{}[{}]", path, index), nested, out);
                }
            }
        }
    }
}

impl fmt::Display for SchemaErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.errors.join(", "))
    }
}

impl std::error::Error for SchemaErrors {}

/// Validate `document` against the schema `T`, returning the defaulted document
pub fn validate<T>(document: Value) -> Result<T, SchemaErrors>
where
    T: DeserializeOwned + Validate,
{
    let parsed: T = serde_json::from_value(document).map_err(SchemaErrors::from_deserialize)?;
    parsed
        .validate()
        .map_err(|errs| SchemaErrors::from_validation(&errs))?;
    Ok(parsed)
}
