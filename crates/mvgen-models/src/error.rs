//! Request validation errors.

use std::collections::BTreeMap;

use thiserror::Error;
use validator::ValidationErrors;

/// Structured validation failure: field name to messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid generation request: {} field(s) rejected", fields.len())]
pub struct RequestValidationError {
    pub fields: BTreeMap<String, Vec<String>>,
}

impl RequestValidationError {
    /// Single-field error.
    pub fn field(name: impl Into<String>, message: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(name.into(), vec![message.into()]);
        Self { fields }
    }

    /// Comma-separated list of rejected fields.
    pub fn field_names(&self) -> String {
        self.fields.keys().cloned().collect::<Vec<_>>().join(", ")
    }
}

/// Flatten `validator` errors into field -> messages.
pub fn describe_validation_errors(errors: &ValidationErrors) -> BTreeMap<String, Vec<String>> {
    errors
        .field_errors()
        .into_iter()
        .map(|(field, errs)| {
            let messages = errs
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string())
                })
                .collect();
            (field.to_string(), messages)
        })
        .collect()
}
