//! Declarative per-field validation

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::Validator;
use crate::core::entity::Document;
use crate::core::error::{FieldValidationError, ValidationError};

type FieldCheck = Arc<dyn Fn(&str, &Value) -> Result<(), String> + Send + Sync>;

/// Ordered set of field checks.
///
/// On create every rule runs, missing fields being seen as `null`. On update
/// only the fields present in the payload are checked, since omitted fields
/// keep their stored value. All failures are collected into a single
/// [`ValidationError::FieldErrors`].
///
/// ```rust,ignore
/// let rules = FieldRules::new()
///     .field("email", validators::required())
///     .field("email", validators::email())
///     .field("age", validators::max_value(150.0));
/// ```
#[derive(Clone, Default)]
pub struct FieldRules {
    rules: Vec<(String, FieldCheck)>,
}

impl FieldRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a check for `field`
    pub fn field<F>(mut self, field: impl Into<String>, check: F) -> Self
    where
        F: Fn(&str, &Value) -> Result<(), String> + Send + Sync + 'static,
    {
        self.rules.push((field.into(), Arc::new(check)));
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Run the checks against a payload
    pub fn check(&self, is_update: bool, payload: &Document) -> Result<(), ValidationError> {
        let mut errors = Vec::new();

        for (field, check) in &self.rules {
            let value = match payload.get(field) {
                Some(value) => value,
                None if is_update => continue,
                None => &Value::Null,
            };
            if let Err(message) = check(field, value) {
                errors.push(FieldValidationError {
                    field: field.clone(),
                    message,
                });
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => {
                let e = errors.remove(0);
                Err(ValidationError::FieldError {
                    field: e.field,
                    message: e.message,
                })
            }
            _ => Err(ValidationError::FieldErrors(errors)),
        }
    }
}

#[async_trait]
impl<T: Send + Sync> Validator<T> for FieldRules {
    async fn validate(
        &self,
        existing: Option<&T>,
        payload: &Document,
    ) -> Result<(), ValidationError> {
        self.check(existing.is_some(), payload)
    }
}

impl std::fmt::Debug for FieldRules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldRules")
            .field(
                "fields",
                &self.rules.iter().map(|(name, _)| name).collect::<Vec<_>>(),
            )
            .finish()
    }
}
