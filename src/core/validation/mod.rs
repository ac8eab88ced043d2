//! Validation strategies
//!
//! Every create and update runs the service's [`Validator`] before anything is
//! written. A validator sees the stored entity (on update) and the incoming
//! payload, and either accepts or rejects with a [`ValidationError`].
//!
//! Three ways to provide one:
//! - [`AcceptAll`] when the resource has no business rules
//! - [`validate_with`] to wrap a plain closure
//! - [`FieldRules`] for declarative per-field checks built from [`validators`]

pub mod rules;
pub mod validators;

use async_trait::async_trait;

use crate::core::entity::Document;
use crate::core::error::ValidationError;

pub use rules::FieldRules;

/// Business-rule check run before create and update
#[async_trait]
pub trait Validator<T>: Send + Sync {
    /// `existing` is `None` on create and the stored entity on update
    async fn validate(&self, existing: Option<&T>, payload: &Document)
    -> Result<(), ValidationError>;
}

/// Validator that accepts every payload
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

#[async_trait]
impl<T: Send + Sync> Validator<T> for AcceptAll {
    async fn validate(&self, _: Option<&T>, _: &Document) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Validator backed by a synchronous closure
pub struct FnValidator<F>(F);

/// Wrap a closure as a [`Validator`]
///
/// ```rust,ignore
/// let validator = validate_with(|existing: Option<&User>, payload: &Document| {
///     if existing.is_none() && !payload.contains_key("email") {
///         return Err(ValidationError::rejected("email is mandatory"));
///     }
///     Ok(())
/// });
/// ```
pub fn validate_with<T, F>(f: F) -> FnValidator<F>
where
    F: Fn(Option<&T>, &Document) -> Result<(), ValidationError> + Send + Sync,
{
    FnValidator(f)
}

#[async_trait]
impl<T, F> Validator<T> for FnValidator<F>
where
    T: Send + Sync,
    F: Fn(Option<&T>, &Document) -> Result<(), ValidationError> + Send + Sync,
{
    async fn validate(
        &self,
        existing: Option<&T>,
        payload: &Document,
    ) -> Result<(), ValidationError> {
        (self.0)(existing, payload)
    }
}
