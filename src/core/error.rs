//! Typed error handling for docbase
//!
//! Every public operation of [`EntityService`](crate::core::service::EntityService)
//! fails with a [`ServiceError`], so callers can match on the specific case
//! instead of inspecting strings.
//!
//! # Error Categories
//!
//! - [`ServiceError`]: the top-level error returned by service operations
//! - [`ValidationError`]: business-rule rejections produced by validators
//! - [`StorageError`]: failures reported by a storage backend
//! - [`ConfigError`]: invalid configuration values
//!
//! # Example
//!
//! ```rust,ignore
//! match service.update(Some(&user), &id, patch).await {
//!     Ok(updated) => println!("updated {}", updated.id),
//!     Err(ServiceError::EntityNotFound { id, .. }) => println!("{} is gone", id),
//!     Err(e) => eprintln!("[{}] {}", e.error_code(), e),
//! }
//! ```

use serde::Serialize;
use thiserror::Error;

/// Hint returned when a client-supplied filter cannot be parsed
pub const INVALID_FILTER_HINT: &str =
    "Invalid parameter \"filter\", it MUST be a valid JSON / Mongo query syntax";

/// Hint returned when a client-supplied sort cannot be parsed
pub const INVALID_SORT_HINT: &str =
    "Invalid parameter \"sort\", it MUST be a valid JSON / Mongo sort syntax";

/// The main error type returned by entity service operations
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The filter expression is not a JSON object
    #[error("{}: {message}", INVALID_FILTER_HINT)]
    InvalidFilterSyntax { message: String },

    /// The sort expression is not a JSON object
    #[error("{}: {message}", INVALID_SORT_HINT)]
    InvalidSortSyntax { message: String },

    /// Update or delete target does not exist
    #[error("{collection} with id '{id}' not found")]
    EntityNotFound { collection: String, id: String },

    /// The validation strategy rejected the payload
    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),

    /// Token signature, expiry or issuer check failed
    #[error("Invalid token: {reason}")]
    InvalidToken { reason: String },

    /// Storage backend failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Configuration failure
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl ServiceError {
    /// Stable error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::InvalidFilterSyntax { .. } => "INVALID_FILTER_SYNTAX",
            ServiceError::InvalidSortSyntax { .. } => "INVALID_SORT_SYNTAX",
            ServiceError::EntityNotFound { .. } => "ENTITY_NOT_FOUND",
            ServiceError::ValidationFailed(_) => "VALIDATION_FAILED",
            ServiceError::InvalidToken { .. } => "INVALID_TOKEN",
            ServiceError::Storage(_) => "STORAGE_ERROR",
            ServiceError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Whether the failure was caused by the caller's input
    pub fn is_client_error(&self) -> bool {
        !matches!(self, ServiceError::Storage(_) | ServiceError::Config(_))
    }

    /// Convert to a serializable error body
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ServiceError::EntityNotFound { collection, id } => Some(serde_json::json!({
                "collection": collection,
                "id": id,
            })),
            ServiceError::ValidationFailed(ValidationError::FieldErrors(errors)) => {
                Some(serde_json::json!({ "fields": errors }))
            }
            _ => None,
        }
    }
}

/// Error body for whatever transport sits in front of the service
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Errors produced by validation strategies
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    /// A single field failed
    #[error("Field '{field}': {message}")]
    FieldError { field: String, message: String },

    /// Several fields failed
    #[error("{}", format_field_errors(.0))]
    FieldErrors(Vec<FieldValidationError>),

    /// The payload is not a JSON object
    #[error("Invalid JSON payload: {message}")]
    InvalidJson { message: String },

    /// Rejection that is not tied to a field
    #[error("{message}")]
    Rejected { message: String },
}

impl ValidationError {
    /// Shorthand for a rejection with a free-form message
    pub fn rejected(message: impl Into<String>) -> Self {
        ValidationError::Rejected {
            message: message.into(),
        }
    }
}

/// Individual field validation error
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldValidationError {
    pub field: String,
    pub message: String,
}

fn format_field_errors(errors: &[FieldValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors reported by storage backends
#[derive(Debug, Error)]
pub enum StorageError {
    /// Could not reach the backend
    #[error("{backend} connection error: {message}")]
    ConnectionError { backend: String, message: String },

    /// The backend rejected or failed a query
    #[error("{backend} query error: {message}")]
    QueryError { backend: String, message: String },

    /// Document could not be converted to or from the backend format
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// Identifier has the wrong shape for this backend
    #[error("Invalid identifier '{id}': {message}")]
    InvalidId { id: String, message: String },
}

impl StorageError {
    pub fn query(backend: &str, message: impl ToString) -> Self {
        StorageError::QueryError {
            backend: backend.to_string(),
            message: message.to_string(),
        }
    }

    pub fn serialization(message: impl ToString) -> Self {
        StorageError::Serialization {
            message: message.to_string(),
        }
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to configuration values
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// A value could not be parsed
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// A mandatory value is missing
    #[error("Missing configuration value: {field}")]
    Missing { field: String },
}
