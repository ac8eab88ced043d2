//! Core module containing the entity service and the traits it is built on

pub mod auth;
pub mod entity;
pub mod error;
pub mod query;
pub mod service;
pub mod store;
pub mod validation;

pub use auth::{TokenClaims, TokenSigner};
pub use entity::{ActingUser, Actor, Document};
pub use error::{ConfigError, ServiceError, StorageError, ValidationError};
pub use query::{Expression, ListQuery, Pagination, PopulateSpec, QueryResult};
pub use service::{EntityService, EntityServiceBuilder, WriteAck};
pub use store::DocumentStore;
pub use validation::{AcceptAll, FieldRules, Validator, validate_with};
