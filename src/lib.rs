//! # docbase
//!
//! A generic data-access layer giving every resource service the same CRUD
//! semantics over a document collection.
//!
//! ## Features
//!
//! - **Uniform listings**: JSON filter and sort expressions, offset/limit
//!   pagination, field projection and relation expansion (populate)
//! - **Sensitive-field redaction**: declared fields never leave the service
//!   unless a caller explicitly selects them
//! - **Audit stamping**: `createdAt`/`createdBy` and `updatedAt`/`updatedBy`
//!   managed automatically
//! - **Pluggable validation**: closures or declarative per-field rules
//! - **Pluggable storage**: in-memory store for tests, MongoDB behind the
//!   `mongodb_backend` feature
//! - **Bearer tokens**: HS256 tokens with optional issuer and expiry
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docbase::prelude::*;
//!
//! #[derive(Serialize, Deserialize)]
//! struct User {
//!     email: String,
//!     password: String,
//! }
//!
//! let users = EntityService::<User, _>::builder(InMemoryStore::new("users"))
//!     .sensitive_fields(["-password"])
//!     .validator(FieldRules::new().field("email", validators::email()))
//!     .config(ServiceConfig::from_env()?)
//!     .build()?;
//!
//! let admin = ActingUser::new("admin".to_string());
//! let ack = users.create(Some(&admin), &user).await?;
//! let query = ListQuery {
//!     filter: Some(Expression::raw(r#"{"email":{"$regex":"@corp"}}"#)),
//!     fields: None,
//! };
//! let page = users.query_all(Some(&admin), Some(query), None, None).await?;
//! ```

pub mod config;
pub mod core;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        auth::{TokenClaims, TokenSigner},
        entity::{ActingUser, Actor, Document},
        error::{ConfigError, ServiceError, StorageError, ValidationError},
        query::{Expression, ListQuery, Pagination, PopulateSpec, QueryResult},
        service::{EntityService, EntityServiceBuilder, WriteAck},
        store::DocumentStore,
        validation::{AcceptAll, FieldRules, Validator, validate_with, validators},
    };

    // === Storage ===
    pub use crate::storage::InMemoryStore;
    #[cfg(feature = "mongodb_backend")]
    pub use crate::storage::{MongoOptions, MongoStore, Relation, connect};

    // === Config ===
    pub use crate::config::{ServiceConfig, TokenConfig, Verbosity};

    // === External dependencies ===
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use serde_json::{Value, json};
}
