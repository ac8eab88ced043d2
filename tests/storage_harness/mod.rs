//! Shared test harness for entity services over any storage backend
//!
//! Provides `TestUser`, a resource with a sensitive `password` field, plus
//! helpers for building services and payloads.
//!
//! # Usage
//!
//! From any integration test file in `tests/`:
//! ```rust,ignore
//! #[macro_use]
//! mod storage_harness;
//! use storage_harness::*;
//! ```

#![allow(dead_code)]

#[macro_use]
pub mod entity_service_tests;

use serde::{Deserialize, Serialize};

use docbase::config::ServiceConfig;
use docbase::core::entity::{ActingUser, Document};
use docbase::core::query::Expression;
use docbase::core::service::EntityService;
use docbase::core::store::DocumentStore;
use docbase::core::validation::{FieldRules, validators};

// ---------------------------------------------------------------------------
// TestUser
// ---------------------------------------------------------------------------

/// A resource with one sensitive field and a mix of value types
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TestUser {
    pub name: String,
    pub email: String,
    pub password: String,
    pub age: i64,
    pub active: bool,
}

pub fn create_test_user(name: &str, age: i64, active: bool) -> TestUser {
    TestUser {
        name: name.to_string(),
        email: format!("{}@test.com", name.to_lowercase()),
        password: format!("{}-pw", name.to_lowercase()),
        age,
        active,
    }
}

/// Declarative rules used by every harness service
pub fn test_user_rules() -> FieldRules {
    FieldRules::new()
        .field("name", validators::required())
        .field("name", validators::string_length(2, 40))
        .field("email", validators::email())
        .field("age", validators::positive())
}

/// A service over `store` redacting `password`, with query traces enabled
pub fn user_service<S: DocumentStore>(store: S) -> EntityService<TestUser, S> {
    let config = ServiceConfig {
        token: docbase::config::TokenConfig {
            secret: "harness-secret".to_string(),
            issuer: Some("harness".to_string()),
            expires_in: Some("1h".to_string()),
        },
        ..ServiceConfig::default()
    };

    EntityService::builder(store)
        .sensitive_fields(["-password"])
        .validator(test_user_rules())
        .config(config)
        .build()
        .expect("harness service builds")
}

pub fn admin() -> ActingUser {
    ActingUser::new("admin".to_string()).with_attribute("role", "admin")
}

pub fn editor() -> ActingUser {
    ActingUser::new("editor".to_string())
}

/// Build a document from a `json!` object literal
pub fn doc(value: serde_json::Value) -> Document {
    value
        .as_object()
        .cloned()
        .expect("test document must be a JSON object")
}

pub fn raw(s: &str) -> Option<Expression> {
    Some(Expression::raw(s))
}

/// Names of the documents in a page, in order
pub fn names(results: &[Document]) -> Vec<String> {
    results
        .iter()
        .map(|d| d["name"].as_str().unwrap_or_default().to_string())
        .collect()
}
