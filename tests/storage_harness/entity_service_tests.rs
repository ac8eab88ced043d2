//! Macro-generated test suite for `EntityService<TestUser, S>` contract validation.
//!
//! The `entity_service_tests!` macro generates a test module that runs the
//! full service contract against any `DocumentStore`: listing defaults,
//! filtering, sorting, redaction, audit stamping, merge-on-update, deletion,
//! validation and tokens.
//!
//! # Usage
//!
//! ```rust,ignore
//! #[macro_use]
//! mod storage_harness;
//!
//! use storage_harness::*;
//! use docbase::storage::InMemoryStore;
//!
//! entity_service_tests!(user_service(InMemoryStore::new("users")), 999_999u64);
//! ```

/// Generate a full `EntityService<TestUser, S>` conformance test suite.
///
/// `$factory` must evaluate to a fresh `EntityService<TestUser, S>` over an
/// empty collection. It is re-evaluated for each test. `$missing_id` must be
/// an `S::Id` that no document will ever have.
#[macro_export]
macro_rules! entity_service_tests {
    ($factory:expr, $missing_id:expr) => {
        mod entity_service_contract_tests {
            use super::*;
            use docbase::core::entity::ActingUser;
            use docbase::core::error::{ServiceError, ValidationError};
            use docbase::core::query::{Expression, ListQuery, Pagination};
            use docbase::core::auth::TokenClaims;
            use serde_json::json;

            fn list(filter: Option<Expression>, fields: Option<Vec<&str>>) -> Option<ListQuery> {
                Some(ListQuery {
                    filter,
                    fields: fields.map(|f| f.into_iter().map(str::to_string).collect()),
                })
            }

            fn page(offset: u64, limit: u64, sort: Option<&str>) -> Option<Pagination> {
                Some(Pagination {
                    offset,
                    limit,
                    sort: sort.map(Expression::raw),
                })
            }

            // ==================================================================
            // Create & Get
            // ==================================================================

            #[tokio::test]
            async fn test_create_then_get_stamps_audit_fields() {
                let service = $factory;
                let user = admin();

                let started = chrono::Utc::now();
                let ack = service
                    .create(Some(&user), &create_test_user("Alice", 30, true))
                    .await
                    .unwrap();
                let finished = chrono::Utc::now();

                let stored = service
                    .get_by_id(Some(&user), &ack.id, None, None)
                    .await
                    .unwrap()
                    .expect("created entity is readable");

                assert_eq!(stored["name"], "Alice");
                assert_eq!(stored["createdBy"], "admin");
                let created_at = chrono::DateTime::parse_from_rfc3339(
                    stored["createdAt"].as_str().expect("createdAt is a string"),
                )
                .expect("createdAt is RFC 3339");
                assert!(started <= created_at && created_at <= finished);
                assert!(stored.get("updatedAt").is_none());
                assert!(stored.get("password").is_none(), "password must be redacted");
            }

            #[tokio::test]
            async fn test_create_without_user_omits_creator() {
                let service = $factory;
                let ack = service
                    .create(None::<&ActingUser>, &create_test_user("Anon", 20, true))
                    .await
                    .unwrap();

                let stored = service
                    .get_by_id(None::<&ActingUser>, &ack.id, None, None)
                    .await
                    .unwrap()
                    .unwrap();
                assert!(stored.get("createdBy").is_none());
                assert!(stored.get("createdAt").is_some());
            }

            #[tokio::test]
            async fn test_create_rejected_by_rules_writes_nothing() {
                let service = $factory;
                let mut invalid = create_test_user("X", -3, true);
                invalid.email = "not-an-email".to_string();

                let err = service.create(Some(&admin()), &invalid).await.unwrap_err();
                match err {
                    ServiceError::ValidationFailed(ValidationError::FieldErrors(errors)) => {
                        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                        assert_eq!(fields, vec!["name", "email", "age"]);
                    }
                    other => panic!("expected FieldErrors, got {:?}", other),
                }

                let all = service
                    .query_all(Some(&admin()), None, page(0, 0, None), None)
                    .await
                    .unwrap();
                assert_eq!(all.metadata.resultset.count, 0);
            }

            #[tokio::test]
            async fn test_get_nonexistent_is_none() {
                let service = $factory;
                let found = service
                    .get_by_id(Some(&admin()), &$missing_id, None, None)
                    .await
                    .unwrap();
                assert!(found.is_none());
            }

            #[tokio::test]
            async fn test_get_with_explicit_fields_still_redacts() {
                let service = $factory;
                let ack = service
                    .create(Some(&admin()), &create_test_user("Bob", 41, false))
                    .await
                    .unwrap();

                let fields = vec!["name".to_string(), "password".to_string()];
                let stored = service
                    .get_by_id(Some(&admin()), &ack.id, Some(fields.as_slice()), None)
                    .await
                    .unwrap()
                    .unwrap();

                assert_eq!(stored["name"], "Bob");
                assert!(stored.get("password").is_none());
                assert!(stored.get("email").is_none());
                assert!(stored.get("_id").is_some());
            }

            // ==================================================================
            // Listing
            // ==================================================================

            #[tokio::test]
            async fn test_list_defaults_skip_newest_and_count_all() {
                let service = $factory;
                for (name, age) in [("Alice", 30), ("Bob", 41), ("Carol", 25)] {
                    service
                        .create(Some(&admin()), &create_test_user(name, age, true))
                        .await
                        .unwrap();
                }

                let result = service
                    .query_all(Some(&admin()), None, None, None)
                    .await
                    .unwrap();

                // Newest first, and the default offset of 1 skips Carol
                assert_eq!(names(&result.results), vec!["Bob", "Alice"]);
                assert_eq!(result.metadata.resultset.count, 3);
                assert_eq!(result.metadata.resultset.offset, 1);
                assert_eq!(result.metadata.resultset.limit, 10);
                assert!(result.results.iter().all(|d| d.get("password").is_none()));
            }

            #[tokio::test]
            async fn test_list_empty_collection() {
                let service = $factory;
                let result = service
                    .query_all(Some(&admin()), None, page(0, 10, None), None)
                    .await
                    .unwrap();
                assert!(result.results.is_empty());
                assert_eq!(result.metadata.resultset.count, 0);
            }

            #[tokio::test]
            async fn test_list_filter_sort_and_paginate() {
                let service = $factory;
                for (name, age, active) in [
                    ("Alice", 30, true),
                    ("Bob", 41, false),
                    ("Carol", 25, true),
                    ("Dave", 52, true),
                    ("Eve", 19, true),
                ] {
                    service
                        .create(Some(&admin()), &create_test_user(name, age, active))
                        .await
                        .unwrap();
                }

                let result = service
                    .query_all(
                        Some(&admin()),
                        list(raw(r#"{"active": true, "age": {"$gte": 20}}"#), None),
                        page(1, 2, Some(r#"{"age": 1}"#)),
                        None,
                    )
                    .await
                    .unwrap();

                assert_eq!(result.metadata.resultset.count, 3);
                assert_eq!(names(&result.results), vec!["Alice", "Dave"]);
            }

            #[tokio::test]
            async fn test_list_accepts_named_sort_directions() {
                let service = $factory;
                for (name, age) in [("Alice", 30), ("Bob", 41), ("Carol", 25)] {
                    service
                        .create(Some(&admin()), &create_test_user(name, age, true))
                        .await
                        .unwrap();
                }

                let result = service
                    .query_all(Some(&admin()), None, page(0, 10, Some(r#"{"age": "desc"}"#)), None)
                    .await
                    .unwrap();
                assert_eq!(names(&result.results), vec!["Bob", "Alice", "Carol"]);
            }

            #[tokio::test]
            async fn test_list_limit_zero_returns_everything() {
                let service = $factory;
                for n in 0..12 {
                    service
                        .create(Some(&admin()), &create_test_user(&format!("User{}", n), 20 + n, true))
                        .await
                        .unwrap();
                }

                let result = service
                    .query_all(Some(&admin()), None, page(0, 0, None), None)
                    .await
                    .unwrap();
                assert_eq!(result.results.len(), 12);
                assert_eq!(result.metadata.resultset.count, 12);
            }

            #[tokio::test]
            async fn test_list_structured_filter_matches_raw_filter() {
                let service = $factory;
                for (name, age) in [("Alice", 30), ("Bob", 41)] {
                    service
                        .create(Some(&admin()), &create_test_user(name, age, true))
                        .await
                        .unwrap();
                }

                let raw_filter = r#"{"name": {"$in": ["Bob", "Zed"]}}"#;
                let parsed = service.parse_filter(raw(raw_filter).as_ref()).unwrap();
                let reparsed = service
                    .parse_filter(Some(&Expression::from(parsed.clone())))
                    .unwrap();
                assert_eq!(parsed, reparsed);

                let from_raw = service
                    .query_all(Some(&admin()), list(raw(raw_filter), None), page(0, 10, None), None)
                    .await
                    .unwrap();
                let from_doc = service
                    .query_all(
                        Some(&admin()),
                        list(Some(Expression::from(parsed)), None),
                        page(0, 10, None),
                        None,
                    )
                    .await
                    .unwrap();
                assert_eq!(names(&from_raw.results), vec!["Bob"]);
                assert_eq!(names(&from_raw.results), names(&from_doc.results));
            }

            #[tokio::test]
            async fn test_list_exclusion_fields_keep_password_hidden() {
                let service = $factory;
                service
                    .create(Some(&admin()), &create_test_user("Alice", 30, true))
                    .await
                    .unwrap();

                let result = service
                    .query_all(
                        Some(&admin()),
                        list(None, Some(vec!["-email"])),
                        page(0, 10, None),
                        None,
                    )
                    .await
                    .unwrap();

                let alice = &result.results[0];
                assert_eq!(alice["name"], "Alice");
                assert!(alice.get("email").is_none());
                assert!(alice.get("password").is_none());
            }

            #[tokio::test]
            async fn test_list_requested_password_stays_hidden() {
                let service = $factory;
                for (name, age) in [("Alice", 30), ("Bob", 41)] {
                    service
                        .create(Some(&admin()), &create_test_user(name, age, true))
                        .await
                        .unwrap();
                }

                let result = service
                    .query_all(
                        Some(&admin()),
                        list(None, Some(vec!["name", "password", "age"])),
                        page(0, 10, Some(r#"{"age": 1}"#)),
                        None,
                    )
                    .await
                    .unwrap();

                assert_eq!(names(&result.results), vec!["Alice", "Bob"]);
                for user in &result.results {
                    assert!(user.get("password").is_none());
                    assert!(user.get("email").is_none());
                    assert!(user.get("age").is_some());
                }
            }

            #[tokio::test]
            async fn test_list_rejects_malformed_filter_and_sort() {
                let service = $factory;

                let err = service
                    .query_all(Some(&admin()), list(raw("{name: Alice"), None), None, None)
                    .await
                    .unwrap_err();
                assert!(matches!(err, ServiceError::InvalidFilterSyntax { .. }));
                assert!(err.to_string().contains("it MUST be a valid JSON"));

                let err = service
                    .query_all(Some(&admin()), None, page(0, 10, Some("[1, 2]")), None)
                    .await
                    .unwrap_err();
                assert!(matches!(err, ServiceError::InvalidSortSyntax { .. }));
            }

            // ==================================================================
            // Update
            // ==================================================================

            #[tokio::test]
            async fn test_update_merges_and_stamps() {
                let service = $factory;
                let ack = service
                    .create(Some(&admin()), &create_test_user("Alice", 30, true))
                    .await
                    .unwrap();
                let before = service
                    .get_by_id(Some(&admin()), &ack.id, None, None)
                    .await
                    .unwrap()
                    .unwrap();

                let updated = service
                    .update(
                        Some(&editor()),
                        &ack.id,
                        &json!({"age": 31, "createdBy": "mallory", "nickname": "Al"}),
                    )
                    .await
                    .unwrap();
                assert_eq!(updated.id, ack.id);

                let after = service
                    .get_by_id(Some(&admin()), &ack.id, None, None)
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(after["age"], 31);
                assert_eq!(after["nickname"], "Al");
                assert_eq!(after["name"], "Alice");
                assert_eq!(after["email"], "alice@test.com");
                assert_eq!(after["createdBy"], "admin");
                assert_eq!(after["createdAt"], before["createdAt"]);
                assert_eq!(after["updatedBy"], "editor");
                assert!(after["updatedAt"].is_string());
            }

            #[tokio::test]
            async fn test_update_nonexistent_is_not_found() {
                let service = $factory;
                let err = service
                    .update(Some(&admin()), &$missing_id, &json!({"age": 40}))
                    .await
                    .unwrap_err();
                assert!(matches!(err, ServiceError::EntityNotFound { .. }));
                assert_eq!(err.error_code(), "ENTITY_NOT_FOUND");
            }

            #[tokio::test]
            async fn test_update_rejected_leaves_entity_unchanged() {
                let service = $factory;
                let ack = service
                    .create(Some(&admin()), &create_test_user("Alice", 30, true))
                    .await
                    .unwrap();

                let err = service
                    .update(Some(&admin()), &ack.id, &json!({"email": "nope"}))
                    .await
                    .unwrap_err();
                assert!(matches!(
                    err,
                    ServiceError::ValidationFailed(ValidationError::FieldError { .. })
                ));

                let stored = service
                    .get_by_id(Some(&admin()), &ack.id, None, None)
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(stored["email"], "alice@test.com");
                assert!(stored.get("updatedAt").is_none());
            }

            #[tokio::test]
            async fn test_update_breaking_entity_shape_is_rejected() {
                let service = $factory;
                let ack = service
                    .create(Some(&admin()), &create_test_user("Alice", 30, true))
                    .await
                    .unwrap();

                for patch in [json!({"email": null}), json!({"age": "old"})] {
                    let err = service
                        .update(Some(&editor()), &ack.id, &patch)
                        .await
                        .unwrap_err();
                    assert!(
                        matches!(
                            err,
                            ServiceError::ValidationFailed(ValidationError::InvalidJson { .. })
                        ),
                        "unexpected error for {}: {:?}",
                        patch,
                        err
                    );
                }

                // The entity is untouched and still accepts valid updates
                service
                    .update(Some(&editor()), &ack.id, &json!({"age": 31}))
                    .await
                    .unwrap();
                let stored = service
                    .get_by_id(Some(&admin()), &ack.id, None, None)
                    .await
                    .unwrap()
                    .unwrap();
                assert_eq!(stored["email"], "alice@test.com");
                assert_eq!(stored["age"], 31);
            }

            // ==================================================================
            // Delete
            // ==================================================================

            #[tokio::test]
            async fn test_delete_existing() {
                let service = $factory;
                let ack = service
                    .create(Some(&admin()), &create_test_user("Alice", 30, true))
                    .await
                    .unwrap();

                service.delete(Some(&admin()), &ack.id).await.unwrap();
                let found = service
                    .get_by_id(Some(&admin()), &ack.id, None, None)
                    .await
                    .unwrap();
                assert!(found.is_none());

                let err = service.delete(Some(&admin()), &ack.id).await.unwrap_err();
                assert!(matches!(err, ServiceError::EntityNotFound { .. }));
            }

            #[tokio::test]
            async fn test_delete_nonexistent_is_not_found() {
                let service = $factory;
                let err = service
                    .delete(Some(&admin()), &$missing_id)
                    .await
                    .unwrap_err();
                assert!(matches!(err, ServiceError::EntityNotFound { .. }));
            }

            // ==================================================================
            // Tokens & concurrency
            // ==================================================================

            #[tokio::test]
            async fn test_token_roundtrip_through_service() {
                let service = $factory;
                let token = service.issue_token(&admin()).unwrap();
                let claims: TokenClaims<ActingUser> = service.verify_token(&token).unwrap();
                assert_eq!(claims.user, admin());
                assert_eq!(claims.iss.as_deref(), Some("harness"));

                let err = service
                    .verify_token::<ActingUser>(&format!("{}x", token))
                    .unwrap_err();
                assert!(matches!(err, ServiceError::InvalidToken { .. }));
            }

            #[tokio::test]
            async fn test_concurrent_creates() {
                let service = $factory;
                let mut handles = Vec::new();
                for n in 0..10 {
                    let service = service.clone();
                    handles.push(tokio::spawn(async move {
                        service
                            .create(Some(&admin()), &create_test_user(&format!("Worker{}", n), 20 + n, true))
                            .await
                            .unwrap()
                    }));
                }
                for handle in handles {
                    handle.await.unwrap();
                }

                let all = service
                    .query_all(Some(&admin()), None, page(0, 0, None), None)
                    .await
                    .unwrap();
                assert_eq!(all.metadata.resultset.count, 10);
            }
        }
    };
}
