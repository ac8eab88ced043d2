//! Documents, caller identities and audit stamping
//!
//! Entities travel through the service as plain [`Document`]s: a JSON object
//! that keeps field insertion order. Concrete services stay typed through the
//! `T` parameter of [`EntityService`](crate::core::service::EntityService);
//! this module only deals with the fields every entity shares.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::error::{StorageError, ValidationError};

/// A detached entity: plain data with no handle back to the store
pub type Document = serde_json::Map<String, Value>;

/// Primary key field, assigned by the store on insert
pub const PRIMARY_KEY: &str = "_id";

/// Creation timestamp, set once on create
pub const CREATED_AT: &str = "createdAt";

/// Creating actor, set once on create
pub const CREATED_BY: &str = "createdBy";

/// Last update timestamp
pub const UPDATED_AT: &str = "updatedAt";

/// Last updating actor
pub const UPDATED_BY: &str = "updatedBy";

/// Fields a payload can never overwrite on update
pub const IMMUTABLE_FIELDS: &[&str] = &[PRIMARY_KEY, CREATED_AT, CREATED_BY];

/// Identity of whoever is calling the service.
///
/// Only the identifier is consumed, for audit stamping. The identity is never
/// checked against any policy.
pub trait Actor: Send + Sync {
    /// Identifier type recorded in `createdBy` / `updatedBy`
    type Id: Serialize;

    /// The caller's identifier
    fn id(&self) -> &Self::Id;
}

/// Default caller identity: an id plus whatever else the caller carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActingUser<Id = String> {
    pub id: Id,

    /// Extra attributes (name, roles, ...) kept verbatim
    #[serde(flatten)]
    pub attributes: Document,
}

impl<Id> ActingUser<Id> {
    pub fn new(id: Id) -> Self {
        Self {
            id,
            attributes: Document::new(),
        }
    }

    /// Attach an attribute, builder style
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

impl<Id: Serialize + Send + Sync> Actor for ActingUser<Id> {
    type Id = Id;

    fn id(&self) -> &Id {
        &self.id
    }
}

/// Serialize a payload into a document.
///
/// Anything that does not serialize to a JSON object is rejected.
pub fn to_document<P: Serialize + ?Sized>(payload: &P) -> Result<Document, ValidationError> {
    match serde_json::to_value(payload) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(ValidationError::InvalidJson {
            message: format!("expected an object, got {}", value_kind(&other)),
        }),
        Err(e) => Err(ValidationError::InvalidJson {
            message: e.to_string(),
        }),
    }
}

/// Deserialize a stored document into the service's entity type
pub fn from_document<T: DeserializeOwned>(doc: &Document) -> Result<T, StorageError> {
    serde_json::from_value(Value::Object(doc.clone())).map_err(StorageError::serialization)
}

/// Serialize an actor id, or `None` when there is no actor
pub(crate) fn actor_value<A: Actor + ?Sized>(user: Option<&A>) -> Result<Option<Value>, StorageError> {
    user.map(|u| serde_json::to_value(u.id()))
        .transpose()
        .map_err(StorageError::serialization)
}

/// Stamp `createdAt` / `createdBy` on a new document.
///
/// `createdBy` is left out entirely when there is no actor.
pub fn stamp_created(doc: &mut Document, actor: Option<Value>, now: DateTime<Utc>) {
    doc.insert(CREATED_AT.to_string(), Value::String(now.to_rfc3339()));
    match actor {
        Some(id) => {
            doc.insert(CREATED_BY.to_string(), id);
        }
        None => {
            doc.remove(CREATED_BY);
        }
    }
}

/// Stamp `updatedAt` / `updatedBy` on a document being saved
pub fn stamp_updated(doc: &mut Document, actor: Option<Value>, now: DateTime<Utc>) {
    doc.insert(UPDATED_AT.to_string(), Value::String(now.to_rfc3339()));
    match actor {
        Some(id) => {
            doc.insert(UPDATED_BY.to_string(), id);
        }
        None => {
            doc.remove(UPDATED_BY);
        }
    }
}

/// Shallow-merge `patch` onto `target`.
///
/// Top-level keys of the patch replace the target's; keys the patch does not
/// mention are kept. Immutable fields in the patch are ignored.
pub fn merge_shallow(target: &mut Document, patch: Document) {
    for (key, value) in patch {
        if IMMUTABLE_FIELDS.contains(&key.as_str()) {
            continue;
        }
        target.insert(key, value);
    }
}

pub(crate) fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_to_document_rejects_non_objects() {
        assert!(to_document(&json!({"a": 1})).is_ok());

        let err = to_document(&json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("array"));
        assert!(to_document(&"text").is_err());
    }

    #[test]
    fn test_merge_shallow_preserves_omitted_fields() {
        let mut target = doc(json!({"a": 1, "b": 2}));
        merge_shallow(&mut target, doc(json!({"b": 3})));
        assert_eq!(Value::Object(target), json!({"a": 1, "b": 3}));
    }

    #[test]
    fn test_merge_shallow_replaces_nested_objects_whole() {
        let mut target = doc(json!({"address": {"city": "Lyon", "zip": "69000"}}));
        merge_shallow(&mut target, doc(json!({"address": {"city": "Paris"}})));
        assert_eq!(target["address"], json!({"city": "Paris"}));
    }

    #[test]
    fn test_merge_shallow_ignores_immutable_fields() {
        let mut target = doc(json!({"_id": 1, "createdAt": "t0", "createdBy": "u1", "a": 1}));
        merge_shallow(
            &mut target,
            doc(json!({"_id": 9, "createdAt": "t9", "createdBy": "u9", "a": 2})),
        );
        assert_eq!(target["_id"], 1);
        assert_eq!(target["createdAt"], "t0");
        assert_eq!(target["createdBy"], "u1");
        assert_eq!(target["a"], 2);
    }

    #[test]
    fn test_stamp_without_actor_omits_actor_field() {
        let now = Utc::now();
        let mut d = doc(json!({"updatedBy": "previous"}));
        stamp_updated(&mut d, None, now);
        assert!(!d.contains_key(UPDATED_BY));
        assert_eq!(d[UPDATED_AT], now.to_rfc3339());

        stamp_created(&mut d, Some(json!("u1")), now);
        assert_eq!(d[CREATED_BY], "u1");
    }

    #[test]
    fn test_acting_user_flattens_attributes() {
        let user = ActingUser::new("u1".to_string()).with_attribute("role", "admin");
        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(value, json!({"id": "u1", "role": "admin"}));
        assert_eq!(actor_value(Some(&user)).unwrap(), Some(json!("u1")));
        assert_eq!(actor_value::<ActingUser>(None).unwrap(), None);
    }
}
