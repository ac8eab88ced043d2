//! Storage backend contract

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::{Debug, Display};

use crate::core::entity::Document;
use crate::core::error::StorageError;
use crate::core::query::{FindQuery, PopulateSpec};

/// One backing collection.
///
/// The entity service only ever talks to storage through this trait. Reads
/// return detached documents; writes take whole documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Primary key type assigned by the store
    type Id: Clone + Debug + Display + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Name of the backing collection, used in error messages and traces
    fn collection_name(&self) -> &str;

    /// Documents matching `query.filter`, projected, expanded, sorted, then
    /// skipped and limited in that order
    async fn find(&self, query: &FindQuery) -> Result<Vec<Document>, StorageError>;

    /// Number of documents matching `filter`
    async fn count(&self, filter: &Document) -> Result<u64, StorageError>;

    /// A single document by primary key, `Ok(None)` when absent
    async fn find_by_id(
        &self,
        id: &Self::Id,
        projection: &[String],
        populate: Option<&PopulateSpec>,
    ) -> Result<Option<Document>, StorageError>;

    /// Insert a new document and return its assigned primary key
    async fn insert(&self, doc: Document) -> Result<Self::Id, StorageError>;

    /// Replace the stored document with `doc`
    async fn save(&self, id: &Self::Id, doc: Document) -> Result<(), StorageError>;

    /// Remove one document by primary key
    async fn delete_one(&self, id: &Self::Id) -> Result<(), StorageError>;
}
