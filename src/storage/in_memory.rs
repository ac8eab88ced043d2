//! In-memory implementation of DocumentStore for testing and development

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use super::matcher;
use crate::core::DocumentStore;
use crate::core::entity::{Document, PRIMARY_KEY};
use crate::core::error::StorageError;
use crate::core::query::{FindQuery, PopulateSpec};

const BACKEND: &str = "memory";

#[derive(Debug)]
struct Collection {
    next_id: u64,
    docs: BTreeMap<u64, Document>,
}

/// In-memory document store
///
/// Ids are sequential `u64`s starting at 1, so sorting by `_id` descending
/// lists the most recently created documents first. Clones share the same
/// data. Uses RwLock for thread-safe access.
#[derive(Clone, Debug)]
pub struct InMemoryStore {
    name: Arc<str>,
    inner: Arc<RwLock<Collection>>,
    relations: HashMap<String, InMemoryStore>,
}

impl InMemoryStore {
    /// Create an empty collection
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
            inner: Arc::new(RwLock::new(Collection {
                next_id: 1,
                docs: BTreeMap::new(),
            })),
            relations: HashMap::new(),
        }
    }

    /// Declare that `path` holds ids of documents in `related`, so that
    /// populating `path` replaces those ids with the documents
    pub fn with_relation(mut self, path: impl Into<String>, related: InMemoryStore) -> Self {
        self.relations.insert(path.into(), related);
        self
    }

    /// Number of stored documents
    pub fn len(&self) -> Result<usize, StorageError> {
        Ok(self.read()?.docs.len())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Collection>, StorageError> {
        self.inner
            .read()
            .map_err(|e| StorageError::query(BACKEND, format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Collection>, StorageError> {
        self.inner.write().map_err(|e| {
            StorageError::query(BACKEND, format!("Failed to acquire write lock: {}", e))
        })
    }

    fn get_raw(&self, id: &Value) -> Result<Option<Document>, StorageError> {
        let Some(id) = id.as_u64() else {
            return Ok(None);
        };
        Ok(self.read()?.docs.get(&id).cloned())
    }

    /// Replace ids at `spec.path` with the related documents.
    ///
    /// A single missing reference becomes `null`; missing entries of an id
    /// array are dropped. Unknown paths are left untouched.
    fn populate(&self, docs: &mut [Document], spec: &PopulateSpec) -> Result<(), StorageError> {
        let Some(related) = self.relations.get(&spec.path) else {
            tracing::debug!(
                collection = %self.name,
                path = %spec.path,
                "No relation registered for populate path"
            );
            return Ok(());
        };
        let select = spec.select_fields();

        for doc in docs.iter_mut() {
            let Some(reference) = doc.get(&spec.path).cloned() else {
                continue;
            };
            let expanded = match reference {
                Value::Array(ids) => {
                    let mut found = Vec::with_capacity(ids.len());
                    for id in &ids {
                        if let Some(target) = related.get_raw(id)? {
                            found.push(Value::Object(matcher::project(&target, &select)));
                        }
                    }
                    Value::Array(found)
                }
                id => related
                    .get_raw(&id)?
                    .map(|target| Value::Object(matcher::project(&target, &select)))
                    .unwrap_or(Value::Null),
            };
            doc.insert(spec.path.clone(), expanded);
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    type Id = u64;

    fn collection_name(&self) -> &str {
        &self.name
    }

    async fn find(&self, query: &FindQuery) -> Result<Vec<Document>, StorageError> {
        let keys = matcher::sort_keys(&query.sort)?;

        let mut page = {
            let collection = self.read()?;
            let mut hits = Vec::new();
            for doc in collection.docs.values() {
                if matcher::matches(doc, &query.filter)? {
                    hits.push(doc.clone());
                }
            }
            hits
        };

        matcher::sort_documents(&mut page, &keys);

        let skip = usize::try_from(query.skip).unwrap_or(usize::MAX);
        let limit = match query.limit {
            0 => usize::MAX,
            n => usize::try_from(n).unwrap_or(usize::MAX),
        };
        let mut page: Vec<Document> = page
            .into_iter()
            .skip(skip)
            .take(limit)
            .map(|doc| matcher::project(&doc, &query.projection))
            .collect();

        if let Some(spec) = &query.populate {
            self.populate(&mut page, spec)?;
        }

        Ok(page)
    }

    async fn count(&self, filter: &Document) -> Result<u64, StorageError> {
        let collection = self.read()?;
        let mut count = 0;
        for doc in collection.docs.values() {
            if matcher::matches(doc, filter)? {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn find_by_id(
        &self,
        id: &u64,
        projection: &[String],
        populate: Option<&PopulateSpec>,
    ) -> Result<Option<Document>, StorageError> {
        let found = self
            .read()?
            .docs
            .get(id)
            .map(|doc| matcher::project(doc, projection));

        let Some(doc) = found else {
            return Ok(None);
        };

        let mut docs = [doc];
        if let Some(spec) = populate {
            self.populate(&mut docs, spec)?;
        }
        let [doc] = docs;
        Ok(Some(doc))
    }

    async fn insert(&self, doc: Document) -> Result<u64, StorageError> {
        let mut collection = self.write()?;
        let id = collection.next_id;
        collection.next_id += 1;

        let mut stored = Document::new();
        stored.insert(PRIMARY_KEY.to_string(), Value::from(id));
        stored.extend(doc.into_iter().filter(|(k, _)| k != PRIMARY_KEY));

        collection.docs.insert(id, stored);
        Ok(id)
    }

    async fn save(&self, id: &u64, mut doc: Document) -> Result<(), StorageError> {
        let mut collection = self.write()?;
        let Some(slot) = collection.docs.get_mut(id) else {
            return Err(StorageError::query(
                BACKEND,
                format!("No document found for {} with id {}", self.name, id),
            ));
        };

        doc.insert(PRIMARY_KEY.to_string(), Value::from(*id));
        *slot = doc;
        Ok(())
    }

    async fn delete_one(&self, id: &u64) -> Result<(), StorageError> {
        self.write()?.docs.remove(id);
        Ok(())
    }
}
