//! MongoDB storage backend using the official MongoDB async driver.
//!
//! # Feature flag
//!
//! This module is gated behind the `mongodb_backend` feature flag:
//! ```toml
//! [dependencies]
//! docbase = { version = "0.1", features = ["mongodb_backend"] }
//! ```
//!
//! # Serialization strategy
//!
//! Documents cross the boundary as canonical extended JSON: filters and
//! payloads are parsed with `Bson::try_from(serde_json::Value)` so that
//! `{"$oid": ...}` and `{"$date": ...}` keep their BSON types, and results
//! come back as relaxed extended JSON.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{self, Bson, doc};
use mongodb::{Client, Database};
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

use crate::core::DocumentStore;
use crate::core::entity::{Document, PRIMARY_KEY};
use crate::core::error::StorageError;
use crate::core::query::{FindQuery, PopulateSpec, bare_field, is_exclusion};
use crate::storage::matcher;

const BACKEND: &str = "mongodb";

/// Delay between two connection attempts
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

/// Convert a JSON object into a BSON document, honouring extended JSON
fn to_bson_document(doc: &Document) -> Result<bson::Document, StorageError> {
    match Bson::try_from(Value::Object(doc.clone())) {
        Ok(Bson::Document(d)) => Ok(d),
        Ok(other) => Err(StorageError::serialization(format!(
            "expected a BSON document, got {:?}",
            other.element_type()
        ))),
        Err(e) => Err(StorageError::serialization(e)),
    }
}

/// Convert a BSON document back into a JSON object
fn to_json_document(doc: bson::Document) -> Document {
    match Bson::Document(doc).into_relaxed_extjson() {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

/// Sort document with every direction normalised to `1` / `-1`.
///
/// Accepts the same directions as the in-memory store, `"asc"` and `"desc"`
/// included, which the server would otherwise reject.
fn sort_document(sort: &Document) -> Result<bson::Document, StorageError> {
    let keys = matcher::sort_keys(sort).map_err(|e| match e {
        StorageError::QueryError { message, .. } => StorageError::query(BACKEND, message),
        other => other,
    })?;

    let mut normalised = bson::Document::new();
    for (field, descending) in keys {
        normalised.insert(field, if descending { -1_i32 } else { 1_i32 });
    }
    Ok(normalised)
}

/// Turn a `["name", "-secret"]` list into a `$project` stage body
fn projection_document(fields: &[String]) -> bson::Document {
    let mut projection = bson::Document::new();
    for field in fields {
        let flag = if is_exclusion(field) { 0 } else { 1 };
        projection.insert(bare_field(field), flag);
    }
    projection
}

/// Whether a projection list leaves `field` in the output
fn projection_keeps(fields: &[String], field: &str) -> bool {
    if fields.iter().any(|f| !is_exclusion(f)) {
        fields.iter().any(|f| !is_exclusion(f) && bare_field(f) == field)
    } else {
        !fields.iter().any(|f| bare_field(f) == field)
    }
}

fn query_error(e: mongodb::error::Error) -> StorageError {
    StorageError::query(BACKEND, e)
}

/// Parse the hex form of an ObjectId
pub fn parse_object_id(id: &str) -> Result<ObjectId, StorageError> {
    ObjectId::parse_str(id).map_err(|e| StorageError::InvalidId {
        id: id.to_string(),
        message: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Relations
// ---------------------------------------------------------------------------

/// Target of a populate path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    /// Collection holding the referenced documents
    pub collection: String,

    /// Whether the path holds an array of ids
    pub many: bool,
}

impl Relation {
    pub fn one(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            many: false,
        }
    }

    pub fn many(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            many: true,
        }
    }
}

// ---------------------------------------------------------------------------
// MongoStore
// ---------------------------------------------------------------------------

/// Document store backed by one MongoDB collection.
///
/// # Example
///
/// ```rust,ignore
/// use docbase::storage::mongodb::{MongoOptions, MongoStore, Relation, connect};
///
/// let db = connect(Some(MongoOptions::new("mongodb://localhost:27017", "app")))
///     .await
///     .expect("enabled");
/// let books = MongoStore::new(&db, "books").with_relation("author", Relation::one("authors"));
/// ```
#[derive(Clone, Debug)]
pub struct MongoStore {
    collection: mongodb::Collection<bson::Document>,
    relations: HashMap<String, Relation>,
}

impl MongoStore {
    pub fn new(database: &Database, collection: &str) -> Self {
        Self {
            collection: database.collection(collection),
            relations: HashMap::new(),
        }
    }

    /// Declare that `path` references documents of another collection
    pub fn with_relation(mut self, path: impl Into<String>, relation: Relation) -> Self {
        self.relations.insert(path.into(), relation);
        self
    }

    /// Aggregation stages expanding `spec.path`, `None` for unknown paths
    fn lookup_stages(&self, spec: &PopulateSpec) -> Option<Vec<bson::Document>> {
        let Some(relation) = self.relations.get(&spec.path) else {
            tracing::debug!(
                collection = %self.collection.name(),
                path = %spec.path,
                "No relation registered for populate path"
            );
            return None;
        };

        let mut lookup = doc! {
            "from": relation.collection.clone(),
            "localField": spec.path.clone(),
            "foreignField": PRIMARY_KEY,
            "as": spec.path.clone(),
        };
        let select = spec.select_fields();
        if !select.is_empty() {
            lookup.insert("pipeline", vec![doc! { "$project": projection_document(&select) }]);
        }

        let mut stages = vec![doc! { "$lookup": lookup }];
        if !relation.many {
            stages.push(doc! {
                "$unwind": {
                    "path": format!("${}", spec.path),
                    "preserveNullAndEmptyArrays": true,
                }
            });
        }
        Some(stages)
    }

    /// A single-valued reference that matched nothing reads as `null`
    fn fill_missing_reference(&self, doc: &mut Document, spec: &PopulateSpec) {
        if let Some(relation) = self.relations.get(&spec.path)
            && !relation.many
            && !doc.contains_key(&spec.path)
        {
            doc.insert(spec.path.clone(), Value::Null);
        }
    }

    async fn aggregate(
        &self,
        pipeline: Vec<bson::Document>,
        populate: Option<&PopulateSpec>,
    ) -> Result<Vec<Document>, StorageError> {
        let cursor = self
            .collection
            .aggregate(pipeline)
            .await
            .map_err(query_error)?;
        let docs: Vec<bson::Document> = cursor.try_collect().await.map_err(query_error)?;

        Ok(docs
            .into_iter()
            .map(|d| {
                let mut doc = to_json_document(d);
                if let Some(spec) = populate {
                    self.fill_missing_reference(&mut doc, spec);
                }
                doc
            })
            .collect())
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    type Id = ObjectId;

    fn collection_name(&self) -> &str {
        self.collection.name()
    }

    async fn find(&self, query: &FindQuery) -> Result<Vec<Document>, StorageError> {
        let filter = to_bson_document(&query.filter)?;
        let sort = sort_document(&query.sort)?;
        let skip = i64::try_from(query.skip).unwrap_or(i64::MAX);
        let lookup = query
            .populate
            .as_ref()
            .and_then(|spec| self.lookup_stages(spec));

        let Some(lookup) = lookup else {
            let mut find = self.collection.find(filter).sort(sort).skip(query.skip);
            if query.limit > 0 {
                find = find.limit(i64::try_from(query.limit).unwrap_or(i64::MAX));
            }
            if !query.projection.is_empty() {
                find = find.projection(projection_document(&query.projection));
            }
            let cursor = find.await.map_err(query_error)?;
            let docs: Vec<bson::Document> = cursor.try_collect().await.map_err(query_error)?;
            return Ok(docs.into_iter().map(to_json_document).collect());
        };

        let mut pipeline = vec![doc! { "$match": filter }];
        if !sort.is_empty() {
            pipeline.push(doc! { "$sort": sort });
        }
        pipeline.push(doc! { "$skip": skip });
        if query.limit > 0 {
            pipeline.push(doc! { "$limit": i64::try_from(query.limit).unwrap_or(i64::MAX) });
        }
        pipeline.extend(lookup);
        if !query.projection.is_empty() {
            pipeline.push(doc! { "$project": projection_document(&query.projection) });
        }

        let populate = query
            .populate
            .as_ref()
            .filter(|spec| projection_keeps(&query.projection, &spec.path));
        self.aggregate(pipeline, populate).await
    }

    async fn count(&self, filter: &Document) -> Result<u64, StorageError> {
        self.collection
            .count_documents(to_bson_document(filter)?)
            .await
            .map_err(query_error)
    }

    async fn find_by_id(
        &self,
        id: &ObjectId,
        projection: &[String],
        populate: Option<&PopulateSpec>,
    ) -> Result<Option<Document>, StorageError> {
        let lookup = populate.and_then(|spec| self.lookup_stages(spec));

        let Some(lookup) = lookup else {
            let mut find_one = self.collection.find_one(doc! { PRIMARY_KEY: *id });
            if !projection.is_empty() {
                find_one = find_one.projection(projection_document(projection));
            }
            let found = find_one.await.map_err(query_error)?;
            return Ok(found.map(to_json_document));
        };

        let mut pipeline = vec![doc! { "$match": { PRIMARY_KEY: *id } }, doc! { "$limit": 1 }];
        pipeline.extend(lookup);
        if !projection.is_empty() {
            pipeline.push(doc! { "$project": projection_document(projection) });
        }

        let populate = populate.filter(|spec| projection_keeps(projection, &spec.path));
        Ok(self.aggregate(pipeline, populate).await?.into_iter().next())
    }

    async fn insert(&self, doc: Document) -> Result<ObjectId, StorageError> {
        let mut document = to_bson_document(&doc)?;
        document.remove(PRIMARY_KEY);

        let result = self
            .collection
            .insert_one(document)
            .await
            .map_err(query_error)?;

        result.inserted_id.as_object_id().ok_or_else(|| {
            StorageError::serialization(format!(
                "expected an ObjectId primary key, got {}",
                result.inserted_id
            ))
        })
    }

    async fn save(&self, id: &ObjectId, doc: Document) -> Result<(), StorageError> {
        let mut document = to_bson_document(&doc)?;
        document.insert(PRIMARY_KEY, *id);

        let result = self
            .collection
            .replace_one(doc! { PRIMARY_KEY: *id }, document)
            .await
            .map_err(query_error)?;

        if result.matched_count == 0 {
            return Err(StorageError::query(
                BACKEND,
                format!("No document found for {} with id {}", self.collection.name(), id),
            ));
        }
        Ok(())
    }

    async fn delete_one(&self, id: &ObjectId) -> Result<(), StorageError> {
        self.collection
            .delete_one(doc! { PRIMARY_KEY: *id })
            .await
            .map_err(query_error)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Connection bootstrap
// ---------------------------------------------------------------------------

/// Where to connect
#[derive(Debug, Clone)]
pub struct MongoOptions {
    pub uri: String,
    pub database: String,
    pub retry_delay: Duration,
}

impl MongoOptions {
    pub fn new(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
            retry_delay: RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}

/// Connect to MongoDB, retrying until the server answers a ping.
///
/// Returns `None` without connecting when no options are given. Otherwise
/// this never gives up: each failed attempt is logged and retried after
/// `retry_delay`.
pub async fn connect(options: Option<MongoOptions>) -> Option<Database> {
    let Some(options) = options else {
        tracing::info!("MongoDB disabled: no connection options provided");
        return None;
    };

    let mut attempt: u64 = 1;
    loop {
        match try_connect(&options).await {
            Ok(database) => {
                tracing::info!(database = %options.database, attempt, "MongoDB connected");
                return Some(database);
            }
            Err(e) => {
                tracing::error!(
                    database = %options.database,
                    attempt,
                    error = %e,
                    retry_in_ms = options.retry_delay.as_millis() as u64,
                    "MongoDB connection failed, retrying"
                );
                tokio::time::sleep(options.retry_delay).await;
                attempt += 1;
            }
        }
    }
}

async fn try_connect(options: &MongoOptions) -> Result<Database, StorageError> {
    let connection_error = |e: mongodb::error::Error| StorageError::ConnectionError {
        backend: BACKEND.to_string(),
        message: e.to_string(),
    };

    let client = Client::with_uri_str(&options.uri)
        .await
        .map_err(connection_error)?;
    let database = client.database(&options.database);
    database
        .run_command(doc! { "ping": 1 })
        .await
        .map_err(connection_error)?;
    Ok(database)
}
