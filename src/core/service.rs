//! Generic entity service over one backing collection
//!
//! [`EntityService`] gives every concrete resource the same CRUD semantics:
//! filtered, sorted, paginated and projected listings, lookups by id, and
//! validated, audit-stamped writes. A resource is described by composition:
//! the backing store, the sensitive fields to redact, a validation strategy
//! and the service configuration.
//!
//! # Example
//!
//! ```rust,ignore
//! let users = EntityService::<User, _>::builder(InMemoryStore::new("users"))
//!     .sensitive_fields(["-password"])
//!     .validator(FieldRules::new().field("email", validators::required()))
//!     .config(ServiceConfig::from_env()?)
//!     .build()?;
//!
//! let created = users.create(Some(&admin), &new_user).await?;
//! let page = users.query_all(Some(&admin), None, None, None).await?;
//! ```

use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::config::{ServiceConfig, Verbosity};
use crate::core::auth::{TokenClaims, TokenSigner};
use crate::core::entity::{
    Actor, Document, PRIMARY_KEY, UPDATED_AT, UPDATED_BY, actor_value, from_document,
    merge_shallow, stamp_created, stamp_updated, to_document,
};
use crate::core::error::{ServiceError, ValidationError};
use crate::core::query::{
    self, Expression, FindQuery, ListQuery, Pagination, PopulateSpec, QueryResult,
};
use crate::core::store::DocumentStore;
use crate::core::validation::{AcceptAll, Validator};

/// Acknowledgement of a write: the affected id, never the entity itself
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WriteAck<Id> {
    pub id: Id,
}

/// CRUD service for entities of type `T` stored in `S`
pub struct EntityService<T, S: DocumentStore> {
    store: Arc<S>,
    sensitive_fields: Arc<[String]>,
    validator: Arc<dyn Validator<T>>,
    config: ServiceConfig,
    tokens: TokenSigner,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S: DocumentStore> Clone for EntityService<T, S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            sensitive_fields: self.sensitive_fields.clone(),
            validator: self.validator.clone(),
            config: self.config.clone(),
            tokens: self.tokens.clone(),
            _marker: PhantomData,
        }
    }
}

/// Builder for [`EntityService`]
pub struct EntityServiceBuilder<T, S> {
    store: S,
    sensitive_fields: Vec<String>,
    validator: Option<Arc<dyn Validator<T>>>,
    config: ServiceConfig,
}

impl<T, S> EntityServiceBuilder<T, S>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
    S: DocumentStore,
{
    /// Fields to redact from reads, `-name` form excludes them by default
    pub fn sensitive_fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        self.sensitive_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Validation run before create and update, accepts everything by default
    pub fn validator<V: Validator<T> + 'static>(mut self, validator: V) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn config(mut self, config: ServiceConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<EntityService<T, S>, ServiceError> {
        let tokens = TokenSigner::new(&self.config.token)?;

        for field in &self.sensitive_fields {
            if !query::is_exclusion(field) {
                tracing::warn!(
                    collection = self.store.collection_name(),
                    field = %field,
                    "Sensitive field declared without '-' marker, default listings will select it"
                );
            }
        }

        Ok(EntityService {
            store: Arc::new(self.store),
            sensitive_fields: self.sensitive_fields.into(),
            validator: self.validator.unwrap_or_else(|| Arc::new(AcceptAll)),
            config: self.config,
            tokens,
            _marker: PhantomData,
        })
    }
}

impl<T, S> EntityService<T, S>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
    S: DocumentStore,
{
    pub fn builder(store: S) -> EntityServiceBuilder<T, S> {
        EntityServiceBuilder {
            store,
            sensitive_fields: Vec::new(),
            validator: None,
            config: ServiceConfig::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn sensitive_fields(&self) -> &[String] {
        &self.sensitive_fields
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    // === Reads ===

    /// List entities matching a filter, one page at a time.
    ///
    /// Omitted pagination means offset 1, limit 10; an omitted or empty sort
    /// means primary key descending. `metadata.resultset.count` is the total
    /// number of matches, ignoring offset and limit.
    pub async fn query_all<A: Actor>(
        &self,
        user: Option<&A>,
        query: Option<ListQuery>,
        pagination: Option<Pagination>,
        populate: Option<PopulateSpec>,
    ) -> Result<QueryResult, ServiceError> {
        let query = query.unwrap_or_default();
        let pagination = pagination.unwrap_or_default();

        let find = FindQuery {
            filter: self.parse_filter(query.filter.as_ref())?,
            projection: self.select_fields(query.fields.as_deref()),
            populate,
            skip: pagination.offset,
            limit: pagination.limit,
            sort: query::resolve_sort(pagination.sort.as_ref())?,
        };

        if self.config.verbosity == Verbosity::High {
            self.trace_search(user, &find);
        }

        let results = self.store.find(&find).await?;
        let count = self.store.count(&find.filter).await?;

        Ok(QueryResult::new(
            results,
            count,
            pagination.offset,
            pagination.limit,
        ))
    }

    /// Fetch one entity, `Ok(None)` when it does not exist.
    ///
    /// The projection goes through the same sensitive-field policy as listings.
    pub async fn get_by_id<A: Actor>(
        &self,
        _user: Option<&A>,
        id: &S::Id,
        projection: Option<&[String]>,
        populate: Option<PopulateSpec>,
    ) -> Result<Option<Document>, ServiceError> {
        let projection = self.select_fields(projection);
        let doc = self
            .store
            .find_by_id(id, &projection, populate.as_ref())
            .await?;
        Ok(doc)
    }

    // === Writes ===

    /// Validate and insert a new entity, returning only its id
    pub async fn create<A: Actor>(
        &self,
        user: Option<&A>,
        payload: &T,
    ) -> Result<WriteAck<S::Id>, ServiceError> {
        let mut doc = to_document(payload)?;
        self.validator.validate(None, &doc).await?;

        for key in [PRIMARY_KEY, UPDATED_AT, UPDATED_BY] {
            doc.remove(key);
        }
        stamp_created(&mut doc, actor_value(user)?, Utc::now());

        let id = self.store.insert(doc).await?;
        tracing::debug!(collection = self.store.collection_name(), %id, "Entity created");

        Ok(WriteAck { id })
    }

    /// Validate and shallow-merge `payload` onto an existing entity.
    ///
    /// Fields missing from the payload keep their stored value. `_id`,
    /// `createdAt` and `createdBy` cannot be changed.
    pub async fn update<A: Actor, P: Serialize + ?Sized>(
        &self,
        user: Option<&A>,
        id: &S::Id,
        payload: &P,
    ) -> Result<WriteAck<S::Id>, ServiceError> {
        let mut doc = self
            .store
            .find_by_id(id, &[], None)
            .await?
            .ok_or_else(|| self.not_found(id))?;

        let patch = to_document(payload)?;
        let existing: T = from_document(&doc)?;
        self.validator.validate(Some(&existing), &patch).await?;

        merge_shallow(&mut doc, patch);
        // The merged entity must still read back as `T`
        serde_json::from_value::<T>(Value::Object(doc.clone())).map_err(|e| {
            ValidationError::InvalidJson {
                message: e.to_string(),
            }
        })?;
        stamp_updated(&mut doc, actor_value(user)?, Utc::now());

        self.store.save(id, doc).await?;
        tracing::debug!(collection = self.store.collection_name(), %id, "Entity updated");

        Ok(WriteAck { id: id.clone() })
    }

    /// Remove an entity. No soft delete and no cascade.
    pub async fn delete<A: Actor>(&self, _user: Option<&A>, id: &S::Id) -> Result<(), ServiceError> {
        if self.store.find_by_id(id, &[], None).await?.is_none() {
            return Err(self.not_found(id));
        }

        self.store.delete_one(id).await?;
        tracing::debug!(collection = self.store.collection_name(), %id, "Entity deleted");

        Ok(())
    }

    // === Helpers ===

    /// Resolve a client filter, see [`query::parse_filter`]
    pub fn parse_filter(&self, filter: Option<&Expression>) -> Result<Document, ServiceError> {
        query::parse_filter(filter)
    }

    /// Resolve a client sort, see [`query::parse_sort`]
    pub fn parse_sort(&self, sort: Option<&Expression>) -> Result<Document, ServiceError> {
        query::parse_sort(sort)
    }

    /// Projection for a read after applying this service's redaction policy
    pub fn select_fields(&self, requested: Option<&[String]>) -> Vec<String> {
        query::select_fields(requested, &self.sensitive_fields)
    }

    /// Issue a signed token for `user`
    pub fn issue_token<U: Serialize>(&self, user: &U) -> Result<String, ServiceError> {
        self.tokens.issue(user)
    }

    /// Verify a token issued with this service's configuration
    pub fn verify_token<U: DeserializeOwned>(
        &self,
        token: &str,
    ) -> Result<TokenClaims<U>, ServiceError> {
        self.tokens.verify(token)
    }

    fn not_found(&self, id: &S::Id) -> ServiceError {
        ServiceError::EntityNotFound {
            collection: self.store.collection_name().to_string(),
            id: id.to_string(),
        }
    }

    fn trace_search<A: Actor>(&self, user: Option<&A>, find: &FindQuery) {
        let actor = actor_value(user).ok().flatten().unwrap_or(Value::Null);
        let populate = find
            .populate
            .as_ref()
            .and_then(|p| serde_json::to_value(p).ok())
            .unwrap_or(Value::Null);

        let filter = Value::Object(find.filter.clone());
        let sort = Value::Object(find.sort.clone());

        tracing::info!(
            collection = self.store.collection_name(),
            actor = %actor,
            filter = %filter,
            select = ?find.projection,
            sort = %sort,
            populate = %populate,
            skip = find.skip,
            limit = find.limit,
            "Search params"
        );
    }
}
