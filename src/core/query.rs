//! Query parameters, pagination and result shaping
//!
//! Clients send filters and sorts either as already-structured documents or
//! as strings in JSON / Mongo query syntax. Both forms resolve to the same
//! [`Document`] before anything reaches the store.
//!
//! # Example
//! ```rust,ignore
//! // GET /users?filter={"age":{"$gte":18}}&fields=name&fields=email&sort={"name":1}
//! let query = ListQuery {
//!     filter: Some(Expression::raw(r#"{"age":{"$gte":18}}"#)),
//!     fields: Some(vec!["name".into(), "email".into()]),
//! };
//! let pagination = Pagination { offset: 0, limit: 20, sort: Some(Expression::raw(r#"{"name":1}"#)) };
//! let page = service.query_all(Some(&user), Some(query), Some(pagination), None).await?;
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::entity::{Document, PRIMARY_KEY, value_kind};
use crate::core::error::ServiceError;

/// Marker prefix that turns a projection entry into an exclusion
pub const EXCLUDE_MARKER: char = '-';

/// A filter or sort as supplied by the client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expression {
    /// String in JSON / Mongo query syntax, parsed on use
    Raw(String),

    /// Already structured, used as-is
    Structured(Document),
}

impl Expression {
    pub fn raw(s: impl Into<String>) -> Self {
        Expression::Raw(s.into())
    }
}

impl From<Document> for Expression {
    fn from(doc: Document) -> Self {
        Expression::Structured(doc)
    }
}

impl From<&str> for Expression {
    fn from(s: &str) -> Self {
        Expression::Raw(s.to_string())
    }
}

/// Filter and field selection for a listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    /// Filter; absent matches everything
    pub filter: Option<Expression>,

    /// Fields to include, or `-field` to exclude
    pub fields: Option<Vec<String>>,
}

/// Offset/limit pagination plus sort
///
/// Values are passed to the store untouched: the default offset of 1 skips
/// the first matching document, and a limit of 0 means "no limit".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    /// Number of matching documents to skip
    #[serde(default = "default_offset")]
    pub offset: u64,

    /// Maximum number of documents to return
    #[serde(default = "default_limit")]
    pub limit: u64,

    /// Sort; absent or empty sorts by primary key descending
    #[serde(default)]
    pub sort: Option<Expression>,
}

fn default_offset() -> u64 {
    1
}

fn default_limit() -> u64 {
    10
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            offset: default_offset(),
            limit: default_limit(),
            sort: None,
        }
    }
}

/// Related collection to expand into the results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulateSpec {
    /// Field holding the reference(s)
    pub path: String,

    /// Space separated projection applied to the related documents
    #[serde(default)]
    pub select: Option<String>,
}

impl PopulateSpec {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            select: None,
        }
    }

    pub fn with_select(mut self, select: impl Into<String>) -> Self {
        self.select = Some(select.into());
        self
    }

    /// The `select` string split into projection entries
    pub fn select_fields(&self) -> Vec<String> {
        self.select
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// Fully resolved listing handed to the store
#[derive(Debug, Clone, PartialEq)]
pub struct FindQuery {
    pub filter: Document,
    pub projection: Vec<String>,
    pub populate: Option<PopulateSpec>,
    pub skip: u64,
    pub limit: u64,
    pub sort: Document,
}

/// Listing result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub metadata: Metadata,
    pub results: Vec<Document>,
}

/// Listing metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub resultset: ResultSet,
}

/// Total match count plus the pagination that produced the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSet {
    /// Number of documents matching the filter, ignoring offset/limit
    pub count: u64,
    pub offset: u64,
    pub limit: u64,
}

impl QueryResult {
    pub fn new(results: Vec<Document>, count: u64, offset: u64, limit: u64) -> Self {
        Self {
            metadata: Metadata {
                resultset: ResultSet {
                    count,
                    offset,
                    limit,
                },
            },
            results,
        }
    }
}

/// Resolve a filter expression.
///
/// Absent, blank or `null` input matches everything. Strings must parse to a
/// JSON object, otherwise the call fails with `InvalidFilterSyntax`.
pub fn parse_filter(input: Option<&Expression>) -> Result<Document, ServiceError> {
    parse_expression(input).map_err(|message| {
        tracing::debug!(%message, "Invalid filter parameter");
        ServiceError::InvalidFilterSyntax { message }
    })
}

/// Resolve a sort expression, with the same rules as [`parse_filter`]
pub fn parse_sort(input: Option<&Expression>) -> Result<Document, ServiceError> {
    parse_expression(input).map_err(|message| {
        tracing::debug!(%message, "Invalid sort parameter");
        ServiceError::InvalidSortSyntax { message }
    })
}

/// Resolve a sort, substituting primary key descending when it is empty
pub fn resolve_sort(input: Option<&Expression>) -> Result<Document, ServiceError> {
    let sort = parse_sort(input)?;
    if sort.is_empty() {
        return Ok(default_sort());
    }
    Ok(sort)
}

/// Most recently created first
pub fn default_sort() -> Document {
    let mut sort = Document::new();
    sort.insert(PRIMARY_KEY.to_string(), Value::from(-1));
    sort
}

fn parse_expression(input: Option<&Expression>) -> Result<Document, String> {
    match input {
        None => Ok(Document::new()),
        Some(Expression::Structured(doc)) => Ok(doc.clone()),
        Some(Expression::Raw(raw)) if raw.trim().is_empty() => Ok(Document::new()),
        Some(Expression::Raw(raw)) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(Value::Null) => Ok(Document::new()),
            Ok(other) => Err(format!("expected a JSON object, got {}", value_kind(&other))),
            Err(e) => Err(e.to_string()),
        },
    }
}

/// Field name without its `-` / `+` marker
pub fn bare_field(entry: &str) -> &str {
    entry.trim_start_matches(['-', '+'])
}

/// Whether a projection entry excludes its field
pub fn is_exclusion(entry: &str) -> bool {
    entry.starts_with(EXCLUDE_MARKER)
}

/// Build the projection for a read, applying the sensitive-field policy.
///
/// With an explicit field list, the selection starts from exactly that list
/// and every sensitive name is dropped from it, even when asked for. When
/// nothing but exclusions is left, the sensitive exclusions are appended so
/// the fields stay hidden. Exclusions other than `-_id` are dropped from an
/// inclusion list.
///
/// Without a field list the selection is the sensitive list as declared.
pub fn select_fields(requested: Option<&[String]>, sensitive: &[String]) -> Vec<String> {
    let Some(requested) = requested else {
        return sensitive.to_vec();
    };

    let hidden: Vec<&str> = sensitive.iter().map(|s| bare_field(s)).collect();

    let mut select: Vec<String> = requested
        .iter()
        .filter(|f| is_exclusion(f) || !hidden.contains(&bare_field(f)))
        .cloned()
        .collect();

    if select.iter().any(|f| !is_exclusion(f)) {
        // Inclusion mode already hides everything unlisted; only `-_id` may mix in
        select.retain(|f| !is_exclusion(f) || bare_field(f) == PRIMARY_KEY);
    } else {
        for name in hidden {
            let exclusion = format!("{EXCLUDE_MARKER}{name}");
            if !select.contains(&exclusion) {
                select.push(exclusion);
            }
        }
    }

    select
}
