//! Capability interfaces for the remote document database and object storage.
//!
//! Screens and services receive a store explicitly instead of reaching for a
//! process-wide client. Live result sets are exposed as [`Subscription`]s.

use std::cmp::Ordering;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::watch;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Failed to decode document {id}: {source}")]
    Decode {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode document: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Document data must be a JSON object: {0}")]
    NotAnObject(String),

    #[error("Precondition failed on {0}")]
    Conflict(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Backend connection closed")]
    Closed,
}

/// Joins path segments into a collection path, e.g. `users/u1/photos`.
pub fn collection_path(segments: &[&str]) -> String {
    segments.join("/")
}

/// A stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    /// Collection path the document lives in.
    pub collection: String,
    pub data: Value,
}

impl Document {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, BackendError> {
        serde_json::from_value(self.data.clone()).map_err(|source| BackendError::Decode {
            id: self.id.clone(),
            source,
        })
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    pub fn u64_field(&self, name: &str) -> Option<u64> {
        self.field(name).and_then(Value::as_u64)
    }

    /// Id of the document owning this document's sub-collection.
    pub fn parent_id(&self) -> Option<&str> {
        let mut parts = self.collection.rsplit('/');
        parts.next();
        parts.next()
    }
}

/// One result set of a query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub documents: Vec<Document>,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Decodes every document, skipping ones that do not match `T`.
    pub fn decode_all<T: DeserializeOwned>(&self) -> Vec<T> {
        self.documents
            .iter()
            .filter_map(|doc| match doc.decode() {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::warn!("[backend] Skipping document: {err}");
                    None
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    ArrayContains,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn matches(&self, data: &Value) -> bool {
        let Some(actual) = data.get(&self.field) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => actual == &self.value,
            FilterOp::ArrayContains => actual
                .as_array()
                .is_some_and(|items| items.contains(&self.value)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

/// A query over one collection, or over every collection with a given name.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    /// Match every collection whose last path segment is `collection`.
    pub group: bool,
    pub filters: Vec<Filter>,
    /// Restrict the result to the document with this id.
    pub document_id: Option<String>,
    pub order_by: Option<(String, Direction)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(path: impl Into<String>) -> Self {
        Self {
            collection: path.into(),
            group: false,
            filters: Vec::new(),
            document_id: None,
            order_by: None,
            limit: None,
        }
    }

    /// The single document `collection/id`, whether or not its fields
    /// repeat the id.
    pub fn document(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            document_id: Some(id.into()),
            ..Self::collection(collection)
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self {
            group: true,
            ..Self::collection(name)
        }
    }

    #[must_use]
    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op: FilterOp::Eq,
            value: value.into(),
        });
        self
    }

    #[must_use]
    pub fn array_contains(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op: FilterOp::ArrayContains,
            value: value.into(),
        });
        self
    }

    #[must_use]
    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some((field.into(), direction));
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches_collection(&self, path: &str) -> bool {
        if self.group {
            path.rsplit('/').next() == Some(self.collection.as_str())
        } else {
            path == self.collection
        }
    }

    pub fn matches(&self, data: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(data))
    }

    pub fn matches_id(&self, id: &str) -> bool {
        self.document_id.as_deref().is_none_or(|want| want == id)
    }

    /// Sorts and truncates documents that already passed `matches`.
    /// Documents with equal sort keys are ordered by id.
    pub fn finish(&self, mut documents: Vec<Document>) -> Vec<Document> {
        if let Some((field, direction)) = &self.order_by {
            documents.sort_by(|a, b| {
                let ord = compare_values(a.field(field), b.field(field))
                    .then_with(|| a.id.cmp(&b.id));
                match direction {
                    Direction::Ascending => ord,
                    Direction::Descending => ord.reverse(),
                }
            });
        }
        if let Some(limit) = self.limit {
            documents.truncate(limit);
        }
        documents
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

/// A write applied as part of an atomic batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    /// Replace the whole document.
    Set {
        collection: String,
        id: String,
        data: Value,
    },
    /// Overwrite top-level fields, creating the document if needed.
    Merge {
        collection: String,
        id: String,
        data: Value,
    },
    /// Add `by` to a numeric field (missing counts as zero).
    Increment {
        collection: String,
        id: String,
        field: String,
        by: i64,
    },
    /// Append `value` to an array field unless already present.
    ArrayUnion {
        collection: String,
        id: String,
        field: String,
        value: Value,
    },
    /// Remove every occurrence of `value` from an array field.
    ArrayRemove {
        collection: String,
        id: String,
        field: String,
        value: Value,
    },
    Delete {
        collection: String,
        id: String,
    },
    /// Fail the whole batch unless `field` currently equals `value`
    /// (a missing field or document compares as null).
    Expect {
        collection: String,
        id: String,
        field: String,
        value: Value,
    },
    /// Like `Expect`, but any of `values` is accepted.
    ExpectOneOf {
        collection: String,
        id: String,
        field: String,
        values: Vec<Value>,
    },
}

impl Mutation {
    pub fn set<T: Serialize>(collection: &str, id: &str, data: &T) -> Result<Self, BackendError> {
        Ok(Self::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            data: serde_json::to_value(data)?,
        })
    }

    pub fn merge(collection: &str, id: &str, data: Value) -> Self {
        Self::Merge {
            collection: collection.to_string(),
            id: id.to_string(),
            data,
        }
    }

    pub fn increment(collection: &str, id: &str, field: &str, by: i64) -> Self {
        Self::Increment {
            collection: collection.to_string(),
            id: id.to_string(),
            field: field.to_string(),
            by,
        }
    }

    pub fn array_union(collection: &str, id: &str, field: &str, value: impl Into<Value>) -> Self {
        Self::ArrayUnion {
            collection: collection.to_string(),
            id: id.to_string(),
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn array_remove(collection: &str, id: &str, field: &str, value: impl Into<Value>) -> Self {
        Self::ArrayRemove {
            collection: collection.to_string(),
            id: id.to_string(),
            field: field.to_string(),
            value: value.into(),
        }
    }

    pub fn delete(collection: &str, id: &str) -> Self {
        Self::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn expect(collection: &str, id: &str, field: &str, value: impl Into<Value>) -> Self {
        Self::Expect {
            collection: collection.to_string(),
            id: id.to_string(),
            field: field.to_string(),
            value: value.into(),
        }
    }

    /// Guards a counter that may not have been written yet: passes when the
    /// field is missing, null or equal to `value`.
    pub fn expect_unset_or(collection: &str, id: &str, field: &str, value: impl Into<Value>) -> Self {
        Self::ExpectOneOf {
            collection: collection.to_string(),
            id: id.to_string(),
            field: field.to_string(),
            values: vec![Value::Null, value.into()],
        }
    }
}

/// Fetch function a [`Subscription`] re-runs whenever the store changes.
pub type SnapshotFetch = Box<dyn Fn(&Query) -> Result<Snapshot, BackendError> + Send + Sync>;

/// A live query: a lazy, non-terminating sequence of result sets.
///
/// The first call to [`Subscription::next`] yields the current result set;
/// later calls wait until the store changes in a way that alters the
/// result. Dropping the subscription or calling [`Subscription::cancel`]
/// ends it.
pub struct Subscription {
    query: Query,
    changes: watch::Receiver<u64>,
    fetch: SnapshotFetch,
    last: Option<Snapshot>,
    cancelled: bool,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("query", &self.query)
            .field("cancelled", &self.cancelled)
            .finish_non_exhaustive()
    }
}

impl Subscription {
    pub fn new(query: Query, mut changes: watch::Receiver<u64>, fetch: SnapshotFetch) -> Self {
        changes.borrow_and_update();
        Self {
            query,
            changes,
            fetch,
            last: None,
            cancelled: false,
        }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Waits for the next distinct result set. Returns `None` once the
    /// subscription is cancelled or the store goes away.
    pub async fn next(&mut self) -> Option<Result<Snapshot, BackendError>> {
        loop {
            if self.cancelled {
                return None;
            }
            if self.last.is_some() && self.changes.changed().await.is_err() {
                self.cancelled = true;
                return None;
            }

            match (self.fetch)(&self.query) {
                Ok(snapshot) => {
                    if self.last.as_ref() == Some(&snapshot) {
                        continue;
                    }
                    self.last = Some(snapshot.clone());
                    return Some(Ok(snapshot));
                }
                Err(err) => {
                    // Keep the previous result so the next change is compared
                    // against what the caller last saw.
                    if self.last.is_none() {
                        self.last = Some(Snapshot::default());
                    }
                    return Some(Err(err));
                }
            }
        }
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

/// Fetch/query/write/listen on named collections.
pub trait DocumentStore: Send + Sync {
    fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> impl Future<Output = Result<Option<Document>, BackendError>> + Send;

    fn query(&self, query: &Query) -> impl Future<Output = Result<Snapshot, BackendError>> + Send;

    /// Adds a document under a freshly generated id and returns that id.
    fn insert(
        &self,
        collection: &str,
        data: Value,
    ) -> impl Future<Output = Result<String, BackendError>> + Send;

    fn set(
        &self,
        collection: &str,
        id: &str,
        data: Value,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Overwrites top-level fields, creating the document if needed.
    fn merge(
        &self,
        collection: &str,
        id: &str,
        data: Value,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn delete(&self, collection: &str, id: &str) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Applies every mutation or none of them.
    fn apply(&self, mutations: Vec<Mutation>) -> impl Future<Output = Result<(), BackendError>> + Send;

    fn subscribe(&self, query: Query) -> Subscription;
}

/// Upload/sign/delete objects at a path.
pub trait ObjectStore: Send + Sync {
    /// Stores `bytes` and returns a public URL.
    fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> impl Future<Output = Result<String, BackendError>> + Send;

    fn signed_url(
        &self,
        path: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<String, BackendError>> + Send;

    fn delete_object(&self, path: &str) -> impl Future<Output = Result<(), BackendError>> + Send;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(id: &str, collection: &str, data: Value) -> Document {
        Document {
            id: id.to_string(),
            collection: collection.to_string(),
            data,
        }
    }

    #[test]
    fn test_group_query_matches_last_segment() {
        let query = Query::group("reviews").where_eq("userId", "u1");
        assert!(query.matches_collection("locations/l1/reviews"));
        assert!(query.matches_collection("reviews"));
        assert!(!query.matches_collection("locations/l1/photos"));
        assert!(query.matches(&json!({ "userId": "u1" })));
        assert!(!query.matches(&json!({ "userId": "u2" })));
        assert!(!query.matches(&json!({})));
    }

    #[test]
    fn test_array_contains_filter() {
        let query = Query::collection("users").array_contains("visited_locations", "l1");
        assert!(query.matches(&json!({ "visited_locations": ["l0", "l1"] })));
        assert!(!query.matches(&json!({ "visited_locations": "l1" })));
    }

    #[test]
    fn test_order_and_limit() {
        let query = Query::collection("rewards")
            .order_by("pointsRequired", Direction::Ascending)
            .limit(2);
        let docs = vec![
            doc("c", "rewards", json!({ "pointsRequired": 300 })),
            doc("a", "rewards", json!({ "pointsRequired": 100 })),
            doc("b", "rewards", json!({ "pointsRequired": 150 })),
        ];
        let ids: Vec<String> = query.finish(docs).into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_equal_sort_keys_order_by_id() {
        let docs = || {
            vec![
                doc("b", "reviews", json!({ "timestamp": 1_700_000_000_000_i64 })),
                doc("c", "reviews", json!({ "timestamp": 1_600_000_000_000_i64 })),
                doc("a", "reviews", json!({ "timestamp": 1_700_000_000_000_i64 })),
            ]
        };
        let ids = |query: Query| -> Vec<String> { query.finish(docs()).into_iter().map(|d| d.id).collect() };

        assert_eq!(
            ids(Query::collection("reviews").order_by("timestamp", Direction::Descending)),
            vec!["b", "a", "c"]
        );
        assert_eq!(
            ids(Query::collection("reviews").order_by("timestamp", Direction::Ascending)),
            vec!["c", "a", "b"]
        );
    }

    #[test]
    fn test_document_query_matches_id_only() {
        let query = Query::document("users", "u1");
        assert!(query.matches_collection("users"));
        assert!(query.matches_id("u1"));
        assert!(!query.matches_id("u2"));
        assert!(query.matches(&json!({})));
        assert!(Query::collection("users").matches_id("anyone"));
    }

    #[test]
    fn test_parent_id() {
        let review = doc("r1", "locations/l9/reviews", json!({}));
        assert_eq!(review.parent_id(), Some("l9"));
        assert_eq!(doc("l9", "locations", json!({})).parent_id(), None);
    }
}
