//! In-process document and object store.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::sync::watch;

use crate::backend::{
    BackendError, Document, DocumentStore, Mutation, ObjectStore, Query, Snapshot, Subscription,
};

type Collections = HashMap<String, BTreeMap<String, Value>>;

#[derive(Debug, Clone)]
struct StoredObject {
    bytes: Vec<u8>,
    content_type: String,
}

struct Inner {
    collections: RwLock<Collections>,
    objects: RwLock<HashMap<String, StoredObject>>,
    version: watch::Sender<u64>,
    base_url: String,
}

/// Document and object store kept in memory.
///
/// Clones share the same data. Every committed write bumps a version
/// counter that wakes live [`Subscription`]s.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<Inner>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new("memory://media")
    }
}

impl MemoryBackend {
    pub fn new(base_url: impl Into<String>) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            inner: Arc::new(Inner {
                collections: RwLock::new(HashMap::new()),
                objects: RwLock::new(HashMap::new()),
                version,
                base_url: base_url.into(),
            }),
        }
    }

    /// Number of committed writes so far.
    pub fn version(&self) -> u64 {
        *self.inner.version.borrow()
    }

    pub fn object_bytes(&self, path: &str) -> Option<Vec<u8>> {
        self.inner.objects.read().get(path).map(|o| o.bytes.clone())
    }

    pub fn object_content_type(&self, path: &str) -> Option<String> {
        self.inner
            .objects
            .read()
            .get(path)
            .map(|o| o.content_type.clone())
    }

    fn run_query(collections: &Collections, query: &Query) -> Snapshot {
        let mut paths: Vec<&String> = collections
            .keys()
            .filter(|path| query.matches_collection(path))
            .collect();
        paths.sort();

        let documents = paths
            .into_iter()
            .flat_map(|path| {
                collections[path]
                    .iter()
                    .filter(|(id, data)| query.matches_id(id) && query.matches(data))
                    .map(move |(id, data)| Document {
                        id: id.clone(),
                        collection: path.clone(),
                        data: data.clone(),
                    })
            })
            .collect();

        Snapshot {
            documents: query.finish(documents),
        }
    }

    fn commit(&self, mutations: Vec<Mutation>) -> Result<(), BackendError> {
        {
            let mut collections = self.inner.collections.write();
            let mut staged = collections.clone();
            for mutation in mutations {
                apply_mutation(&mut staged, mutation)?;
            }
            *collections = staged;
        }
        self.inner.version.send_modify(|v| *v += 1);
        Ok(())
    }
}

fn object_of(data: Value, id: &str) -> Result<Map<String, Value>, BackendError> {
    match data {
        Value::Object(map) => Ok(map),
        _ => Err(BackendError::NotAnObject(id.to_string())),
    }
}

fn entry<'a>(
    collections: &'a mut Collections,
    collection: &str,
    id: &str,
) -> Result<&'a mut Map<String, Value>, BackendError> {
    let doc = collections
        .entry(collection.to_string())
        .or_default()
        .entry(id.to_string())
        .or_insert_with(|| Value::Object(Map::new()));
    doc.as_object_mut()
        .ok_or_else(|| BackendError::NotAnObject(id.to_string()))
}

fn apply_mutation(collections: &mut Collections, mutation: Mutation) -> Result<(), BackendError> {
    match mutation {
        Mutation::Set {
            collection,
            id,
            data,
        } => {
            let data = Value::Object(object_of(data, &id)?);
            collections.entry(collection).or_default().insert(id, data);
        }
        Mutation::Merge {
            collection,
            id,
            data,
        } => {
            let fields = object_of(data, &id)?;
            entry(collections, &collection, &id)?.extend(fields);
        }
        Mutation::Increment {
            collection,
            id,
            field,
            by,
        } => {
            let doc = entry(collections, &collection, &id)?;
            let current = doc.get(&field).and_then(Value::as_i64).unwrap_or(0);
            doc.insert(field, Value::from(current.saturating_add(by)));
        }
        Mutation::ArrayUnion {
            collection,
            id,
            field,
            value,
        } => {
            let doc = entry(collections, &collection, &id)?;
            let slot = doc
                .entry(field)
                .or_insert_with(|| Value::Array(Vec::new()));
            match slot {
                Value::Array(items) if items.contains(&value) => {}
                Value::Array(items) => items.push(value),
                other => *other = Value::Array(vec![value]),
            }
        }
        Mutation::ArrayRemove {
            collection,
            id,
            field,
            value,
        } => {
            let doc = entry(collections, &collection, &id)?;
            if let Some(Value::Array(items)) = doc.get_mut(&field) {
                items.retain(|item| item != &value);
            }
        }
        Mutation::Delete { collection, id } => {
            if let Some(docs) = collections.get_mut(&collection) {
                docs.remove(&id);
            }
        }
        Mutation::Expect {
            collection,
            id,
            field,
            value,
        } => {
            let current = collections
                .get(&collection)
                .and_then(|docs| docs.get(&id))
                .and_then(|doc| doc.get(&field))
                .unwrap_or(&Value::Null);
            if current != &value {
                return Err(BackendError::Conflict(format!("{collection}/{id}.{field}")));
            }
        }
        Mutation::ExpectOneOf {
            collection,
            id,
            field,
            values,
        } => {
            let current = collections
                .get(&collection)
                .and_then(|docs| docs.get(&id))
                .and_then(|doc| doc.get(&field))
                .unwrap_or(&Value::Null);
            if !values.contains(current) {
                return Err(BackendError::Conflict(format!("{collection}/{id}.{field}")));
            }
        }
    }
    Ok(())
}

impl DocumentStore for MemoryBackend {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, BackendError> {
        let collections = self.inner.collections.read();
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|data| Document {
                id: id.to_string(),
                collection: collection.to_string(),
                data: data.clone(),
            }))
    }

    async fn query(&self, query: &Query) -> Result<Snapshot, BackendError> {
        Ok(Self::run_query(&self.inner.collections.read(), query))
    }

    async fn insert(&self, collection: &str, data: Value) -> Result<String, BackendError> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.commit(vec![Mutation::Set {
            collection: collection.to_string(),
            id: id.clone(),
            data,
        }])?;
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<(), BackendError> {
        self.commit(vec![Mutation::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            data,
        }])
    }

    async fn merge(&self, collection: &str, id: &str, data: Value) -> Result<(), BackendError> {
        self.commit(vec![Mutation::merge(collection, id, data)])
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), BackendError> {
        self.commit(vec![Mutation::delete(collection, id)])
    }

    async fn apply(&self, mutations: Vec<Mutation>) -> Result<(), BackendError> {
        self.commit(mutations)
    }

    fn subscribe(&self, query: Query) -> Subscription {
        let inner = self.inner.clone();
        Subscription::new(
            query,
            self.inner.version.subscribe(),
            Box::new(move |query| Ok(Self::run_query(&inner.collections.read(), query))),
        )
    }
}

impl ObjectStore for MemoryBackend {
    async fn upload(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BackendError> {
        tracing::debug!("[storage] Uploading {} bytes to {}", bytes.len(), path);
        self.inner.objects.write().insert(
            path.to_string(),
            StoredObject {
                bytes,
                content_type: content_type.to_string(),
            },
        );
        Ok(format!("{}/object/public/{}", self.inner.base_url, path))
    }

    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, BackendError> {
        if !self.inner.objects.read().contains_key(path) {
            return Err(BackendError::ObjectNotFound(path.to_string()));
        }
        let expires = Utc::now()
            + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::hours(1));
        Ok(format!(
            "{}/object/sign/{}?token={}&expires={}",
            self.inner.base_url,
            path,
            uuid::Uuid::new_v4().simple(),
            expires.timestamp()
        ))
    }

    async fn delete_object(&self, path: &str) -> Result<(), BackendError> {
        self.inner
            .objects
            .write()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| BackendError::ObjectNotFound(path.to_string()))
    }
}
