//! Record store contract.
//!
//! Workflow records live in a document store reached over a network API.
//! Every collection is a flat set of JSON documents keyed by id; partial
//! updates merge top-level fields. Subscribers get the full ordered snapshot
//! of a collection after every change.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::marker::PhantomData;
use std::sync::Arc;
use strum::{AsRefStr, Display, EnumIter, EnumString};
use tokio::sync::watch;
use tracing::warn;

pub mod memory;
pub mod sql;

pub use memory::MemoryStore;
pub use sql::SqlStore;

/// A stored document: a JSON object whose `id` field mirrors its key.
pub type Document = Map<String, Value>;

/// Ordered (by id) contents of one collection.
pub type Snapshot = Arc<Vec<Document>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, EnumString, EnumIter)]
pub enum Collection {
    #[strum(serialize = "returnRecords")]
    Returns,
    #[strum(serialize = "ncrReports")]
    NcrReports,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{collection}/{id} does not exist")]
    NotFound { collection: String, id: String },

    #[error("{collection}/{id} already exists")]
    AlreadyExists { collection: String, id: String },

    #[error("record store backend failure: {0}")]
    Backend(String),

    #[error("document encoding failure: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(collection: Collection, id: &str) -> Self {
        StoreError::NotFound {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }

    pub fn already_exists(collection: Collection, id: &str) -> Self {
        StoreError::AlreadyExists {
            collection: collection.to_string(),
            id: id.to_string(),
        }
    }
}

impl From<sea_orm::DbErr> for StoreError {
    fn from(err: sea_orm::DbErr) -> Self {
        StoreError::Backend(err.to_string())
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Inserts a new document. Fails with `AlreadyExists` rather than overwrite.
    async fn create(
        &self,
        collection: Collection,
        id: &str,
        record: Document,
    ) -> Result<(), StoreError>;

    /// Merges `fields` into the top level of an existing document.
    async fn update(
        &self,
        collection: Collection,
        id: &str,
        fields: Document,
    ) -> Result<(), StoreError>;

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError>;

    /// All documents of the collection ordered by id.
    async fn list(&self, collection: Collection) -> Result<Vec<Document>, StoreError>;

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError>;

    /// Live view of the collection; the receiver is updated after every write.
    async fn subscribe(
        &self,
        collection: Collection,
    ) -> Result<watch::Receiver<Snapshot>, StoreError>;
}

/// Shallow merge used by every backend's `update`.
pub fn merge_fields(target: &mut Document, fields: Document) {
    for (key, value) in fields {
        target.insert(key, value);
    }
}

/// Serializes a record (or a patch) into a store document.
pub fn to_document<T: serde::Serialize>(value: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Backend(format!(
            "expected a JSON object document, got {}",
            other
        ))),
    }
}

pub fn from_document<T: DeserializeOwned>(document: Document) -> Result<T, StoreError> {
    Ok(serde_json::from_value(Value::Object(document))?)
}

/// Per-collection watch channels shared by the store backends.
#[derive(Default)]
pub struct ChangeFeed {
    channels: DashMap<Collection, watch::Sender<Snapshot>>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_watched(&self, collection: Collection) -> bool {
        self.channels.contains_key(&collection)
    }

    /// Pushes a fresh snapshot to current subscribers of `collection`.
    pub fn publish(&self, collection: Collection, documents: Vec<Document>) {
        if let Some(sender) = self.channels.get(&collection) {
            sender.send_replace(Arc::new(documents));
        }
    }

    /// Returns a receiver, seeding the channel with `initial` when it is new.
    pub fn subscribe(
        &self,
        collection: Collection,
        initial: impl FnOnce() -> Vec<Document>,
    ) -> watch::Receiver<Snapshot> {
        self.channels
            .entry(collection)
            .or_insert_with(|| watch::channel(Arc::new(initial())).0)
            .subscribe()
    }
}

/// Typed view over a collection subscription.
pub struct LiveCollection<T> {
    receiver: watch::Receiver<Snapshot>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: DeserializeOwned> LiveCollection<T> {
    pub fn new(receiver: watch::Receiver<Snapshot>) -> Self {
        Self {
            receiver,
            _marker: PhantomData,
        }
    }

    /// Decodes the latest snapshot, skipping documents that do not parse.
    pub fn current(&self) -> Vec<T> {
        let snapshot = self.receiver.borrow().clone();
        decode_snapshot(&snapshot)
    }

    /// Waits for the next change and returns the decoded list, or `None`
    /// once the store has been dropped.
    pub async fn changed(&mut self) -> Option<Vec<T>> {
        self.receiver.changed().await.ok()?;
        Some(self.current())
    }
}

pub fn decode_snapshot<T: DeserializeOwned>(documents: &[Document]) -> Vec<T> {
    documents
        .iter()
        .filter_map(|doc| match from_document::<T>(doc.clone()) {
            Ok(record) => Some(record),
            Err(e) => {
                let id = doc.get("id").and_then(Value::as_str).unwrap_or("<no id>");
                warn!(id = %id, error = %e, "Skipping undecodable store document");
                None
            }
        })
        .collect()
}
