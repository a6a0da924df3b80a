use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::watch;
use tracing::debug;

use super::{
    merge_fields, ChangeFeed, Collection, Document, RecordStore, Snapshot, StoreError,
};

/// In-process record store, used for development and tests.
#[derive(Default)]
pub struct MemoryStore {
    collections: DashMap<Collection, BTreeMap<String, Document>>,
    feed: ChangeFeed,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn snapshot(&self, collection: Collection) -> Vec<Document> {
        self.collections
            .get(&collection)
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Publishes `records` to subscribers. Callers hold the collection's
    /// write guard so snapshots reach the channel in write order.
    fn notify(&self, collection: Collection, records: &BTreeMap<String, Document>) {
        if self.feed.is_watched(collection) {
            self.feed
                .publish(collection, records.values().cloned().collect());
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create(
        &self,
        collection: Collection,
        id: &str,
        mut record: Document,
    ) -> Result<(), StoreError> {
        record.insert("id".to_string(), Value::String(id.to_string()));
        let mut records = self.collections.entry(collection).or_default();
        if records.contains_key(id) {
            return Err(StoreError::already_exists(collection, id));
        }
        records.insert(id.to_string(), record);
        self.notify(collection, &records);
        drop(records);

        debug!(collection = %collection, id = %id, "Document created");
        Ok(())
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        mut fields: Document,
    ) -> Result<(), StoreError> {
        fields.remove("id");
        let mut records = self.collections.entry(collection).or_default();
        let existing = records
            .get_mut(id)
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        merge_fields(existing, fields);
        self.notify(collection, &records);
        drop(records);

        debug!(collection = %collection, id = %id, "Document updated");
        Ok(())
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self
            .collections
            .get(&collection)
            .and_then(|records| records.get(id).cloned()))
    }

    async fn list(&self, collection: Collection) -> Result<Vec<Document>, StoreError> {
        Ok(self.snapshot(collection))
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let mut records = self
            .collections
            .get_mut(&collection)
            .ok_or_else(|| StoreError::not_found(collection, id))?;
        if records.remove(id).is_none() {
            return Err(StoreError::not_found(collection, id));
        }
        self.notify(collection, &records);
        Ok(())
    }

    async fn subscribe(
        &self,
        collection: Collection,
    ) -> Result<watch::Receiver<Snapshot>, StoreError> {
        // Collection guard first, then the channel: the same order writers use.
        let records = self.collections.entry(collection).or_default();
        Ok(self
            .feed
            .subscribe(collection, || records.values().cloned().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn create_refuses_to_overwrite() {
        let store = MemoryStore::new();
        store
            .create(Collection::Returns, "RT-2024-1", doc(json!({"branch": "A"})))
            .await
            .unwrap();

        let second = store
            .create(Collection::Returns, "RT-2024-1", doc(json!({"branch": "B"})))
            .await;
        assert_matches!(second, Err(StoreError::AlreadyExists { .. }));

        let stored = store.get(Collection::Returns, "RT-2024-1").await.unwrap().unwrap();
        assert_eq!(stored["branch"], "A");
        assert_eq!(stored["id"], "RT-2024-1");
    }

    #[tokio::test]
    async fn update_missing_document_fails() {
        let store = MemoryStore::new();
        let result = store
            .update(Collection::Returns, "nope", doc(json!({"status": "Received"})))
            .await;
        assert_matches!(result, Err(StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn list_is_ordered_by_id_and_scoped_to_collection() {
        let store = MemoryStore::new();
        for id in ["c", "a", "b"] {
            store
                .create(Collection::Returns, id, Document::new())
                .await
                .unwrap();
        }
        store
            .create(Collection::NcrReports, "z", Document::new())
            .await
            .unwrap();

        let ids: Vec<String> = store
            .list(Collection::Returns)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn subscribers_see_every_write() {
        let store = MemoryStore::new();
        let mut rx = store.subscribe(Collection::NcrReports).await.unwrap();
        assert!(rx.borrow().is_empty());

        store
            .create(Collection::NcrReports, "n1", doc(json!({"status": "Open"})))
            .await
            .unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow_and_update().len(), 1);

        store
            .update(Collection::NcrReports, "n1", doc(json!({"status": "Canceled"})))
            .await
            .unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow()[0]["status"], "Canceled");

        store.delete(Collection::NcrReports, "n1").await.unwrap();
        rx.changed().await.unwrap();
        assert!(rx.borrow().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn last_snapshot_matches_store_after_concurrent_writes() {
        let store = std::sync::Arc::new(MemoryStore::new());
        for id in 0..8 {
            store
                .create(Collection::Returns, &format!("r{}", id), Document::new())
                .await
                .unwrap();
        }
        let rx = store.subscribe(Collection::Returns).await.unwrap();

        let writers: Vec<_> = (0..64)
            .map(|n| {
                let store = store.clone();
                tokio::spawn(async move {
                    let id = format!("r{}", n % 8);
                    store
                        .update(Collection::Returns, &id, doc(json!({ "seq": n })))
                        .await
                        .unwrap();
                })
            })
            .collect();
        for writer in futures::future::join_all(writers).await {
            writer.unwrap();
        }

        let published = rx.borrow().clone();
        let stored = store.list(Collection::Returns).await.unwrap();
        assert_eq!(*published, stored);
    }
}
