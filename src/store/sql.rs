use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, Set,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, warn};

use super::{
    merge_fields, ChangeFeed, Collection, Document, RecordStore, Snapshot, StoreError,
};
use crate::db::DbPool;
use crate::entities::store_record::{self, Entity as StoreRecord};

/// Record store persisted as JSON documents in a single SQL table.
pub struct SqlStore {
    db: Arc<DbPool>,
    feed: ChangeFeed,
    // Held from reload to publish so a slower reload never overwrites a newer one.
    publish: Mutex<()>,
}

impl SqlStore {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self {
            db,
            feed: ChangeFeed::new(),
            publish: Mutex::new(()),
        }
    }

    async fn find(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<store_record::Model>, StoreError> {
        StoreRecord::find_by_id((collection.to_string(), id.to_string()))
            .one(self.db.as_ref())
            .await
            .map_err(|e| {
                error!(collection = %collection, id = %id, error = %e, "Failed to fetch document");
                StoreError::from(e)
            })
    }

    /// Reloads `collection` for its subscribers. Runs after the write has
    /// committed, so a failed reload is logged and never reported as a
    /// failed write.
    async fn notify(&self, collection: Collection) {
        if !self.feed.is_watched(collection) {
            return;
        }
        let _guard = self.publish.lock().await;
        match self.list(collection).await {
            Ok(documents) => self.feed.publish(collection, documents),
            Err(e) => warn!(collection = %collection, error = %e, "Could not reload collection for subscribers"),
        }
    }
}

fn body_to_document(body: Value) -> Result<Document, StoreError> {
    match body {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Backend(format!(
            "stored body is not a JSON object: {}",
            other
        ))),
    }
}

#[async_trait]
impl RecordStore for SqlStore {
    async fn create(
        &self,
        collection: Collection,
        id: &str,
        mut record: Document,
    ) -> Result<(), StoreError> {
        if self.find(collection, id).await?.is_some() {
            return Err(StoreError::already_exists(collection, id));
        }
        record.insert("id".to_string(), Value::String(id.to_string()));

        let row = store_record::ActiveModel {
            collection: Set(collection.to_string()),
            id: Set(id.to_string()),
            body: Set(Value::Object(record)),
            updated_at: Set(Utc::now()),
        };
        row.insert(self.db.as_ref()).await.map_err(|e| {
            error!(collection = %collection, id = %id, error = %e, "Failed to insert document");
            StoreError::from(e)
        })?;

        debug!(collection = %collection, id = %id, "Document created");
        self.notify(collection).await;
        Ok(())
    }

    async fn update(
        &self,
        collection: Collection,
        id: &str,
        mut fields: Document,
    ) -> Result<(), StoreError> {
        let existing = self
            .find(collection, id)
            .await?
            .ok_or_else(|| StoreError::not_found(collection, id))?;

        fields.remove("id");
        let mut body = body_to_document(existing.body.clone())?;
        merge_fields(&mut body, fields);

        let mut active = existing.into_active_model();
        active.body = Set(Value::Object(body));
        active.updated_at = Set(Utc::now());
        active.update(self.db.as_ref()).await.map_err(|e| {
            error!(collection = %collection, id = %id, error = %e, "Failed to update document");
            StoreError::from(e)
        })?;

        debug!(collection = %collection, id = %id, "Document updated");
        self.notify(collection).await;
        Ok(())
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Option<Document>, StoreError> {
        self.find(collection, id)
            .await?
            .map(|row| body_to_document(row.body))
            .transpose()
    }

    async fn list(&self, collection: Collection) -> Result<Vec<Document>, StoreError> {
        let rows = StoreRecord::find()
            .filter(store_record::Column::Collection.eq(collection.to_string()))
            .order_by_asc(store_record::Column::Id)
            .all(self.db.as_ref())
            .await?;
        rows.into_iter()
            .map(|row| body_to_document(row.body))
            .collect()
    }

    async fn delete(&self, collection: Collection, id: &str) -> Result<(), StoreError> {
        let result = StoreRecord::delete_by_id((collection.to_string(), id.to_string()))
            .exec(self.db.as_ref())
            .await?;
        if result.rows_affected == 0 {
            return Err(StoreError::not_found(collection, id));
        }
        self.notify(collection).await;
        Ok(())
    }

    async fn subscribe(
        &self,
        collection: Collection,
    ) -> Result<watch::Receiver<Snapshot>, StoreError> {
        let current = self.list(collection).await?;
        Ok(self.feed.subscribe(collection, move || current))
    }
}
