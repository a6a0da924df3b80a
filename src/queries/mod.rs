use async_trait::async_trait;

use crate::{errors::ServiceError, store::RecordStore};

pub mod ncr_queries;
pub mod return_queries;

/// Trait representing a generic asynchronous read over the record store.
#[async_trait]
pub trait Query: Send + Sync {
    type Result: Send + Sync;

    async fn execute(&self, store: &dyn RecordStore) -> Result<Self::Result, ServiceError>;
}
