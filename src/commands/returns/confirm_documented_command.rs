use crate::{
    commands::Command,
    errors::ServiceError,
    events::{Event, EventSender},
    models::{Disposition, ReturnPatch, ReturnStatus},
    store::RecordStore,
};
use chrono::NaiveDate;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{ensure_status, load_return, write_patch};

/// Per-record failure inside a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub id: String,
    pub error: String,
}

/// Aggregate result of a batch confirm. Successes keep their new state;
/// failures stay Graded for another attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub requested: usize,
    pub succeeded: Vec<String>,
    pub failed: Vec<BatchFailure>,
}

impl BatchOutcome {
    pub fn summary(&self) -> String {
        format!("{} of {} succeeded", self.succeeded.len(), self.requested)
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Confirms execution of a selection of graded returns, usually one
/// disposition bucket at a time.
#[derive(Debug)]
pub struct ConfirmDocumentedCommand {
    pub ids: Vec<String>,
    /// When set, records outside this bucket fail individually.
    pub disposition: Option<Disposition>,
    pub documented_on: NaiveDate,
    pub max_selection: usize,
}

impl ConfirmDocumentedCommand {
    /// Selection with blanks and repeats removed, in submitted order.
    fn selection(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.ids
            .iter()
            .map(|id| id.trim())
            .filter(|id| !id.is_empty())
            .filter(|id| seen.insert(id.to_string()))
            .map(str::to_string)
            .collect()
    }

    async fn document_one(&self, store: &dyn RecordStore, id: &str) -> Result<(), ServiceError> {
        let record = load_return(store, id).await?;
        ensure_status(&record, ReturnStatus::Graded)?;
        if let Some(bucket) = self.disposition {
            if record.disposition != bucket {
                return Err(ServiceError::InvalidOperation(format!(
                    "Return {} is in the {} bucket, not {}",
                    id, record.disposition, bucket
                )));
            }
        }
        write_patch(
            store,
            id,
            &ReturnPatch::advance(ReturnStatus::Documented, self.documented_on),
        )
        .await
    }
}

#[async_trait::async_trait]
impl Command for ConfirmDocumentedCommand {
    type Result = BatchOutcome;

    #[instrument(skip(self, store, event_sender), fields(selected = self.ids.len()))]
    async fn execute(
        &self,
        store: Arc<dyn RecordStore>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        let ids = self.selection();
        if ids.is_empty() {
            return Err(ServiceError::ValidationError(
                "select at least one graded return".to_string(),
            ));
        }
        if ids.len() > self.max_selection {
            return Err(ServiceError::ValidationError(format!(
                "at most {} returns can be confirmed at once",
                self.max_selection
            )));
        }

        let store: &dyn RecordStore = store.as_ref();
        let results = join_all(
            ids.iter()
                .map(|id| async move { (id, self.document_one(store, id).await) }),
        )
        .await;

        let mut outcome = BatchOutcome {
            requested: ids.len(),
            succeeded: Vec::new(),
            failed: Vec::new(),
        };
        for (id, result) in results {
            match result {
                Ok(()) => {
                    event_sender
                        .send_or_log(Event::ReturnDocumented(id.clone()))
                        .await;
                    outcome.succeeded.push(id.clone());
                }
                Err(e) => {
                    warn!(return_id = %id, error = %e, "Return could not be documented");
                    outcome.failed.push(BatchFailure {
                        id: id.clone(),
                        error: e.response_message(),
                    });
                }
            }
        }

        info!(
            disposition = ?self.disposition,
            summary = %outcome.summary(),
            "Batch confirm finished"
        );
        Ok(outcome)
    }
}
