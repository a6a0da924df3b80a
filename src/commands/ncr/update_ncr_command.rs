use crate::{
    commands::Command,
    errors::ServiceError,
    events::{Event, EventSender},
    models::{NcrPatch, NcrRecord, NcrStatus},
    store::{Collection, RecordStore},
};
use std::sync::Arc;
use tracing::{error, info, instrument};

use super::load_ncr;

/// Edits an NCR document. Canceled documents are frozen.
#[derive(Debug)]
pub struct UpdateNcrCommand {
    pub ncr_id: String,
    pub patch: NcrPatch,
}

impl UpdateNcrCommand {
    fn check_patch(&self) -> Result<(), ServiceError> {
        if self.patch.is_empty() {
            return Err(ServiceError::ValidationError(
                "update contains no fields".to_string(),
            ));
        }
        if self.patch.status == Some(NcrStatus::Canceled) {
            return Err(ServiceError::InvalidOperation(
                "NCRs are canceled through the cancel action".to_string(),
            ));
        }
        if matches!(&self.patch.items, Some(items) if items.is_empty()) {
            return Err(ServiceError::ValidationError(
                "an NCR needs at least one item".to_string(),
            ));
        }
        if matches!(&self.patch.problem_detail, Some(detail) if detail.trim().is_empty()) {
            return Err(ServiceError::ValidationError(
                "problemDetail must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl Command for UpdateNcrCommand {
    type Result = NcrRecord;

    #[instrument(skip(self, store, event_sender), fields(ncr_id = %self.ncr_id))]
    async fn execute(
        &self,
        store: Arc<dyn RecordStore>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.check_patch()?;

        let current = load_ncr(store.as_ref(), &self.ncr_id).await?;
        if current.is_canceled() {
            return Err(ServiceError::InvalidStatus(format!(
                "NCR {} is canceled and can no longer be edited",
                current.header.display_no()
            )));
        }

        store
            .update(Collection::NcrReports, &self.ncr_id, self.patch.to_document()?)
            .await
            .map_err(|e| {
                error!(ncr_id = %self.ncr_id, error = %e, "Failed to update NCR");
                ServiceError::from(e)
            })?;

        let updated = load_ncr(store.as_ref(), &self.ncr_id).await?;
        info!(ncr_no = %updated.header.display_no(), "NCR updated");
        event_sender
            .send_or_log(Event::NcrUpdated(self.ncr_id.clone()))
            .await;

        Ok(updated)
    }
}
