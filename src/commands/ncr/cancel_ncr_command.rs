use crate::{
    commands::Command,
    errors::ServiceError,
    events::{Event, EventSender},
    models::{NcrRecord, NcrStatus},
    store::{Collection, Document, RecordStore},
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, instrument};

use super::load_ncr;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelOutcome {
    pub ncr: NcrRecord,
    /// True when the document was already canceled and nothing changed.
    pub already_canceled: bool,
}

/// Cancels an NCR. The document is kept for the audit trail.
#[derive(Debug)]
pub struct CancelNcrCommand {
    pub ncr_id: String,
    pub canceled_by: String,
    pub canceled_at: DateTime<Utc>,
}

#[async_trait::async_trait]
impl Command for CancelNcrCommand {
    type Result = CancelOutcome;

    #[instrument(skip(self, store, event_sender), fields(ncr_id = %self.ncr_id))]
    async fn execute(
        &self,
        store: Arc<dyn RecordStore>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        let mut ncr = load_ncr(store.as_ref(), &self.ncr_id).await?;
        if ncr.is_canceled() {
            info!(ncr_no = %ncr.header.display_no(), "NCR already canceled");
            return Ok(CancelOutcome {
                ncr,
                already_canceled: true,
            });
        }

        let mut fields = Document::new();
        fields.insert(
            "status".to_string(),
            Value::String(NcrStatus::Canceled.to_string()),
        );
        fields.insert(
            "canceledBy".to_string(),
            Value::String(self.canceled_by.clone()),
        );
        fields.insert(
            "canceledAt".to_string(),
            Value::String(self.canceled_at.to_rfc3339_opts(SecondsFormat::Secs, true)),
        );
        store
            .update(Collection::NcrReports, &self.ncr_id, fields)
            .await
            .map_err(|e| {
                error!(ncr_id = %self.ncr_id, error = %e, "Failed to cancel NCR");
                ServiceError::from(e)
            })?;

        ncr.header.status = NcrStatus::Canceled;
        ncr.header.canceled_by = Some(self.canceled_by.clone());
        ncr.header.canceled_at = Some(self.canceled_at);

        info!(ncr_no = %ncr.header.display_no(), canceled_by = %self.canceled_by, "NCR canceled");
        event_sender
            .send_or_log(Event::NcrCanceled {
                id: self.ncr_id.clone(),
                by: self.canceled_by.clone(),
            })
            .await;

        Ok(CancelOutcome {
            ncr,
            already_canceled: false,
        })
    }
}
