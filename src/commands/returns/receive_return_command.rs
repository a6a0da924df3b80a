use crate::{
    commands::Command,
    errors::ServiceError,
    events::{Event, EventSender},
    models::{ReturnRecord, ReturnStatus},
    store::RecordStore,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

use super::advance_return;

/// Marks a requested return as physically arrived.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReceiveReturnCommand {
    pub return_id: String,
    pub received_on: NaiveDate,
}

#[async_trait::async_trait]
impl Command for ReceiveReturnCommand {
    type Result = ReturnRecord;

    #[instrument(skip(self, store, event_sender), fields(return_id = %self.return_id))]
    async fn execute(
        &self,
        store: Arc<dyn RecordStore>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        let received = advance_return(
            store.as_ref(),
            &self.return_id,
            ReturnStatus::Received,
            self.received_on,
        )
        .await?;

        event_sender
            .send_or_log(Event::ReturnReceived(self.return_id.clone()))
            .await;
        Ok(received)
    }
}
