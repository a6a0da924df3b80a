use crate::{
    commands::{validate_not_blank, Command},
    errors::ServiceError,
    events::{Event, EventSender},
    models::{ActionFlags, NcrHeader, NcrItem, NcrRecord, NcrStatus, ProblemFlags},
    store::{decode_snapshot, to_document, Collection, RecordStore},
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// A new NCR document as submitted by the registry form.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct NcrForm {
    #[validate(custom = "validate_not_blank")]
    pub ncr_no: String,
    #[validate(required)]
    pub date: Option<NaiveDate>,
    pub to_dept: Option<String>,
    pub copy_to: Option<String>,
    pub founder: Option<String>,
    pub po_no: Option<String>,
    #[validate(custom = "validate_not_blank")]
    pub problem_detail: String,
    #[serde(flatten)]
    pub problems: ProblemFlags,
    #[serde(flatten)]
    pub actions: ActionFlags,
    #[validate(custom = "validate_items")]
    pub items: Vec<NcrItem>,
}

fn validate_items(items: &Vec<NcrItem>) -> Result<(), ValidationError> {
    if items.is_empty() {
        let mut err = ValidationError::new("items");
        err.message = Some("an NCR needs at least one item".into());
        return Err(err);
    }
    if items
        .iter()
        .any(|item| item.product_code.trim().is_empty() && item.product_name.trim().is_empty())
    {
        let mut err = ValidationError::new("items");
        err.message = Some("every item needs a product code or name".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug)]
pub struct CreateNcrCommand {
    pub form: NcrForm,
}

#[async_trait::async_trait]
impl Command for CreateNcrCommand {
    type Result = NcrRecord;

    #[instrument(skip(self, store, event_sender), fields(ncr_no = %self.form.ncr_no))]
    async fn execute(
        &self,
        store: Arc<dyn RecordStore>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.form.validate().map_err(|e| {
            let msg = format!("Invalid input: {}", e);
            error!("{}", msg);
            ServiceError::ValidationError(msg)
        })?;

        let date = self
            .form
            .date
            .ok_or_else(|| ServiceError::ValidationError("date is required".to_string()))?;
        self.ensure_number_is_free(store.as_ref()).await?;

        let record = self.build_record(date);
        store
            .create(Collection::NcrReports, &record.header.id, to_document(&record)?)
            .await
            .map_err(|e| {
                error!(ncr_no = %self.form.ncr_no, error = %e, "Failed to create NCR");
                ServiceError::from(e)
            })?;

        info!(ncr_id = %record.header.id, ncr_no = %record.header.ncr_no, items = record.items.len(), "NCR created");
        event_sender
            .send_or_log(Event::NcrCreated {
                id: record.header.id.clone(),
                ncr_no: record.header.ncr_no.clone(),
            })
            .await;

        Ok(record)
    }
}

impl CreateNcrCommand {
    async fn ensure_number_is_free(&self, store: &dyn RecordStore) -> Result<(), ServiceError> {
        let wanted = self.form.ncr_no.trim();
        let existing: Vec<NcrRecord> = decode_snapshot(&store.list(Collection::NcrReports).await?);
        if existing
            .iter()
            .any(|ncr| ncr.header.ncr_no.trim().eq_ignore_ascii_case(wanted))
        {
            return Err(ServiceError::Conflict(format!(
                "NCR number {} is already in use",
                wanted
            )));
        }
        Ok(())
    }

    fn build_record(&self, date: NaiveDate) -> NcrRecord {
        let form = &self.form;
        let items = form
            .items
            .iter()
            .cloned()
            .map(|mut item| {
                if item.id.is_none() {
                    item.id = Some(Uuid::new_v4().simple().to_string());
                }
                item
            })
            .collect();

        NcrRecord {
            header: NcrHeader {
                id: Uuid::new_v4().to_string(),
                ncr_no: form.ncr_no.trim().to_string(),
                date,
                to_dept: form.to_dept.clone(),
                copy_to: form.copy_to.clone(),
                founder: form.founder.clone(),
                po_no: form.po_no.clone(),
                problem_detail: form.problem_detail.trim().to_string(),
                status: NcrStatus::Open,
                problems: form.problems.clone(),
                actions: form.actions.clone(),
                canceled_at: None,
                canceled_by: None,
            },
            items,
        }
    }
}
