use crate::{
    commands::{validate_non_negative, validate_not_blank, validate_positive, Command},
    errors::ServiceError,
    events::{Event, EventSender},
    models::{
        optional_date, return_record::default_category, ActionFlags, Disposition,
        DispositionDetails, ItemCondition, ReturnRecord, ReturnStatus,
    },
    store::{to_document, Collection, RecordStore, StoreError},
};
use chrono::{Datelike, NaiveDate};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use validator::Validate;

const ID_ATTEMPTS: usize = 5;
const DEFAULT_REASON: &str = "Return request";

/// Intake form of a return request. Also the shape of a draft derived from an
/// NCR item, so both paths pass the same validation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct ReturnDraft {
    #[validate(custom = "validate_not_blank")]
    pub branch: String,
    #[validate(required)]
    pub date: Option<NaiveDate>,
    #[validate(custom = "validate_not_blank")]
    pub ref_no: String,
    pub neo_ref_no: Option<String>,
    pub ncr_number: Option<String>,
    #[validate(custom = "validate_not_blank")]
    pub product_code: String,
    #[validate(custom = "validate_not_blank")]
    pub product_name: String,
    #[validate(custom = "validate_not_blank")]
    pub customer_name: String,
    pub destination_customer: Option<String>,
    #[validate(custom = "validate_positive")]
    pub quantity: Decimal,
    pub unit: String,
    #[validate(custom = "validate_non_negative")]
    pub price_bill: Decimal,
    #[validate(custom = "validate_non_negative")]
    pub price_sell: Decimal,
    #[serde(with = "optional_date")]
    pub expiry_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub reason: Option<String>,
    pub problem_type: Option<String>,
    pub root_cause: Option<String>,
    pub category: Option<String>,
    #[serde(flatten)]
    pub actions: ActionFlags,
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl ReturnDraft {
    /// Explicit reason, else the notes, else the generic label.
    pub fn resolved_reason(&self) -> String {
        non_blank(&self.reason)
            .or_else(|| non_blank(&self.notes))
            .unwrap_or_else(|| DEFAULT_REASON.to_string())
    }

    pub fn amount(&self) -> Decimal {
        self.quantity * self.price_bill
    }
}

#[derive(Debug, Clone)]
pub struct CreateReturnCommand {
    pub draft: ReturnDraft,
    /// Day the request is filed
    pub requested_on: NaiveDate,
}

#[async_trait::async_trait]
impl Command for CreateReturnCommand {
    type Result = ReturnRecord;

    #[instrument(skip(self, store, event_sender), fields(product_code = %self.draft.product_code))]
    async fn execute(
        &self,
        store: Arc<dyn RecordStore>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.draft.validate().map_err(|e| {
            let msg = format!("Invalid input: {}", e);
            error!("{}", msg);
            ServiceError::ValidationError(msg)
        })?;

        let record = self.insert_with_fresh_id(store.as_ref()).await?;

        info!(
            return_id = %record.id,
            ncr_number = ?record.ncr_number,
            "Return requested"
        );
        event_sender
            .send_or_log(Event::ReturnCreated {
                id: record.id.clone(),
                ncr_number: record.ncr_number.clone(),
            })
            .await;

        Ok(record)
    }
}

impl CreateReturnCommand {
    fn build_record(&self, id: String) -> ReturnRecord {
        let draft = &self.draft;
        ReturnRecord {
            id,
            branch: draft.branch.trim().to_string(),
            date: draft.date.unwrap_or(self.requested_on),
            ref_no: draft.ref_no.trim().to_string(),
            neo_ref_no: non_blank(&draft.neo_ref_no),
            ncr_number: non_blank(&draft.ncr_number),
            product_code: draft.product_code.trim().to_string(),
            product_name: draft.product_name.trim().to_string(),
            customer_name: draft.customer_name.trim().to_string(),
            destination_customer: non_blank(&draft.destination_customer),
            quantity: draft.quantity,
            unit: draft.unit.trim().to_string(),
            price_bill: draft.price_bill,
            price_sell: draft.price_sell,
            amount: draft.amount(),
            expiry_date: draft.expiry_date,
            reason: draft.resolved_reason(),
            notes: non_blank(&draft.notes),
            category: non_blank(&draft.category).unwrap_or_else(default_category),
            problem_type: non_blank(&draft.problem_type),
            root_cause: non_blank(&draft.root_cause),
            actions: draft.actions.clone(),
            status: ReturnStatus::Requested,
            condition: ItemCondition::Unknown,
            disposition: Disposition::Pending,
            disposition_details: DispositionDetails::default(),
            date_requested: self.requested_on,
            date_received: None,
            date_graded: None,
            date_documented: None,
            date_completed: None,
        }
    }

    /// Ids are `RT-<year>-<n>`; a collision draws a new number instead of
    /// overwriting the existing record.
    async fn insert_with_fresh_id(
        &self,
        store: &dyn RecordStore,
    ) -> Result<ReturnRecord, ServiceError> {
        for attempt in 1..=ID_ATTEMPTS {
            let id = generate_return_id(self.requested_on);
            let record = self.build_record(id.clone());
            let document = to_document(&record)?;

            match store.create(Collection::Returns, &id, document).await {
                Ok(()) => return Ok(record),
                Err(StoreError::AlreadyExists { .. }) => {
                    warn!(return_id = %id, attempt, "Return id collision, drawing a new one");
                }
                Err(e) => {
                    error!(return_id = %id, error = %e, "Failed to create return");
                    return Err(e.into());
                }
            }
        }
        Err(ServiceError::Conflict(format!(
            "could not allocate a free return id after {} attempts",
            ID_ATTEMPTS
        )))
    }
}

pub fn generate_return_id(on: NaiveDate) -> String {
    let n: u32 = rand::thread_rng().gen_range(0..100_000);
    format!("RT-{}-{}", on.year(), n)
}
