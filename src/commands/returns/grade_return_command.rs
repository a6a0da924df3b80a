use crate::{
    commands::Command,
    errors::ServiceError,
    events::{Event, EventSender},
    models::{Disposition, DispositionDetails, ItemCondition, ReturnPatch, ReturnRecord, ReturnStatus},
    store::RecordStore,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{ensure_status, load_return, write_patch};

/// QC result entered by the inspector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GradeReturnRequest {
    pub condition: ItemCondition,
    pub disposition: Disposition,
    #[serde(flatten)]
    pub details: DispositionDetails,
}

impl GradeReturnRequest {
    /// Condition and disposition are both mandatory, plus the sub-field the
    /// chosen disposition needs.
    pub fn validate(&self) -> Result<(), ServiceError> {
        let mut problems = Vec::new();
        if self.condition.is_unknown() {
            problems.push("condition is required".to_string());
        }
        if self.disposition.is_pending() {
            problems.push("disposition is required".to_string());
        }
        for field in self.details.missing_for(self.disposition) {
            problems.push(format!("{} is required for {}", field, self.disposition));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::ValidationError(problems.join("; ")))
        }
    }
}

#[derive(Debug)]
pub struct GradeReturnCommand {
    pub return_id: String,
    pub grade: GradeReturnRequest,
    pub graded_on: NaiveDate,
}

#[async_trait::async_trait]
impl Command for GradeReturnCommand {
    type Result = ReturnRecord;

    #[instrument(skip(self, store, event_sender), fields(return_id = %self.return_id))]
    async fn execute(
        &self,
        store: Arc<dyn RecordStore>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        self.grade.validate()?;

        let mut record = load_return(store.as_ref(), &self.return_id).await?;
        ensure_status(&record, ReturnStatus::Received)?;

        let details = self.grade.details.retain_for(self.grade.disposition);
        let patch = ReturnPatch {
            condition: Some(self.grade.condition.clone()),
            disposition: Some(self.grade.disposition),
            disposition_details: Some(details.clone()),
            ..ReturnPatch::advance(ReturnStatus::Graded, self.graded_on)
        };
        write_patch(store.as_ref(), &self.return_id, &patch).await?;

        record.status = ReturnStatus::Graded;
        record.date_graded = Some(self.graded_on);
        record.condition = self.grade.condition.clone();
        record.disposition = self.grade.disposition;
        record.disposition_details = details;

        info!(
            return_id = %self.return_id,
            condition = %record.condition.as_str(),
            disposition = %record.disposition,
            "Return graded"
        );
        event_sender
            .send_or_log(Event::ReturnGraded {
                id: self.return_id.clone(),
                disposition: record.disposition,
            })
            .await;

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn request_reads_flat_form_fields() {
        let request: GradeReturnRequest = serde_json::from_value(json!({
            "condition": "WetBox",
            "disposition": "Restock",
            "sellerName": "Somchai",
            "contactPhone": "081-000-0000"
        }))
        .unwrap();
        assert_eq!(request.condition, ItemCondition::WetBox);
        assert_eq!(request.details.seller_name.as_deref(), Some("Somchai"));
        assert!(request.validate().is_ok());
    }

    #[test]
    fn unknown_condition_and_pending_disposition_are_rejected() {
        let err = GradeReturnRequest::default().validate().unwrap_err();
        assert_matches!(err, ServiceError::ValidationError(msg) => {
            assert!(msg.contains("condition is required"));
            assert!(msg.contains("disposition is required"));
        });
    }

    #[test]
    fn disposition_sub_fields_are_required() {
        let request = GradeReturnRequest {
            condition: ItemCondition::Damaged,
            disposition: Disposition::Claim,
            details: DispositionDetails::default(),
        };
        assert_matches!(
            request.validate(),
            Err(ServiceError::ValidationError(msg)) if msg.contains("claimCompany")
        );

        let recycle = GradeReturnRequest {
            condition: ItemCondition::Expired,
            disposition: Disposition::Recycle,
            details: DispositionDetails::default(),
        };
        assert!(recycle.validate().is_ok());
    }
}
