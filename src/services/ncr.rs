use crate::{
    auth::{consts as perm, Operator},
    commands::{
        ncr::{CancelNcrCommand, CancelOutcome, CreateNcrCommand, NcrForm, UpdateNcrCommand},
        returns::{ReturnDraft, SyncReturnFromNcrCommand},
        Command,
    },
    errors::ServiceError,
    events::EventSender,
    models::{NcrItem, NcrPatch, NcrRecord, ReturnRecord},
    queries::{
        ncr_queries::{GetNcrQuery, ListNcrRowsQuery, NcrFilter, NcrRow},
        return_queries::all_returns,
        Query,
    },
    services::{returns::ReturnService, Clock},
    store::{Collection, LiveCollection, RecordStore},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Result of an NCR edit, with the returns that were re-synced from it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NcrUpdate {
    pub ncr: NcrRecord,
    pub synced_returns: Vec<String>,
}

/// Builds the return intake draft for one line of an NCR. Pure: the same
/// document and line always give the same draft, dated like the document.
/// The draft still has to pass the normal intake validation.
pub fn derive_return_draft(ncr: &NcrRecord, item: &NcrItem) -> Result<ReturnDraft, ServiceError> {
    let header = &ncr.header;
    if ncr.is_canceled() {
        return Err(ServiceError::InvalidStatus(format!(
            "NCR {} is canceled",
            header.display_no()
        )));
    }
    if !header.actions.triggers_return() {
        return Err(ServiceError::InvalidOperation(format!(
            "NCR {} has no reject or scrap action",
            header.display_no()
        )));
    }

    let destination = Some(item.destination_customer.clone()).filter(|d| !d.trim().is_empty());
    Ok(ReturnDraft {
        branch: item.branch.clone(),
        date: Some(header.date),
        ref_no: item.ref_no.clone().unwrap_or_default(),
        neo_ref_no: item.neo_ref_no.clone(),
        ncr_number: Some(header.display_no().to_string()),
        product_code: item.product_code.clone(),
        product_name: item.product_name.clone(),
        customer_name: item.customer_name.clone(),
        destination_customer: destination,
        quantity: item.quantity,
        unit: item.unit.clone(),
        price_bill: item.price_bill,
        expiry_date: item.expiry_date,
        reason: Some(format!(
            "From NCR: {} ({})",
            header.problem_detail, item.problem_source
        )),
        problem_type: Some(header.problem_detail.clone()),
        root_cause: Some(item.problem_source.clone()),
        actions: header.actions.clone(),
        ..Default::default()
    })
}

/// True when `record` was raised for the same invoice line as `item`.
/// Blank reference numbers never match.
fn references_line(item: &NcrItem, record: &ReturnRecord) -> bool {
    let ref_no = item.ref_no.as_deref().map(str::trim).filter(|r| !r.is_empty());
    let neo_ref_no = item
        .neo_ref_no
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty());

    ref_no.map_or(false, |wanted| record.ref_no.trim() == wanted)
        || neo_ref_no.map_or(false, |wanted| {
            record.neo_ref_no.as_deref().map(str::trim) == Some(wanted)
        })
}

/// First return (in id order) raised for the same invoice line as `item`.
fn matching_return<'a>(item: &NcrItem, returns: &'a [ReturnRecord]) -> Option<&'a ReturnRecord> {
    returns.iter().find(|r| references_line(item, r))
}

/// Return already raised from `item` of the NCR numbered `ncr_no`.
fn line_return<'a>(
    ncr_no: &str,
    item: &NcrItem,
    returns: &'a [ReturnRecord],
) -> Option<&'a ReturnRecord> {
    let ncr_no = ncr_no.trim();
    returns.iter().find(|r| {
        r.ncr_number.as_deref().map(str::trim) == Some(ncr_no) && references_line(item, r)
    })
}

/// Service for the NCR registry
#[derive(Clone)]
pub struct NcrService {
    store: Arc<dyn RecordStore>,
    event_sender: Arc<EventSender>,
    clock: Arc<dyn Clock>,
    returns: Arc<ReturnService>,
}

impl NcrService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        event_sender: Arc<EventSender>,
        clock: Arc<dyn Clock>,
        returns: Arc<ReturnService>,
    ) -> Self {
        Self {
            store,
            event_sender,
            clock,
            returns,
        }
    }

    /// Filtered NCR lines, one row per item
    #[instrument(skip(self, operator, filter), fields(operator = %operator.name))]
    pub async fn list_rows(
        &self,
        operator: &Operator,
        filter: NcrFilter,
    ) -> Result<Vec<NcrRow>, ServiceError> {
        operator.require(perm::NCR_READ)?;
        ListNcrRowsQuery { filter }
            .execute(self.store.as_ref())
            .await
    }

    /// Export rows; same filter as the list, gated by the export capability.
    #[instrument(skip(self, operator, filter), fields(operator = %operator.name))]
    pub async fn export_rows(
        &self,
        operator: &Operator,
        filter: NcrFilter,
    ) -> Result<Vec<NcrRow>, ServiceError> {
        operator.require(perm::REPORTS_EXPORT)?;
        ListNcrRowsQuery { filter }
            .execute(self.store.as_ref())
            .await
    }

    #[instrument(skip(self, operator), fields(operator = %operator.name))]
    pub async fn get_ncr(&self, operator: &Operator, ncr_id: &str) -> Result<NcrRecord, ServiceError> {
        operator.require(perm::NCR_READ)?;
        GetNcrQuery {
            ncr_id: ncr_id.to_string(),
        }
        .execute(self.store.as_ref())
        .await
    }

    pub async fn watch_ncrs(
        &self,
        operator: &Operator,
    ) -> Result<LiveCollection<NcrRecord>, ServiceError> {
        operator.require(perm::NCR_READ)?;
        let receiver = self.store.subscribe(Collection::NcrReports).await?;
        Ok(LiveCollection::new(receiver))
    }

    #[instrument(skip(self, operator, form), fields(operator = %operator.name))]
    pub async fn create_ncr(&self, operator: &Operator, form: NcrForm) -> Result<NcrRecord, ServiceError> {
        operator.require(perm::NCR_CREATE)?;
        CreateNcrCommand { form }
            .execute(self.store.clone(), self.event_sender.clone())
            .await
    }

    /// Edits an NCR, then pushes corrected line data onto the returns raised
    /// for those lines. A failed push is logged and does not fail the edit.
    #[instrument(skip(self, operator, patch), fields(operator = %operator.name))]
    pub async fn update_ncr(
        &self,
        operator: &Operator,
        ncr_id: &str,
        patch: NcrPatch,
    ) -> Result<NcrUpdate, ServiceError> {
        operator.require(perm::NCR_UPDATE)?;
        let ncr = UpdateNcrCommand {
            ncr_id: ncr_id.to_string(),
            patch,
        }
        .execute(self.store.clone(), self.event_sender.clone())
        .await?;

        let synced_returns = self.propagate_to_returns(&ncr).await;
        Ok(NcrUpdate {
            ncr,
            synced_returns,
        })
    }

    async fn propagate_to_returns(&self, ncr: &NcrRecord) -> Vec<String> {
        let returns = match all_returns(self.store.as_ref()).await {
            Ok(returns) => returns,
            Err(e) => {
                warn!(ncr_no = %ncr.header.display_no(), error = %e, "Could not load returns for NCR sync");
                return Vec::new();
            }
        };

        let mut synced = Vec::new();
        for item in &ncr.items {
            let Some(target) = matching_return(item, &returns) else {
                continue;
            };
            let command = SyncReturnFromNcrCommand {
                return_id: target.id.clone(),
                ncr_no: ncr.header.ncr_no.clone(),
                item: item.clone(),
            };
            match command
                .execute(self.store.clone(), self.event_sender.clone())
                .await
            {
                Ok(()) => synced.push(target.id.clone()),
                Err(e) => warn!(
                    return_id = %target.id,
                    ncr_no = %ncr.header.display_no(),
                    error = %e,
                    "Return sync from NCR failed"
                ),
            }
        }
        if !synced.is_empty() {
            info!(ncr_no = %ncr.header.display_no(), count = synced.len(), "Returns synced from NCR");
        }
        synced
    }

    /// Cancels an NCR on behalf of `operator`. Repeating the call is harmless.
    #[instrument(skip(self, operator), fields(operator = %operator.name))]
    pub async fn cancel_ncr(
        &self,
        operator: &Operator,
        ncr_id: &str,
    ) -> Result<CancelOutcome, ServiceError> {
        operator.require(perm::NCR_CANCEL)?;
        CancelNcrCommand {
            ncr_id: ncr_id.to_string(),
            canceled_by: operator.name.clone(),
            canceled_at: self.clock.now(),
        }
        .execute(self.store.clone(), self.event_sender.clone())
        .await
    }

    /// Pre-filled intake draft for line `index` of an NCR; nothing is written.
    #[instrument(skip(self, operator), fields(operator = %operator.name))]
    pub async fn return_draft(
        &self,
        operator: &Operator,
        ncr_id: &str,
        index: usize,
    ) -> Result<ReturnDraft, ServiceError> {
        let ncr = self.get_ncr(operator, ncr_id).await?;
        let item = ncr.items.get(index).ok_or_else(|| {
            ServiceError::NotFound(format!("NCR {} has no item {}", ncr.header.display_no(), index))
        })?;
        self.ensure_line_not_returned(&ncr, item).await?;
        derive_return_draft(&ncr, item)
    }

    async fn ensure_line_not_returned(&self, ncr: &NcrRecord, item: &NcrItem) -> Result<(), ServiceError> {
        let returns = all_returns(self.store.as_ref()).await?;
        match line_return(ncr.header.display_no(), item, &returns) {
            Some(existing) => Err(ServiceError::Conflict(format!(
                "NCR {} line {} already has return {}",
                ncr.header.display_no(),
                item.product_code,
                existing.id
            ))),
            None => Ok(()),
        }
    }

    /// Derives the draft for line `index` and files it through normal intake.
    /// A line gives at most one return.
    #[instrument(skip(self, operator), fields(operator = %operator.name))]
    pub async fn create_return_from_ncr(
        &self,
        operator: &Operator,
        ncr_id: &str,
        index: usize,
    ) -> Result<ReturnRecord, ServiceError> {
        let draft = self.return_draft(operator, ncr_id, index).await?;
        self.returns.create_return(operator, draft).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ActionFlags, NcrHeader, NcrStatus};
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn ncr(status: NcrStatus, actions: ActionFlags) -> NcrRecord {
        NcrRecord {
            header: NcrHeader {
                id: "n1".into(),
                ncr_no: "NCR-2024-001".into(),
                date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
                to_dept: None,
                copy_to: None,
                founder: None,
                po_no: None,
                problem_detail: "Crushed cartons".into(),
                status,
                problems: Default::default(),
                actions,
                canceled_at: None,
                canceled_by: None,
            },
            items: vec![NcrItem {
                product_code: "P-1".into(),
                product_name: "Water 600ml".into(),
                customer_name: "Shop A".into(),
                branch: "North".into(),
                quantity: dec!(4),
                price_bill: dec!(25),
                problem_source: "Transport".into(),
                ref_no: Some("INV-7".into()),
                ..Default::default()
            }],
        }
    }

    fn reject() -> ActionFlags {
        ActionFlags {
            action_reject: true,
            action_reject_qty: dec!(4),
            ..Default::default()
        }
    }

    fn filed_return(id: &str, ref_no: &str, ncr_number: Option<&str>) -> ReturnRecord {
        let on = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        ReturnRecord {
            id: id.into(),
            branch: "North".into(),
            date: on,
            ref_no: ref_no.into(),
            neo_ref_no: None,
            ncr_number: ncr_number.map(String::from),
            product_code: "P-1".into(),
            product_name: "Water".into(),
            customer_name: "Shop".into(),
            destination_customer: None,
            quantity: dec!(1),
            unit: String::new(),
            price_bill: dec!(0),
            price_sell: dec!(0),
            amount: dec!(0),
            expiry_date: None,
            reason: String::new(),
            notes: None,
            category: "General".into(),
            problem_type: None,
            root_cause: None,
            actions: Default::default(),
            status: Default::default(),
            condition: Default::default(),
            disposition: Default::default(),
            disposition_details: Default::default(),
            date_requested: on,
            date_received: None,
            date_graded: None,
            date_documented: None,
            date_completed: None,
        }
    }

    #[test]
    fn draft_is_prefilled_from_header_and_line() {
        let doc = ncr(NcrStatus::Open, reject());
        let draft = derive_return_draft(&doc, &doc.items[0]).unwrap();

        assert_eq!(draft.reason.as_deref(), Some("From NCR: Crushed cartons (Transport)"));
        assert_eq!(draft.problem_type.as_deref(), Some("Crushed cartons"));
        assert_eq!(draft.root_cause.as_deref(), Some("Transport"));
        assert_eq!(draft.ncr_number.as_deref(), Some("NCR-2024-001"));
        assert_eq!(draft.ref_no, "INV-7");
        assert_eq!(draft.actions, reject());
        assert!(draft.destination_customer.is_none());
        assert_eq!(draft, derive_return_draft(&doc, &doc.items[0]).unwrap());
    }

    #[test]
    fn draft_is_dated_like_the_document() {
        let doc = ncr(NcrStatus::Open, reject());
        let draft = derive_return_draft(&doc, &doc.items[0]).unwrap();
        assert_eq!(draft.date, Some(doc.header.date));
    }

    #[test]
    fn draft_falls_back_to_document_id_without_number() {
        let mut doc = ncr(NcrStatus::Open, reject());
        doc.header.ncr_no = "  ".into();
        let draft = derive_return_draft(&doc, &doc.items[0]).unwrap();
        assert_eq!(draft.ncr_number.as_deref(), Some("n1"));
    }

    #[test]
    fn canceled_or_actionless_documents_give_no_draft() {
        let canceled = ncr(NcrStatus::Canceled, reject());
        assert!(matches!(
            derive_return_draft(&canceled, &canceled.items[0]),
            Err(ServiceError::InvalidStatus(_))
        ));

        let plain = ncr(NcrStatus::Open, ActionFlags::default());
        assert!(matches!(
            derive_return_draft(&plain, &plain.items[0]),
            Err(ServiceError::InvalidOperation(_))
        ));
    }

    #[test]
    fn blank_references_never_match() {
        let item = NcrItem {
            ref_no: Some("  ".into()),
            ..Default::default()
        };
        let record = filed_return("RT-2024-1", "", None);
        assert!(matching_return(&item, std::slice::from_ref(&record)).is_none());
    }

    #[test]
    fn line_return_needs_both_ncr_number_and_reference() {
        let doc = ncr(NcrStatus::Open, reject());
        let item = &doc.items[0];
        let returns = vec![
            filed_return("RT-2024-1", "INV-7", None),
            filed_return("RT-2024-2", "INV-8", Some("NCR-2024-001")),
        ];
        assert!(line_return("NCR-2024-001", item, &returns).is_none());

        let returns = vec![filed_return("RT-2024-3", "INV-7", Some("NCR-2024-001"))];
        let found = line_return("NCR-2024-001", item, &returns).unwrap();
        assert_eq!(found.id, "RT-2024-3");
    }
}
