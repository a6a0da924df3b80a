use crate::{
    commands::Command,
    errors::ServiceError,
    events::{Event, EventSender},
    models::{NcrItem, ReturnPatch},
    store::RecordStore,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::write_patch;

/// Copies corrected product, quantity, price and customer fields from an
/// edited NCR line onto the return that was raised for it.
#[derive(Debug, Serialize, Deserialize)]
pub struct SyncReturnFromNcrCommand {
    pub return_id: String,
    pub ncr_no: String,
    pub item: NcrItem,
}

impl SyncReturnFromNcrCommand {
    pub fn patch(&self) -> ReturnPatch {
        let item = &self.item;
        ReturnPatch {
            product_code: Some(item.product_code.clone()),
            product_name: Some(item.product_name.clone()),
            quantity: Some(item.quantity),
            unit: Some(item.unit.clone()),
            price_bill: Some(item.price_bill),
            amount: Some(item.quantity * item.price_bill),
            customer_name: Some(item.customer_name.clone()),
            destination_customer: Some(item.destination_customer.clone())
                .filter(|d| !d.trim().is_empty()),
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl Command for SyncReturnFromNcrCommand {
    type Result = ();

    #[instrument(skip(self, store, event_sender), fields(return_id = %self.return_id, ncr_no = %self.ncr_no))]
    async fn execute(
        &self,
        store: Arc<dyn RecordStore>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, ServiceError> {
        if self.item.quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "NCR {} line {} has no quantity to carry onto return {}",
                self.ncr_no, self.item.product_code, self.return_id
            )));
        }
        write_patch(store.as_ref(), &self.return_id, &self.patch()).await?;
        debug!("Return synced from NCR line");

        event_sender
            .send_or_log(Event::ReturnSyncedFromNcr {
                return_id: self.return_id.clone(),
                ncr_no: self.ncr_no.clone(),
            })
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn patch_recomputes_amount_and_leaves_workflow_fields_alone() {
        let command = SyncReturnFromNcrCommand {
            return_id: "RT-2024-5".into(),
            ncr_no: "NCR-7".into(),
            item: NcrItem {
                product_code: "P-2".into(),
                quantity: dec!(3),
                price_bill: dec!(20),
                ..Default::default()
            },
        };
        let patch = command.patch();
        assert_eq!(patch.amount, Some(dec!(60)));
        assert!(patch.status.is_none());
        assert!(patch.disposition.is_none());

        let doc = serde_json::to_value(&patch).unwrap();
        assert!(doc.get("status").is_none());
        assert_eq!(doc["productCode"], "P-2");
    }

    #[test]
    fn blank_destination_is_left_untouched() {
        let command = SyncReturnFromNcrCommand {
            return_id: "RT-2024-6".into(),
            ncr_no: "NCR-8".into(),
            item: NcrItem {
                quantity: dec!(1),
                destination_customer: "  ".into(),
                ..Default::default()
            },
        };
        let patch = command.patch();
        assert!(patch.destination_customer.is_none());
        assert!(serde_json::to_value(&patch).unwrap().get("destinationCustomer").is_none());
    }

    #[tokio::test]
    async fn zero_quantity_line_is_not_synced() {
        use crate::store::{memory::MemoryStore, Collection};

        let store: Arc<dyn RecordStore> = Arc::new(MemoryStore::new());
        let mut fields = crate::store::Document::new();
        fields.insert("quantity".into(), serde_json::json!("4"));
        store
            .create(Collection::Returns, "RT-2024-9", fields)
            .await
            .unwrap();
        let (tx, _rx) = tokio::sync::mpsc::channel(8);

        let command = SyncReturnFromNcrCommand {
            return_id: "RT-2024-9".into(),
            ncr_no: "NCR-9".into(),
            item: NcrItem {
                quantity: Decimal::ZERO,
                ..Default::default()
            },
        };
        let result = command.execute(store.clone(), Arc::new(EventSender::new(tx))).await;
        assert!(matches!(result, Err(ServiceError::ValidationError(_))));

        let stored = store.get(Collection::Returns, "RT-2024-9").await.unwrap().unwrap();
        assert_eq!(stored["quantity"], "4");
    }
}
