pub mod cancel_ncr_command;
pub mod create_ncr_command;
pub mod update_ncr_command;

pub use cancel_ncr_command::{CancelNcrCommand, CancelOutcome};
pub use create_ncr_command::{CreateNcrCommand, NcrForm};
pub use update_ncr_command::UpdateNcrCommand;

use tracing::error;

use crate::{
    errors::ServiceError,
    models::NcrRecord,
    store::{from_document, Collection, RecordStore},
};

pub(crate) async fn load_ncr(store: &dyn RecordStore, id: &str) -> Result<NcrRecord, ServiceError> {
    let document = store
        .get(Collection::NcrReports, id)
        .await
        .map_err(|e| {
            error!(ncr_id = %id, error = %e, "Failed to fetch NCR");
            ServiceError::from(e)
        })?
        .ok_or_else(|| ServiceError::NotFound(format!("NCR {} not found", id)))?;
    Ok(from_document(document)?)
}
