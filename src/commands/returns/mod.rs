pub mod complete_return_command;
pub mod confirm_documented_command;
pub mod create_return_command;
pub mod grade_return_command;
pub mod receive_return_command;
pub mod sync_return_from_ncr_command;

pub use complete_return_command::CompleteReturnCommand;
pub use confirm_documented_command::{BatchFailure, BatchOutcome, ConfirmDocumentedCommand};
pub use create_return_command::{CreateReturnCommand, ReturnDraft};
pub use grade_return_command::{GradeReturnCommand, GradeReturnRequest};
pub use receive_return_command::ReceiveReturnCommand;
pub use sync_return_from_ncr_command::SyncReturnFromNcrCommand;

use chrono::NaiveDate;
use tracing::{error, info};

use crate::{
    errors::ServiceError,
    models::{ReturnPatch, ReturnRecord, ReturnStatus},
    store::{from_document, to_document, Collection, RecordStore},
};

pub(crate) async fn load_return(
    store: &dyn RecordStore,
    id: &str,
) -> Result<ReturnRecord, ServiceError> {
    let document = store
        .get(Collection::Returns, id)
        .await
        .map_err(|e| {
            error!(return_id = %id, error = %e, "Failed to fetch return");
            ServiceError::from(e)
        })?
        .ok_or_else(|| ServiceError::NotFound(format!("Return {} not found", id)))?;
    Ok(from_document(document)?)
}

/// Refuses any transition that does not start from `expected`.
pub(crate) fn ensure_status(
    record: &ReturnRecord,
    expected: ReturnStatus,
) -> Result<(), ServiceError> {
    if record.status != expected {
        return Err(ServiceError::InvalidStatus(format!(
            "Return {} is {}, expected {}",
            record.id, record.status, expected
        )));
    }
    Ok(())
}

pub(crate) async fn write_patch(
    store: &dyn RecordStore,
    id: &str,
    patch: &ReturnPatch,
) -> Result<(), ServiceError> {
    let fields = to_document(patch)?;
    store
        .update(Collection::Returns, id, fields)
        .await
        .map_err(|e| {
            error!(return_id = %id, error = %e, "Failed to update return");
            ServiceError::from(e)
        })
}

/// Moves a return one step along the pipeline, stamping the step's date.
pub(crate) async fn advance_return(
    store: &dyn RecordStore,
    id: &str,
    target: ReturnStatus,
    on: NaiveDate,
) -> Result<ReturnRecord, ServiceError> {
    let mut record = load_return(store, id).await?;
    if !record.status.can_advance_to(target) {
        return Err(ServiceError::InvalidStatus(format!(
            "Return {} cannot move from {} to {}",
            record.id, record.status, target
        )));
    }

    write_patch(store, id, &ReturnPatch::advance(target, on)).await?;

    record.status = target;
    match target {
        ReturnStatus::Received => record.date_received = Some(on),
        ReturnStatus::Graded => record.date_graded = Some(on),
        ReturnStatus::Documented => record.date_documented = Some(on),
        ReturnStatus::Completed => record.date_completed = Some(on),
        ReturnStatus::Requested => {}
    }
    info!(return_id = %id, status = %target, "Return advanced");
    Ok(record)
}
