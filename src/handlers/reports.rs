use crate::{
    auth::Operator,
    errors::ServiceError,
    queries::ncr_queries::NcrFilter,
    reports::{export_filename, ncr_csv, CSV_CONTENT_TYPE},
    AppState,
};
use axum::{
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use tracing::info;

/// NCR spreadsheet export, one line per item, same filter as the list.
pub async fn export_ncr_csv(
    State(state): State<AppState>,
    operator: Operator,
    Query(filter): Query<NcrFilter>,
) -> Result<Response, ServiceError> {
    let rows = state.services.ncr.export_rows(&operator, filter).await?;
    let filename = export_filename(state.clock.today());
    info!(rows = rows.len(), filename = %filename, operator = %operator.name, "NCR export generated");

    let disposition = format!("attachment; filename=\"{}\"", filename);
    Ok((
        [
            (header::CONTENT_TYPE, CSV_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        ncr_csv(&rows),
    )
        .into_response())
}
