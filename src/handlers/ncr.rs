use crate::{
    auth::Operator,
    commands::{
        ncr::{CancelOutcome, NcrForm},
        returns::ReturnDraft,
    },
    errors::ServiceError,
    models::{NcrPatch, NcrRecord, ReturnRecord},
    queries::ncr_queries::{NcrFilter, NcrRow},
    reports::render_print_view,
    services::ncr::NcrUpdate,
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::{Html, IntoResponse, Json},
};

use super::sse::snapshot_stream;

pub async fn list_ncr(
    State(state): State<AppState>,
    operator: Operator,
    Query(filter): Query<NcrFilter>,
) -> ApiResult<Vec<NcrRow>> {
    let rows = state.services.ncr.list_rows(&operator, filter).await?;
    Ok(Json(ApiResponse::success(rows)))
}

pub async fn stream_ncr(
    State(state): State<AppState>,
    operator: Operator,
) -> Result<impl IntoResponse, ServiceError> {
    let live = state.services.ncr.watch_ncrs(&operator).await?;
    Ok(snapshot_stream(live))
}

pub async fn get_ncr(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<String>,
) -> ApiResult<NcrRecord> {
    let ncr = state.services.ncr.get_ncr(&operator, &id).await?;
    Ok(Json(ApiResponse::success(ncr)))
}

pub async fn create_ncr(
    State(state): State<AppState>,
    operator: Operator,
    Json(form): Json<NcrForm>,
) -> ApiResult<NcrRecord> {
    let ncr = state.services.ncr.create_ncr(&operator, form).await?;
    Ok(Json(ApiResponse::success(ncr)))
}

pub async fn update_ncr(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<String>,
    Json(patch): Json<NcrPatch>,
) -> ApiResult<NcrUpdate> {
    let update = state.services.ncr.update_ncr(&operator, &id, patch).await?;
    Ok(Json(ApiResponse::success(update)))
}

pub async fn cancel_ncr(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<String>,
) -> ApiResult<CancelOutcome> {
    let outcome = state.services.ncr.cancel_ncr(&operator, &id).await?;
    let message = if outcome.already_canceled {
        "NCR was already canceled"
    } else {
        "NCR canceled"
    };
    Ok(Json(ApiResponse::success_with_message(
        outcome,
        message.to_string(),
    )))
}

pub async fn return_draft(
    State(state): State<AppState>,
    operator: Operator,
    Path((id, index)): Path<(String, usize)>,
) -> ApiResult<ReturnDraft> {
    let draft = state
        .services
        .ncr
        .return_draft(&operator, &id, index)
        .await?;
    Ok(Json(ApiResponse::success(draft)))
}

pub async fn create_item_return(
    State(state): State<AppState>,
    operator: Operator,
    Path((id, index)): Path<(String, usize)>,
) -> ApiResult<ReturnRecord> {
    let created = state
        .services
        .ncr
        .create_return_from_ncr(&operator, &id, index)
        .await?;
    Ok(Json(ApiResponse::success(created)))
}

pub async fn print_ncr(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<String>,
) -> Result<Html<String>, ServiceError> {
    let ncr = state.services.ncr.get_ncr(&operator, &id).await?;
    Ok(Html(render_print_view(&ncr, &state.config.company_name)))
}
