use crate::{
    auth::Operator,
    commands::returns::{BatchOutcome, GradeReturnRequest, ReturnDraft},
    models::{Disposition, ReturnRecord, ReturnStatus},
    queries::return_queries::DispositionBoard,
    ApiResponse, ApiResult, AppState,
};
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
};
use serde::Deserialize;

use super::sse::snapshot_stream;

#[derive(Debug, Deserialize, Default)]
pub struct ReturnListQuery {
    /// Optional pipeline stage
    pub status: Option<ReturnStatus>,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmDocumentedRequest {
    pub ids: Vec<String>,
    /// Bucket the selection was made from
    #[serde(default)]
    pub disposition: Option<Disposition>,
}

pub async fn list_returns(
    State(state): State<AppState>,
    operator: Operator,
    Query(query): Query<ReturnListQuery>,
) -> ApiResult<Vec<ReturnRecord>> {
    let records = state
        .services
        .returns
        .list_returns(&operator, query.status)
        .await?;
    Ok(Json(ApiResponse::success(records)))
}

pub async fn get_return(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<String>,
) -> ApiResult<ReturnRecord> {
    let record = state.services.returns.get_return(&operator, &id).await?;
    Ok(Json(ApiResponse::success(record)))
}

pub async fn disposition_board(
    State(state): State<AppState>,
    operator: Operator,
) -> ApiResult<DispositionBoard> {
    let board = state.services.returns.disposition_board(&operator).await?;
    Ok(Json(ApiResponse::success(board)))
}

pub async fn stream_returns(
    State(state): State<AppState>,
    operator: Operator,
) -> Result<impl IntoResponse, crate::errors::ServiceError> {
    let live = state.services.returns.watch_returns(&operator).await?;
    Ok(snapshot_stream(live))
}

pub async fn create_return(
    State(state): State<AppState>,
    operator: Operator,
    Json(draft): Json<ReturnDraft>,
) -> ApiResult<ReturnRecord> {
    let created = state
        .services
        .returns
        .create_return(&operator, draft)
        .await?;
    Ok(Json(ApiResponse::success(created)))
}

pub async fn receive_return(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<String>,
) -> ApiResult<ReturnRecord> {
    let updated = state.services.returns.receive_return(&operator, &id).await?;
    Ok(Json(ApiResponse::success(updated)))
}

pub async fn grade_return(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<String>,
    Json(grade): Json<GradeReturnRequest>,
) -> ApiResult<ReturnRecord> {
    let updated = state
        .services
        .returns
        .grade_return(&operator, &id, grade)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

/// Always answers 200 once the batch ran; per-record failures are in the body.
pub async fn confirm_documented(
    State(state): State<AppState>,
    operator: Operator,
    Json(request): Json<ConfirmDocumentedRequest>,
) -> ApiResult<BatchOutcome> {
    let outcome = state
        .services
        .returns
        .confirm_documented(&operator, request.ids, request.disposition)
        .await?;
    let summary = outcome.summary();
    Ok(Json(ApiResponse::success_with_message(outcome, summary)))
}

pub async fn complete_return(
    State(state): State<AppState>,
    operator: Operator,
    Path(id): Path<String>,
) -> ApiResult<ReturnRecord> {
    let updated = state.services.returns.complete_return(&operator, &id).await?;
    Ok(Json(ApiResponse::success(updated)))
}
