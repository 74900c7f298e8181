//! Transaction endpoints

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use crate::contracts::transaction_v1::{
    TransactionBatchResponseV1, TransactionListResponseV1, TransactionPostV1,
    TransactionResponseV1,
};
use crate::routes::{ApiError, AppState};
use crate::services::batch_service::{self, BatchError, MAX_BATCH_SIZE};
use crate::services::query_service::{self, TransactionQueryParams};

/// Handler for GET /transactions
pub async fn list_transactions(
    State(state): State<AppState>,
    Query(params): Query<TransactionQueryParams>,
) -> Result<Json<TransactionListResponseV1>, ApiError> {
    let response = query_service::list_transactions(&state.pool, &params).await?;
    Ok(Json(response))
}

/// Handler for GET /transaction/{id}
pub async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<TransactionResponseV1>, ApiError> {
    let response = query_service::get_transaction(&state.pool, id).await?;
    Ok(Json(response))
}

/// Handler for POST /transactions (batch ingestion)
///
/// Status policy: all items succeeded -> 201, partial success -> 207,
/// nothing succeeded -> 400. An empty batch is 400 and an oversized batch is
/// 413, both before any processing.
pub async fn post_transactions(
    State(state): State<AppState>,
    Json(items): Json<Vec<TransactionPostV1>>,
) -> Result<(StatusCode, Json<TransactionBatchResponseV1>), ApiError> {
    let response = batch_service::process_batch(
        &state.pool,
        &state.retry,
        state.request_timeout,
        items,
    )
    .await
    .map_err(|e| match e {
        BatchError::Empty => {
            ApiError::new(StatusCode::BAD_REQUEST, "EMPTY_BATCH", e.to_string())
        }
        BatchError::TooLarge(_) => ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            "BATCH_TOO_LARGE",
            format!("{e}; the maximum batch size is {MAX_BATCH_SIZE}"),
        ),
    })?;

    let status = if response.summary.failed == 0 {
        StatusCode::CREATED
    } else if response.summary.successful > 0 {
        StatusCode::MULTI_STATUS
    } else {
        StatusCode::BAD_REQUEST
    };

    Ok((status, Json(response)))
}
