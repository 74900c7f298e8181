//! Balance endpoints

use axum::extract::{Path, Query, State};
use axum::Json;

use crate::contracts::balance_v1::{BalanceListResponseV1, BalanceResponseV1};
use crate::routes::{ApiError, AppState};
use crate::services::query_service::{self, BalanceQueryParams};

/// Handler for GET /balances
pub async fn list_balances(
    State(state): State<AppState>,
    Query(params): Query<BalanceQueryParams>,
) -> Result<Json<BalanceListResponseV1>, ApiError> {
    let response = query_service::list_balances(&state.pool, &params).await?;
    Ok(Json(response))
}

/// Handler for GET /balance/{id}
pub async fn get_balance(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<BalanceResponseV1>, ApiError> {
    let response = query_service::get_balance(&state.pool, id).await?;
    Ok(Json(response))
}
