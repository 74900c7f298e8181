//! Portfolio summary endpoint

use axum::extract::{Path, State};
use axum::Json;

use crate::contracts::balance_v1::PortfolioSummaryV1;
use crate::routes::{ApiError, AppState};
use crate::services::query_service;

/// Handler for GET /portfolios/{id}/summary
pub async fn get_summary(
    State(state): State<AppState>,
    Path(portfolio_id): Path<String>,
) -> Result<Json<PortfolioSummaryV1>, ApiError> {
    let response = query_service::portfolio_summary(&state.pool, &portfolio_id).await?;
    Ok(Json(response))
}
