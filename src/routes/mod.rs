//! HTTP boundary
//!
//! Route handlers decode requests, delegate to the services, and apply the
//! status-code policy. All errors leave as the shared JSON envelope.

pub mod balances;
pub mod portfolios;
pub mod transactions;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use sqlx::PgPool;
use std::time::Duration;

use crate::contracts::error_v1::ErrorEnvelopeV1;
use crate::services::query_service::QueryError;
use crate::services::retry::RetryConfig;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub retry: RetryConfig,
    pub request_timeout: Duration,
}

/// Build the service router.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route(
            "/transactions",
            get(transactions::list_transactions).post(transactions::post_transactions),
        )
        .route("/transaction/{id}", get(transactions::get_transaction))
        .route("/balances", get(balances::list_balances))
        .route("/balance/{id}", get(balances::get_balance))
        .route("/portfolios/{id}/summary", get(portfolios::get_summary))
        .with_state(state)
}

/// Error response wrapper for proper HTTP error handling
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub envelope: ErrorEnvelopeV1,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            envelope: ErrorEnvelopeV1::new(code, message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.envelope)).into_response()
    }
}

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        match e {
            QueryError::InvalidFilter { .. } => {
                ApiError::new(StatusCode::BAD_REQUEST, "INVALID_FILTER", e.to_string())
            }
            QueryError::UnknownSortField(_) => {
                ApiError::new(StatusCode::BAD_REQUEST, "INVALID_SORT", e.to_string())
            }
            QueryError::NotFound(_) => {
                ApiError::new(StatusCode::NOT_FOUND, "NOT_FOUND", e.to_string())
            }
            QueryError::TransactionRepo(ref inner) => {
                tracing::error!(error = %inner, "Transaction query failed");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "internal server error",
                )
            }
            QueryError::BalanceRepo(ref inner) => {
                tracing::error!(error = %inner, "Balance query failed");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL",
                    "internal server error",
                )
            }
        }
    }
}
