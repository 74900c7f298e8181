//! Common test utilities
//!
//! ## Singleton Pool Pattern
//! All DB-backed tests share a single connection pool per test binary to
//! keep connection counts bounded (see `DB_MAX_CONNECTIONS`).
//!
//! Tests are skipped when `DATABASE_URL` is not configured so the pure unit
//! suite runs without infrastructure.
#![allow(dead_code)]

use axum::body::Body;
use axum::http::{Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use std::time::Duration;
use tokio::sync::OnceCell;
use uuid::Uuid;

use portfolio_accounting_rs::db::init_pool;
use portfolio_accounting_rs::routes::{app_router, AppState};
use portfolio_accounting_rs::services::retry::RetryConfig;

/// Singleton pool instance shared across all tests in this binary
static TEST_POOL: OnceCell<Option<PgPool>> = OnceCell::const_new();

/// Get the shared test pool, or `None` when no database is configured.
///
/// Applies the migrations on first use so each test binary can run against
/// a fresh database.
pub async fn try_pool() -> Option<PgPool> {
    TEST_POOL
        .get_or_init(|| async {
            let database_url = std::env::var("DATABASE_URL").ok()?;

            if std::env::var("DB_MAX_CONNECTIONS").is_err() {
                std::env::set_var("DB_MAX_CONNECTIONS", "5");
            }

            let pool = match init_pool(&database_url).await {
                Ok(pool) => pool,
                Err(e) => {
                    eprintln!("skipping DB tests: failed to connect: {e}");
                    return None;
                }
            };

            if let Err(e) = sqlx::migrate!("./db/migrations").run(&pool).await {
                eprintln!("skipping DB tests: failed to migrate: {e}");
                return None;
            }

            Some(pool)
        })
        .await
        .clone()
}

/// Router wired the way `main` wires it, minus the health route.
pub fn app(pool: &PgPool) -> Router {
    app_router(AppState {
        pool: pool.clone(),
        retry: RetryConfig::default(),
        request_timeout: Duration::from_secs(10),
    })
}

/// Fast retry config so failure-path tests don't sleep through real backoff.
pub fn quick_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_backoff: Duration::from_millis(5),
        max_backoff: Duration::from_millis(20),
    }
}

/// Fresh 24-character alphanumeric portfolio id.
pub fn unique_portfolio_id() -> String {
    Uuid::new_v4().simple().to_string()[..24].to_string()
}

/// Fresh 24-character alphanumeric security id.
pub fn unique_security_id() -> String {
    Uuid::new_v4().simple().to_string()[..24].to_string()
}

/// Fresh source id (32 hex characters).
pub fn unique_source_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Delete all rows created for a portfolio.
pub async fn cleanup_portfolio(pool: &PgPool, portfolio_id: &str) {
    sqlx::query("DELETE FROM balances WHERE portfolio_id = $1")
        .bind(portfolio_id)
        .execute(pool)
        .await
        .ok();
    sqlx::query("DELETE FROM transactions WHERE portfolio_id = $1")
        .bind(portfolio_id)
        .execute(pool)
        .await
        .ok();
}

/// Collect a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("failed to read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("body is not valid JSON")
}

/// Build a JSON POST request for the batch endpoint.
pub fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).expect("serialize body")))
        .expect("build request")
}

/// Build a GET request.
pub fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("build request")
}

/// Batch item payload helper.
pub fn item(
    portfolio_id: &str,
    security_id: Option<&str>,
    source_id: &str,
    transaction_type: &str,
    quantity: &str,
    price: &str,
) -> serde_json::Value {
    serde_json::json!({
        "portfolioId": portfolio_id,
        "securityId": security_id,
        "sourceId": source_id,
        "transactionType": transaction_type,
        "quantity": quantity,
        "price": price,
        "transactionDate": "20250115"
    })
}
