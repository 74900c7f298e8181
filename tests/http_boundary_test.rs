//! HTTP boundary tests
//!
//! Drive the real router with `oneshot` requests and assert the status-code
//! policy and response shapes.

mod common;

use axum::http::StatusCode;
use rust_decimal::Decimal;
use serial_test::serial;
use std::str::FromStr;
use tower::ServiceExt;

fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

/// Wire decimals are JSON strings; compare them numerically.
fn decimal(value: &serde_json::Value) -> Decimal {
    dec(value.as_str().expect("decimal fields serialize as strings"))
}

#[tokio::test]
#[serial]
async fn test_batch_all_success_returns_201() {
    let Some(pool) = common::try_pool().await else {
        eprintln!("DATABASE_URL not configured; skipping");
        return;
    };
    let app = common::app(&pool);

    let portfolio = common::unique_portfolio_id();
    let body = serde_json::json!([
        common::item(&portfolio, None, &common::unique_source_id(), "DEP", "1000", "1"),
    ]);

    let response = app
        .oneshot(common::post_json("/transactions", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let json = common::body_json(response).await;
    assert_eq!(json["summary"]["totalRequested"], 1);
    assert_eq!(json["summary"]["successful"], 1);
    assert_eq!(json["summary"]["failed"], 0);
    assert_eq!(json["summary"]["successRate"], 1.0);
    assert_eq!(json["successful"][0]["status"], "PROC");
    assert_eq!(decimal(&json["successful"][0]["quantity"]), dec("1000"));
    assert!(json["successful"][0]["id"].is_number());

    common::cleanup_portfolio(&pool, &portfolio).await;
}

#[tokio::test]
#[serial]
async fn test_batch_partial_success_returns_207() {
    let Some(pool) = common::try_pool().await else {
        eprintln!("DATABASE_URL not configured; skipping");
        return;
    };
    let app = common::app(&pool);

    let portfolio = common::unique_portfolio_id();
    let source = common::unique_source_id();
    // Two items share a source id: the first succeeds, the second is a
    // duplicate.
    let body = serde_json::json!([
        common::item(&portfolio, None, &source, "DEP", "100", "1"),
        common::item(&portfolio, None, &source, "DEP", "100", "1"),
    ]);

    let response = app
        .oneshot(common::post_json("/transactions", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::MULTI_STATUS);

    let json = common::body_json(response).await;
    assert_eq!(json["summary"]["successful"], 1);
    assert_eq!(json["summary"]["failed"], 1);
    assert_eq!(json["failed"][0]["errors"][0]["field"], "sourceId");
    assert!(json["failed"][0]["errors"][0]["message"]
        .as_str()
        .unwrap()
        .contains("duplicate"));

    common::cleanup_portfolio(&pool, &portfolio).await;
}

#[tokio::test]
#[serial]
async fn test_batch_all_invalid_returns_400() {
    let Some(pool) = common::try_pool().await else {
        eprintln!("DATABASE_URL not configured; skipping");
        return;
    };
    let app = common::app(&pool);

    let portfolio = common::unique_portfolio_id();
    // Cash transaction with a security id fails validation.
    let body = serde_json::json!([
        common::item(
            &portfolio,
            Some(&common::unique_security_id()),
            &common::unique_source_id(),
            "DEP",
            "100",
            "1"
        ),
    ]);

    let response = app
        .oneshot(common::post_json("/transactions", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = common::body_json(response).await;
    assert_eq!(json["summary"]["successful"], 0);
    assert_eq!(json["failed"][0]["errors"][0]["field"], "securityId");

    common::cleanup_portfolio(&pool, &portfolio).await;
}

#[tokio::test]
#[serial]
async fn test_empty_batch_returns_400() {
    let Some(pool) = common::try_pool().await else {
        eprintln!("DATABASE_URL not configured; skipping");
        return;
    };
    let app = common::app(&pool);

    let response = app
        .oneshot(common::post_json("/transactions", &serde_json::json!([])))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let json = common::body_json(response).await;
    assert_eq!(json["error"]["code"], "EMPTY_BATCH");
    assert!(json["error"]["timestamp"].is_string());
}

#[tokio::test]
#[serial]
async fn test_oversized_batch_returns_413() {
    let Some(pool) = common::try_pool().await else {
        eprintln!("DATABASE_URL not configured; skipping");
        return;
    };
    let app = common::app(&pool);

    let portfolio = common::unique_portfolio_id();
    let items: Vec<serde_json::Value> = (0..1001)
        .map(|i| common::item(&portfolio, None, &format!("SRC{i}"), "DEP", "1", "1"))
        .collect();

    let response = app
        .oneshot(common::post_json("/transactions", &serde_json::json!(items)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let json = common::body_json(response).await;
    assert_eq!(json["error"]["code"], "BATCH_TOO_LARGE");
}

#[tokio::test]
#[serial]
async fn test_get_transaction_by_id_and_404() {
    let Some(pool) = common::try_pool().await else {
        eprintln!("DATABASE_URL not configured; skipping");
        return;
    };
    let app = common::app(&pool);

    let portfolio = common::unique_portfolio_id();
    let body = serde_json::json!([
        common::item(&portfolio, None, &common::unique_source_id(), "DEP", "5", "1"),
    ]);
    let response = common::app(&pool)
        .oneshot(common::post_json("/transactions", &body))
        .await
        .unwrap();
    let created = common::body_json(response).await;
    let id = created["successful"][0]["id"].as_i64().unwrap();

    let response = common::app(&pool)
        .oneshot(common::get(&format!("/transaction/{id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = common::body_json(response).await;
    assert_eq!(json["id"], id);
    assert_eq!(json["portfolioId"], portfolio);

    let response = app
        .oneshot(common::get("/transaction/999999999"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = common::body_json(response).await;
    assert_eq!(json["error"]["code"], "NOT_FOUND");

    common::cleanup_portfolio(&pool, &portfolio).await;
}

#[tokio::test]
#[serial]
async fn test_list_transactions_with_filters() {
    let Some(pool) = common::try_pool().await else {
        eprintln!("DATABASE_URL not configured; skipping");
        return;
    };

    let portfolio = common::unique_portfolio_id();
    let security = common::unique_security_id();
    let body = serde_json::json!([
        common::item(&portfolio, Some(&security), &common::unique_source_id(), "BUY", "100", "50.25"),
        common::item(&portfolio, Some(&security), &common::unique_source_id(), "SELL", "30", "52"),
    ]);
    common::app(&pool)
        .oneshot(common::post_json("/transactions", &body))
        .await
        .unwrap();

    let response = common::app(&pool)
        .oneshot(common::get(&format!(
            "/transactions?portfolio_id={portfolio}&transaction_type=BUY&sortby=-id"
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = common::body_json(response).await;
    assert_eq!(json["pagination"]["total"], 1);
    assert_eq!(json["transactions"][0]["transactionType"], "BUY");
    assert_eq!(json["pagination"]["limit"], 50);

    // Unknown sort field is rejected.
    let response = common::app(&pool)
        .oneshot(common::get("/transactions?sortby=quantity"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = common::body_json(response).await;
    assert_eq!(json["error"]["code"], "INVALID_SORT");

    common::cleanup_portfolio(&pool, &portfolio).await;
}

#[tokio::test]
#[serial]
async fn test_balances_and_summary() {
    let Some(pool) = common::try_pool().await else {
        eprintln!("DATABASE_URL not configured; skipping");
        return;
    };

    let portfolio = common::unique_portfolio_id();
    let security = common::unique_security_id();
    let body = serde_json::json!([
        common::item(&portfolio, Some(&security), &common::unique_source_id(), "BUY", "100", "50.25"),
        common::item(&portfolio, Some(&security), &common::unique_source_id(), "SELL", "30", "52"),
    ]);
    common::app(&pool)
        .oneshot(common::post_json("/transactions", &body))
        .await
        .unwrap();

    let response = common::app(&pool)
        .oneshot(common::get(&format!("/balances?portfolio_id={portfolio}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = common::body_json(response).await;
    assert_eq!(json["pagination"]["total"], 2);

    let cash = json["balances"]
        .as_array()
        .unwrap()
        .iter()
        .find(|b| b["securityId"].is_null())
        .expect("cash balance present");
    let cash_id = cash["id"].as_i64().unwrap();

    let response = common::app(&pool)
        .oneshot(common::get(&format!("/balance/{cash_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = common::body_json(response).await;
    assert_eq!(decimal(&json["quantityLong"]), dec("-3465.00"));

    let response = common::app(&pool)
        .oneshot(common::get(&format!("/portfolios/{portfolio}/summary")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = common::body_json(response).await;
    assert_eq!(json["portfolioId"], portfolio);
    assert_eq!(json["securityCount"], 1);
    assert_eq!(decimal(&json["cashBalance"]), dec("-3465.00"));
    assert_eq!(decimal(&json["securities"][0]["netQuantity"]), dec("70"));

    // Unknown portfolio summary is 404.
    let response = common::app(&pool)
        .oneshot(common::get(&format!(
            "/portfolios/{}/summary",
            common::unique_portfolio_id()
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    common::cleanup_portfolio(&pool, &portfolio).await;
}
