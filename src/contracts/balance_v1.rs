//! Balance and portfolio-summary wire contracts (v1)

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::contracts::transaction_v1::PaginationV1;
use crate::domain::balance::Balance;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponseV1 {
    pub id: i64,
    pub portfolio_id: String,
    pub security_id: Option<String>,
    #[serde(with = "rust_decimal::serde::str")]
    pub quantity_long: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub quantity_short: Decimal,
    pub last_updated: DateTime<Utc>,
    pub version: i32,
}

impl From<&Balance> for BalanceResponseV1 {
    fn from(b: &Balance) -> Self {
        Self {
            id: b.id,
            portfolio_id: b.portfolio_id.to_string(),
            security_id: b.security_id.as_ref().map(|s| s.to_string()),
            quantity_long: b.quantity_long,
            quantity_short: b.quantity_short,
            last_updated: b.last_updated,
            version: b.version,
        }
    }
}

/// Response to `GET /balances`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceListResponseV1 {
    pub balances: Vec<BalanceResponseV1>,
    pub pagination: PaginationV1,
}

/// A security position inside a portfolio summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPositionV1 {
    pub security_id: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub quantity_long: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub quantity_short: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub net_quantity: Decimal,
    pub last_updated: DateTime<Utc>,
}

/// Response to `GET /portfolios/{id}/summary`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioSummaryV1 {
    pub portfolio_id: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub cash_balance: Decimal,
    pub security_count: usize,
    pub last_updated: DateTime<Utc>,
    pub securities: Vec<SecurityPositionV1>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_balance_response_shape() {
        let response = BalanceResponseV1 {
            id: 3,
            portfolio_id: "PORTFOLIO123456789012345".to_string(),
            security_id: None,
            quantity_long: Decimal::from_str("750").unwrap(),
            quantity_short: Decimal::ZERO,
            last_updated: Utc::now(),
            version: 3,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["quantityLong"], "750");
        assert_eq!(value["quantityShort"], "0");
        assert!(value["securityId"].is_null());
        // RFC3339 timestamp
        assert!(value["lastUpdated"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_summary_shape() {
        let summary = PortfolioSummaryV1 {
            portfolio_id: "PORTFOLIO123456789012345".to_string(),
            cash_balance: Decimal::from_str("-3465.00").unwrap(),
            security_count: 1,
            last_updated: Utc::now(),
            securities: vec![SecurityPositionV1 {
                security_id: "SECURITY1234567890123456".to_string(),
                quantity_long: Decimal::from_str("70").unwrap(),
                quantity_short: Decimal::ZERO,
                net_quantity: Decimal::from_str("70").unwrap(),
                last_updated: Utc::now(),
            }],
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["cashBalance"], "-3465.00");
        assert_eq!(value["securityCount"], 1);
        assert_eq!(value["securities"][0]["netQuantity"], "70");
    }
}
