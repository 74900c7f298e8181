//! Balance domain model
//!
//! One row per (portfolio, security) position plus at most one cash row
//! (no security) per portfolio.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::ids::{PortfolioId, SecurityId};

/// Rule violations on balance mutation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidBalance {
    #[error("cash balance for portfolio {portfolio_id} cannot carry a short quantity ({quantity_short})")]
    ShortOnCash {
        portfolio_id: PortfolioId,
        quantity_short: Decimal,
    },
}

/// A materialized position row.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Balance {
    pub id: i64,
    pub portfolio_id: PortfolioId,
    pub security_id: Option<SecurityId>,
    pub quantity_long: Decimal,
    pub quantity_short: Decimal,
    pub last_updated: DateTime<Utc>,
    pub version: i32,
}

impl Balance {
    /// A balance with no security is the portfolio's cash balance.
    pub fn is_cash(&self) -> bool {
        self.security_id.is_none()
    }

    pub fn net_quantity(&self) -> Decimal {
        self.quantity_long - self.quantity_short
    }

    /// Apply deltas, returning a new balance with `version + 1` and a
    /// refreshed timestamp. Rejects a mutation that would leave a non-zero
    /// short quantity on a cash balance.
    pub fn apply(
        &self,
        long_delta: Decimal,
        short_delta: Decimal,
    ) -> Result<Balance, InvalidBalance> {
        let quantity_short = self.quantity_short + short_delta;
        if self.is_cash() && quantity_short != Decimal::ZERO {
            return Err(InvalidBalance::ShortOnCash {
                portfolio_id: self.portfolio_id.clone(),
                quantity_short,
            });
        }
        Ok(Balance {
            quantity_long: self.quantity_long + long_delta,
            quantity_short,
            last_updated: Utc::now(),
            version: self.version + 1,
            ..self.clone()
        })
    }
}
