//! Balance delta computation from transactions
//!
//! Deterministic mapping from a validated transaction to the deltas applied
//! to its security position and its portfolio cash balance. The sign
//! conventions live on [`TransactionType`]; this module only combines them
//! with quantity and price.

use rust_decimal::Decimal;

use crate::domain::transaction::TransactionType;

/// Delta applied to a (portfolio, security) position row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionDelta {
    pub long_delta: Decimal,
    pub short_delta: Decimal,
}

/// The full balance effect of a single transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionDeltas {
    /// Delta for the security position; `None` for cash transactions.
    pub security: Option<PositionDelta>,
    /// Delta for the portfolio cash balance (applied to `quantity_long`).
    pub cash_delta: Decimal,
}

/// Compute the balance deltas for a transaction.
///
/// Quantity is taken as-is (the caller owns the sign convention); price is
/// guaranteed positive by construction and is 1 for cash types, so
/// `cash_sign * quantity * price` covers DEP/WD as well as trades.
pub fn compute_deltas(
    transaction_type: TransactionType,
    quantity: Decimal,
    price: Decimal,
) -> TransactionDeltas {
    let security = if transaction_type.requires_security() {
        Some(PositionDelta {
            long_delta: Decimal::from(transaction_type.long_sign()) * quantity,
            short_delta: Decimal::from(transaction_type.short_sign()) * quantity,
        })
    } else {
        None
    };

    let cash_delta = Decimal::from(transaction_type.cash_sign()) * quantity * price;

    TransactionDeltas {
        security,
        cash_delta,
    }
}
