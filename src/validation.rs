//! Structural validation for transaction batch items
//!
//! Validates one wire DTO into a [`NewTransaction`], accumulating every
//! field-level error so the batch response can report them all at once.

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::contracts::transaction_v1::{TransactionPostV1, ValidationErrorV1};
use crate::domain::ids::{PortfolioId, SecurityId, SourceId};
use crate::domain::transaction::{NewTransaction, TransactionType, DATE_FORMAT};

fn field_error(field: &str, message: impl Into<String>, value: Option<&str>) -> ValidationErrorV1 {
    ValidationErrorV1 {
        field: field.to_string(),
        message: message.into(),
        value: value.map(|v| v.to_string()),
    }
}

/// Validate a batch item.
///
/// Returns the validated pre-persist transaction, or every field error found.
pub fn validate_transaction_post(
    dto: &TransactionPostV1,
) -> Result<NewTransaction, Vec<ValidationErrorV1>> {
    let mut errors = Vec::new();

    let portfolio_id = match PortfolioId::new(dto.portfolio_id.clone()) {
        Ok(id) => Some(id),
        Err(e) => {
            errors.push(field_error("portfolioId", e.to_string(), Some(&dto.portfolio_id)));
            None
        }
    };

    let security_id = match &dto.security_id {
        None => None,
        Some(raw) => match SecurityId::new(raw.clone()) {
            Ok(id) => Some(id),
            Err(e) => {
                errors.push(field_error("securityId", e.to_string(), Some(raw)));
                None
            }
        },
    };

    let source_id = match SourceId::new(dto.source_id.clone()) {
        Ok(id) => Some(id),
        Err(e) => {
            errors.push(field_error("sourceId", e.to_string(), Some(&dto.source_id)));
            None
        }
    };

    let transaction_type = match TransactionType::from_str(&dto.transaction_type) {
        Some(t) => Some(t),
        None => {
            errors.push(field_error(
                "transactionType",
                "must be one of BUY, SELL, SHORT, COVER, DEP, WD, IN, OUT",
                Some(&dto.transaction_type),
            ));
            None
        }
    };

    let quantity = match Decimal::from_str(&dto.quantity) {
        Ok(q) => Some(q),
        Err(_) => {
            errors.push(field_error("quantity", "must be a decimal number", Some(&dto.quantity)));
            None
        }
    };

    let price = match Decimal::from_str(&dto.price) {
        Ok(p) if p > Decimal::ZERO => Some(p),
        Ok(_) => {
            errors.push(field_error("price", "must be strictly positive", Some(&dto.price)));
            None
        }
        Err(_) => {
            errors.push(field_error("price", "must be a decimal number", Some(&dto.price)));
            None
        }
    };

    let transaction_date =
        match chrono::NaiveDate::parse_from_str(&dto.transaction_date, DATE_FORMAT) {
            Ok(d) => Some(d),
            Err(_) => {
                errors.push(field_error(
                    "transactionDate",
                    "must be a calendar date in YYYYMMDD format",
                    Some(&dto.transaction_date),
                ));
                None
            }
        };

    // Cash/security coherence, checked once the type itself parsed.
    if let Some(t) = transaction_type {
        if t.is_cash() {
            if dto.security_id.is_some() {
                errors.push(field_error(
                    "securityId",
                    format!("{t} is a cash transaction and must not reference a security"),
                    dto.security_id.as_deref(),
                ));
            }
            if let Some(p) = price {
                if p != Decimal::ONE {
                    errors.push(field_error(
                        "price",
                        format!("{t} transactions must have price 1"),
                        Some(&dto.price),
                    ));
                }
            }
        } else if dto.security_id.is_none() {
            errors.push(field_error(
                "securityId",
                format!("{t} transactions require a security id"),
                None,
            ));
        }
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    // No field errors means every piece parsed; the builder re-checks the
    // same composite invariants.
    match (
        portfolio_id,
        source_id,
        transaction_type,
        quantity,
        price,
        transaction_date,
    ) {
        (Some(portfolio_id), Some(source_id), Some(t), Some(quantity), Some(price), Some(date)) => {
            NewTransaction::builder()
                .portfolio_id(portfolio_id)
                .security_id(security_id)
                .source_id(source_id)
                .transaction_type(t)
                .quantity(quantity)
                .price(price)
                .transaction_date(date)
                .build()
                .map_err(|e| vec![field_error("transaction", e.to_string(), None)])
        }
        _ => Err(vec![field_error("transaction", "incomplete transaction", None)]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_buy() -> TransactionPostV1 {
        TransactionPostV1 {
            portfolio_id: "PORTFOLIO123456789012345".to_string(),
            security_id: Some("SECURITY1234567890123456".to_string()),
            source_id: "SRC001".to_string(),
            transaction_type: "BUY".to_string(),
            quantity: "100".to_string(),
            price: "50.25".to_string(),
            transaction_date: "20250115".to_string(),
        }
    }

    #[test]
    fn test_valid_item() {
        let new = validate_transaction_post(&valid_buy()).unwrap();
        assert_eq!(new.transaction_type, TransactionType::Buy);
        assert_eq!(new.quantity, Decimal::from_str("100").unwrap());
    }

    #[test]
    fn test_bad_portfolio_id() {
        let mut dto = valid_buy();
        dto.portfolio_id = "short".to_string();
        let errors = validate_transaction_post(&dto).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "portfolioId");
        assert_eq!(errors[0].value.as_deref(), Some("short"));
    }

    #[test]
    fn test_unknown_type() {
        let mut dto = valid_buy();
        dto.transaction_type = "TRANSFER".to_string();
        let errors = validate_transaction_post(&dto).unwrap_err();
        assert_eq!(errors[0].field, "transactionType");
    }

    #[test]
    fn test_cash_with_security_rejected() {
        let mut dto = valid_buy();
        dto.transaction_type = "DEP".to_string();
        dto.price = "1".to_string();
        let errors = validate_transaction_post(&dto).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "securityId"));
    }

    #[test]
    fn test_cash_price_must_be_one() {
        let mut dto = valid_buy();
        dto.transaction_type = "WD".to_string();
        dto.security_id = None;
        dto.price = "2".to_string();
        let errors = validate_transaction_post(&dto).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "price"));
    }

    #[test]
    fn test_security_required_for_trades() {
        let mut dto = valid_buy();
        dto.security_id = None;
        let errors = validate_transaction_post(&dto).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "securityId"));
    }

    #[test]
    fn test_multiple_errors_accumulate() {
        let dto = TransactionPostV1 {
            portfolio_id: "bad".to_string(),
            security_id: None,
            source_id: "".to_string(),
            transaction_type: "NOPE".to_string(),
            quantity: "abc".to_string(),
            price: "-1".to_string(),
            transaction_date: "Jan 5".to_string(),
        };
        let errors = validate_transaction_post(&dto).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        for expected in [
            "portfolioId",
            "sourceId",
            "transactionType",
            "quantity",
            "price",
            "transactionDate",
        ] {
            assert!(fields.contains(&expected), "missing error for {expected}");
        }
    }

    #[test]
    fn test_bad_date_formats() {
        for raw in ["2025-01-15", "20251315", "20250132", ""] {
            let mut dto = valid_buy();
            dto.transaction_date = raw.to_string();
            let errors = validate_transaction_post(&dto).unwrap_err();
            assert!(
                errors.iter().any(|e| e.field == "transactionDate"),
                "expected date error for {raw:?}"
            );
        }
    }
}
