//! Transaction wire contracts (v1)
//!
//! Request payloads keep numeric and enum fields as raw strings so a bad
//! value fails item validation with a field-level error instead of failing
//! the whole batch decode. Responses use typed fields; decimals serialize as
//! strings.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::transaction::{Transaction, TransactionStatus, TransactionType, DATE_FORMAT};

/// A single transaction in a batch POST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPostV1 {
    pub portfolio_id: String,
    #[serde(default)]
    pub security_id: Option<String>,
    pub source_id: String,
    pub transaction_type: String,
    pub quantity: String,
    pub price: String,
    pub transaction_date: String,
}

/// A persisted transaction as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponseV1 {
    pub id: i64,
    pub portfolio_id: String,
    pub security_id: Option<String>,
    pub source_id: String,
    pub status: TransactionStatus,
    pub transaction_type: TransactionType,
    #[serde(with = "rust_decimal::serde::str")]
    pub quantity: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    pub transaction_date: String,
    pub reprocessing_attempts: i32,
    pub error_message: Option<String>,
    pub version: i32,
}

impl From<&Transaction> for TransactionResponseV1 {
    fn from(t: &Transaction) -> Self {
        Self {
            id: t.id,
            portfolio_id: t.portfolio_id.to_string(),
            security_id: t.security_id.as_ref().map(|s| s.to_string()),
            source_id: t.source_id.to_string(),
            status: t.status,
            transaction_type: t.transaction_type,
            quantity: t.quantity,
            price: t.price,
            transaction_date: t.transaction_date.format(DATE_FORMAT).to_string(),
            reprocessing_attempts: t.reprocessing_attempts,
            error_message: t.error_message.clone(),
            version: t.version,
        }
    }
}

/// Field-level validation error attached to a rejected batch item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationErrorV1 {
    pub field: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// A rejected batch item: the input echoed back with its errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedTransactionV1 {
    pub transaction: TransactionPostV1,
    pub errors: Vec<ValidationErrorV1>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummaryV1 {
    pub total_requested: usize,
    pub successful: usize,
    pub failed: usize,
    /// Fraction in [0, 1], rounded to 4 decimal places.
    pub success_rate: f64,
}

/// Response to `POST /transactions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionBatchResponseV1 {
    pub successful: Vec<TransactionResponseV1>,
    pub failed: Vec<FailedTransactionV1>,
    pub summary: BatchSummaryV1,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationV1 {
    pub offset: i64,
    pub limit: i64,
    pub total: i64,
}

/// Response to `GET /transactions`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionListResponseV1 {
    pub transactions: Vec<TransactionResponseV1>,
    pub pagination: PaginationV1,
}
