//! Batch ingestion service
//!
//! Validates each item of a batch, dispatches valid items through the
//! processing engine in order, and assembles the partial-success response.

use sqlx::PgPool;
use std::time::Duration;
use thiserror::Error;
use tracing::Instrument;
use uuid::Uuid;

use crate::contracts::transaction_v1::{
    BatchSummaryV1, FailedTransactionV1, TransactionBatchResponseV1, TransactionPostV1,
    TransactionResponseV1, ValidationErrorV1,
};
use crate::services::engine::{self, EngineError};
use crate::services::retry::RetryConfig;
use crate::validation::validate_transaction_post;

/// Hard cap on items per batch.
pub const MAX_BATCH_SIZE: usize = 1000;

/// Batch-level rejections, raised before any item is processed
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("batch must contain at least one transaction")]
    Empty,

    #[error("batch exceeds {MAX_BATCH_SIZE} items: got {0}")]
    TooLarge(usize),
}

/// Process a batch of transaction DTOs.
///
/// Items are processed in the order received and reflected in that order in
/// the `successful` / `failed` arrays. Per-item failures never abort the
/// batch; `deadline` bounds each engine dispatch, and an expired item is
/// reported failed while its row (if already persisted) stays NEW.
pub async fn process_batch(
    pool: &PgPool,
    retry: &RetryConfig,
    deadline: Duration,
    items: Vec<TransactionPostV1>,
) -> Result<TransactionBatchResponseV1, BatchError> {
    if items.is_empty() {
        return Err(BatchError::Empty);
    }
    if items.len() > MAX_BATCH_SIZE {
        return Err(BatchError::TooLarge(items.len()));
    }

    let batch_id = Uuid::new_v4();
    let span = tracing::info_span!(
        "process_batch",
        batch_id = %batch_id,
        total = items.len()
    );

    async {
        let total_requested = items.len();
        let mut successful = Vec::new();
        let mut failed = Vec::new();

        for item in items {
            let new = match validate_transaction_post(&item) {
                Ok(new) => new,
                Err(errors) => {
                    failed.push(FailedTransactionV1 {
                        transaction: item,
                        errors,
                    });
                    continue;
                }
            };

            match tokio::time::timeout(deadline, engine::ingest_and_process(pool, retry, &new))
                .await
            {
                Ok(Ok(processed)) => {
                    successful.push(TransactionResponseV1::from(&processed));
                }
                Ok(Err(e)) => {
                    failed.push(FailedTransactionV1 {
                        errors: vec![engine_error_to_item(&e)],
                        transaction: item,
                    });
                }
                Err(_elapsed) => {
                    tracing::warn!(
                        source_id = %new.source_id,
                        "Deadline expired during engine dispatch; row stays NEW"
                    );
                    failed.push(FailedTransactionV1 {
                        errors: vec![ValidationErrorV1 {
                            field: "transaction".to_string(),
                            message: "request deadline exceeded; transaction will be retried"
                                .to_string(),
                            value: None,
                        }],
                        transaction: item,
                    });
                }
            }
        }

        let summary = BatchSummaryV1 {
            total_requested,
            successful: successful.len(),
            failed: failed.len(),
            success_rate: success_rate(successful.len(), total_requested),
        };

        tracing::info!(
            total = summary.total_requested,
            successful = summary.successful,
            failed = summary.failed,
            "Batch processed"
        );

        Ok(TransactionBatchResponseV1 {
            successful,
            failed,
            summary,
        })
    }
    .instrument(span)
    .await
}

fn engine_error_to_item(e: &EngineError) -> ValidationErrorV1 {
    match e {
        EngineError::DuplicateSource(source_id) => ValidationErrorV1 {
            field: "sourceId".to_string(),
            message: format!("duplicate source id: {source_id:?}"),
            value: Some(source_id.clone()),
        },
        other => ValidationErrorV1 {
            field: "transaction".to_string(),
            message: other.to_string(),
            value: None,
        },
    }
}

fn success_rate(successful: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let rate = successful as f64 / total as f64;
    (rate * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate_rounding() {
        assert_eq!(success_rate(1, 1), 1.0);
        assert_eq!(success_rate(0, 4), 0.0);
        assert_eq!(success_rate(1, 3), 0.3333);
        assert_eq!(success_rate(2, 3), 0.6667);
    }

    #[test]
    fn test_duplicate_source_maps_to_source_id_field() {
        let item = engine_error_to_item(&EngineError::DuplicateSource("SRC9".to_string()));
        assert_eq!(item.field, "sourceId");
        assert_eq!(item.value.as_deref(), Some("SRC9"));
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        // Pool is never touched for an empty batch; connect lazily.
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let result = process_batch(
            &pool,
            &RetryConfig::default(),
            Duration::from_secs(1),
            Vec::new(),
        )
        .await;
        assert_eq!(result.unwrap_err(), BatchError::Empty);
    }

    #[tokio::test]
    async fn test_oversized_batch_rejected() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        let items = vec![
            TransactionPostV1 {
                portfolio_id: "P".to_string(),
                security_id: None,
                source_id: "S".to_string(),
                transaction_type: "DEP".to_string(),
                quantity: "1".to_string(),
                price: "1".to_string(),
                transaction_date: "20250101".to_string(),
            };
            MAX_BATCH_SIZE + 1
        ];
        let result = process_batch(
            &pool,
            &RetryConfig::default(),
            Duration::from_secs(1),
            items,
        )
        .await;
        assert_eq!(result.unwrap_err(), BatchError::TooLarge(MAX_BATCH_SIZE + 1));
    }
}
