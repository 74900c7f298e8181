//! Transaction processing engine
//!
//! For each transaction: revalidate the persisted row, apply balance deltas,
//! and flip the status to PROC, all inside one database transaction. Balance
//! rows are locked by the upsert path, the transaction row is guarded by its
//! version, so the commit is atomic with respect to concurrent workers.

use sqlx::PgPool;
use thiserror::Error;

use crate::domain::transaction::{
    InvalidTransaction, NewTransaction, Transaction, TransactionStatus,
};
use crate::repos::balance_repo::{self, BalanceRepoError};
use crate::repos::transaction_repo::{self, TransactionRepoError};
use crate::services::deltas::compute_deltas;
use crate::services::retry::{retry_with_backoff, RetryConfig};

/// Errors surfaced by the processing engine
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(#[from] InvalidTransaction),

    #[error("duplicate source id: {0:?}")]
    DuplicateSource(String),

    #[error("transaction {id} already in terminal status {status}")]
    Terminal { id: i64, status: TransactionStatus },

    /// Another worker processed the row while we were retrying; its balance
    /// effects are already committed, ours never were.
    #[error("transaction {id} was processed by a concurrent worker")]
    Conflict { id: i64 },

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error(transparent)]
    TransactionRepo(TransactionRepoError),

    #[error(transparent)]
    BalanceRepo(BalanceRepoError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Transient database failures worth another attempt: serialization or
/// deadlock aborts (40001/40P01), connection-class errors (08xxx), pool
/// timeouts, and I/O failures.
fn is_transient_sqlx(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some("40001") | Some("40P01") => true,
            Some(code) => code.starts_with("08"),
            None => false,
        },
        _ => false,
    }
}

/// Classifier handed to the retry combinator.
pub fn is_retryable(e: &EngineError) -> bool {
    match e {
        EngineError::TransactionRepo(TransactionRepoError::OptimisticLock { .. }) => true,
        EngineError::TransactionRepo(TransactionRepoError::Database(e)) => is_transient_sqlx(e),
        EngineError::BalanceRepo(BalanceRepoError::UpsertRace { .. }) => true,
        EngineError::BalanceRepo(BalanceRepoError::Database(e)) => is_transient_sqlx(e),
        EngineError::Database(e) => is_transient_sqlx(e),
        _ => false,
    }
}

/// Persist a new transaction in status NEW, then process it.
///
/// A `source_id` collision is reported as [`EngineError::DuplicateSource`]
/// without touching any balance.
pub async fn ingest_and_process(
    pool: &PgPool,
    retry: &RetryConfig,
    new: &NewTransaction,
) -> Result<Transaction, EngineError> {
    let inserted = transaction_repo::insert(pool, new).await.map_err(|e| match e {
        TransactionRepoError::DuplicateSource(source_id) => {
            EngineError::DuplicateSource(source_id)
        }
        TransactionRepoError::ConstraintViolation(msg) => EngineError::ConstraintViolation(msg),
        other => EngineError::TransactionRepo(other),
    })?;

    tracing::info!(
        transaction_id = inserted.id,
        source_id = %inserted.source_id,
        portfolio_id = %inserted.portfolio_id,
        transaction_type = %inserted.transaction_type,
        "Transaction persisted"
    );

    process_persisted(pool, retry, &inserted).await
}

/// Process an already-persisted transaction (initial pass or reprocessing of
/// an ERROR row).
///
/// On success the returned row is in status PROC with its balance deltas
/// applied exactly once. Exhausted transient failures mark the row ERROR and
/// bump `reprocessing_attempts`; non-retryable failures mark it FATAL.
pub async fn process_persisted(
    pool: &PgPool,
    retry: &RetryConfig,
    transaction: &Transaction,
) -> Result<Transaction, EngineError> {
    let id = transaction.id;
    if transaction.status.is_terminal() {
        return Err(EngineError::Terminal {
            id,
            status: transaction.status,
        });
    }

    let result = retry_with_backoff(
        || attempt_apply(pool, id),
        retry,
        is_retryable,
        "process_transaction",
    )
    .await;

    match result {
        Ok(processed) => {
            tracing::info!(
                transaction_id = id,
                source_id = %processed.source_id,
                status = %processed.status,
                version = processed.version,
                "Transaction processed"
            );
            Ok(processed)
        }
        Err(e) if is_retryable(&e) => {
            // Retries exhausted on a transient failure. Mark ERROR unless a
            // concurrent worker already finished the row.
            match record_failure(pool, id, TransactionStatus::Error, &e).await {
                FailureOutcome::Recorded => Err(e),
                FailureOutcome::ProcessedElsewhere => Err(EngineError::Conflict { id }),
                FailureOutcome::AlreadyFatal(status) => Err(EngineError::Terminal { id, status }),
            }
        }
        Err(e @ (EngineError::Validation(_) | EngineError::ConstraintViolation(_))) => {
            match record_failure(pool, id, TransactionStatus::Fatal, &e).await {
                FailureOutcome::ProcessedElsewhere => Err(EngineError::Conflict { id }),
                _ => Err(e),
            }
        }
        Err(e) => Err(e),
    }
}

/// One attempt: one database transaction.
async fn attempt_apply(pool: &PgPool, id: i64) -> Result<Transaction, EngineError> {
    let mut tx = pool.begin().await?;

    // Re-read inside the transaction so each attempt sees the current
    // version and status.
    let current = transaction_repo::tx_get_by_id(&mut tx, id)
        .await
        .map_err(EngineError::TransactionRepo)?;

    match current.status {
        TransactionStatus::Proc => return Err(EngineError::Conflict { id }),
        TransactionStatus::Fatal => {
            return Err(EngineError::Terminal {
                id,
                status: current.status,
            })
        }
        TransactionStatus::New | TransactionStatus::Error => {}
    }

    current.check_invariants()?;

    let deltas = compute_deltas(current.transaction_type, current.quantity, current.price);

    if let (Some(security_id), Some(position)) = (&current.security_id, deltas.security) {
        balance_repo::tx_upsert(
            &mut tx,
            &current.portfolio_id,
            Some(security_id),
            position.long_delta,
            position.short_delta,
        )
        .await
        .map_err(EngineError::BalanceRepo)?;
    }

    if !deltas.cash_delta.is_zero() {
        balance_repo::tx_upsert(
            &mut tx,
            &current.portfolio_id,
            None,
            deltas.cash_delta,
            rust_decimal::Decimal::ZERO,
        )
        .await
        .map_err(EngineError::BalanceRepo)?;
    }

    let processed = transaction_repo::tx_update_status(
        &mut tx,
        id,
        TransactionStatus::Proc,
        None,
        current.version,
    )
    .await
    .map_err(|e| match e {
        TransactionRepoError::ConstraintViolation(msg) => EngineError::ConstraintViolation(msg),
        other => EngineError::TransactionRepo(other),
    })?;

    tx.commit().await?;
    Ok(processed)
}

enum FailureOutcome {
    Recorded,
    ProcessedElsewhere,
    AlreadyFatal(TransactionStatus),
}

/// Record a terminal-ish failure on the row, best effort.
///
/// ERROR transitions also bump `reprocessing_attempts` (once per ERROR
/// transition, not per intra-engine retry).
async fn record_failure(
    pool: &PgPool,
    id: i64,
    target: TransactionStatus,
    cause: &EngineError,
) -> FailureOutcome {
    let current = match transaction_repo::get_by_id(pool, id).await {
        Ok(row) => row,
        Err(e) => {
            tracing::error!(
                transaction_id = id,
                error = %e,
                "Failed to re-read transaction while recording failure"
            );
            return FailureOutcome::Recorded;
        }
    };

    match current.status {
        TransactionStatus::Proc => return FailureOutcome::ProcessedElsewhere,
        TransactionStatus::Fatal => return FailureOutcome::AlreadyFatal(current.status),
        TransactionStatus::New | TransactionStatus::Error => {}
    }

    let message = truncate_message(&cause.to_string());
    match transaction_repo::update_status(pool, id, target, Some(&message), current.version).await
    {
        Ok(updated) => {
            tracing::warn!(
                transaction_id = id,
                status = %target,
                error = %message,
                "Transaction marked failed"
            );
            if target == TransactionStatus::Error {
                if let Err(e) =
                    transaction_repo::increment_attempts(pool, id, updated.version).await
                {
                    tracing::error!(
                        transaction_id = id,
                        error = %e,
                        "Failed to increment reprocessing attempts"
                    );
                }
            }
            FailureOutcome::Recorded
        }
        Err(e) => {
            tracing::error!(
                transaction_id = id,
                error = %e,
                "Failed to record failure status"
            );
            FailureOutcome::Recorded
        }
    }
}

/// Error messages are stored in a VARCHAR(500) column.
fn truncate_message(message: &str) -> String {
    if message.len() <= 500 {
        message.to_string()
    } else {
        message.chars().take(500).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_optimistic_lock_is_retryable() {
        let e = EngineError::TransactionRepo(TransactionRepoError::OptimisticLock {
            id: 1,
            expected: 1,
            actual: 2,
        });
        assert!(is_retryable(&e));
    }

    #[test]
    fn test_upsert_race_is_retryable() {
        let e = EngineError::BalanceRepo(BalanceRepoError::UpsertRace {
            portfolio_id: "P".to_string(),
            security_id: None,
        });
        assert!(is_retryable(&e));
    }

    #[test]
    fn test_validation_is_not_retryable() {
        let e = EngineError::Validation(InvalidTransaction::MissingField("price"));
        assert!(!is_retryable(&e));
    }

    #[test]
    fn test_duplicate_source_is_not_retryable() {
        assert!(!is_retryable(&EngineError::DuplicateSource("SRC1".to_string())));
    }

    #[test]
    fn test_constraint_violation_is_not_retryable() {
        assert!(!is_retryable(&EngineError::ConstraintViolation("chk".to_string())));
    }

    #[test]
    fn test_pool_timeout_is_retryable() {
        assert!(is_retryable(&EngineError::Database(sqlx::Error::PoolTimedOut)));
    }

    #[test]
    fn test_truncate_message() {
        assert_eq!(truncate_message("short"), "short");
        let long = "x".repeat(600);
        assert_eq!(truncate_message(&long).len(), 500);
    }
}
