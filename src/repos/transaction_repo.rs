//! Repository for transaction rows
//!
//! Inserts are idempotent through the unique index on `source_id`; status
//! and attempt updates are guarded by an optimistic version predicate.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction as PgTransaction};
use thiserror::Error;

use crate::domain::transaction::{NewTransaction, Transaction, TransactionStatus, TransactionType};
use crate::repos::{SortDirection, SortKey, MAX_LIMIT};

/// Errors that can occur during transaction repository operations
#[derive(Debug, Error)]
pub enum TransactionRepoError {
    #[error("transaction not found: {0}")]
    NotFound(i64),

    #[error("transaction not found for source id {0:?}")]
    SourceNotFound(String),

    #[error("duplicate source id: {0:?}")]
    DuplicateSource(String),

    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("optimistic lock failure for transaction {id}: expected version {expected}, found {actual}")]
    OptimisticLock { id: i64, expected: i32, actual: i32 },

    #[error("invalid pagination parameters: limit={limit}, offset={offset}")]
    InvalidPagination { limit: i64, offset: i64 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

const COLUMNS: &str = "id, portfolio_id, security_id, source_id, status, transaction_type, \
     quantity, price, transaction_date, reprocessing_attempts, error_message, \
     version, created_at, updated_at";

/// Map database errors onto the repository taxonomy.
///
/// 23505 is only ever the `source_id` unique index on this table; CHECK and
/// NOT NULL violations mean the row escaped domain validation.
fn classify_insert_error(e: sqlx::Error, source_id: &str) -> TransactionRepoError {
    if let sqlx::Error::Database(ref db_err) = e {
        match db_err.code().as_deref() {
            Some("23505") => {
                return TransactionRepoError::DuplicateSource(source_id.to_string())
            }
            Some("23514") | Some("23502") => {
                return TransactionRepoError::ConstraintViolation(db_err.message().to_string())
            }
            _ => {}
        }
    }
    TransactionRepoError::Database(e)
}

/// Insert a single transaction in status NEW within an open transaction.
pub async fn tx_insert(
    tx: &mut PgTransaction<'_, Postgres>,
    new: &NewTransaction,
) -> Result<Transaction, TransactionRepoError> {
    insert_with(&mut **tx, new).await
}

/// Insert a single transaction in status NEW.
///
/// Populates `id`, timestamps, and `version = 1`. A `source_id` collision
/// returns [`TransactionRepoError::DuplicateSource`] and leaves the table
/// untouched.
pub async fn insert(
    pool: &PgPool,
    new: &NewTransaction,
) -> Result<Transaction, TransactionRepoError> {
    insert_with(pool, new).await
}

async fn insert_with<'e, E>(
    executor: E,
    new: &NewTransaction,
) -> Result<Transaction, TransactionRepoError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, Transaction>(&format!(
        r#"
        INSERT INTO transactions
            (portfolio_id, security_id, source_id, status, transaction_type,
             quantity, price, transaction_date)
        VALUES ($1, $2, $3, 'NEW', $4, $5, $6, $7)
        RETURNING {COLUMNS}
        "#
    ))
    .bind(&new.portfolio_id)
    .bind(&new.security_id)
    .bind(&new.source_id)
    .bind(new.transaction_type)
    .bind(new.quantity)
    .bind(new.price)
    .bind(new.transaction_date)
    .fetch_one(executor)
    .await
    .map_err(|e| classify_insert_error(e, new.source_id.as_str()))
}

/// Insert a batch atomically: one database transaction, all-or-nothing.
///
/// If any row violates a constraint the whole batch is rejected and the
/// offending row's error is returned.
pub async fn insert_batch(
    pool: &PgPool,
    batch: &[NewTransaction],
) -> Result<Vec<Transaction>, TransactionRepoError> {
    let mut tx = pool.begin().await?;
    let mut inserted = Vec::with_capacity(batch.len());
    for new in batch {
        inserted.push(tx_insert(&mut tx, new).await?);
    }
    tx.commit().await?;
    Ok(inserted)
}

pub async fn get_by_id(pool: &PgPool, id: i64) -> Result<Transaction, TransactionRepoError> {
    sqlx::query_as::<_, Transaction>(&format!(
        "SELECT {COLUMNS} FROM transactions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?
    .ok_or(TransactionRepoError::NotFound(id))
}

/// Fetch by id within an open transaction.
pub async fn tx_get_by_id(
    tx: &mut PgTransaction<'_, Postgres>,
    id: i64,
) -> Result<Transaction, TransactionRepoError> {
    sqlx::query_as::<_, Transaction>(&format!(
        "SELECT {COLUMNS} FROM transactions WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or(TransactionRepoError::NotFound(id))
}

pub async fn get_by_source(
    pool: &PgPool,
    source_id: &str,
) -> Result<Transaction, TransactionRepoError> {
    sqlx::query_as::<_, Transaction>(&format!(
        "SELECT {COLUMNS} FROM transactions WHERE source_id = $1"
    ))
    .bind(source_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| TransactionRepoError::SourceNotFound(source_id.to_string()))
}

/// Whitelisted sort fields for transaction queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionSortField {
    PortfolioId,
    SecurityId,
    TransactionDate,
    TransactionType,
    Status,
    CreatedAt,
    Id,
}

impl TransactionSortField {
    pub fn column(&self) -> &'static str {
        match self {
            TransactionSortField::PortfolioId => "portfolio_id",
            TransactionSortField::SecurityId => "security_id",
            TransactionSortField::TransactionDate => "transaction_date",
            TransactionSortField::TransactionType => "transaction_type",
            TransactionSortField::Status => "status",
            TransactionSortField::CreatedAt => "created_at",
            TransactionSortField::Id => "id",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "portfolio_id" => Some(Self::PortfolioId),
            "security_id" => Some(Self::SecurityId),
            "transaction_date" => Some(Self::TransactionDate),
            "transaction_type" => Some(Self::TransactionType),
            "status" => Some(Self::Status),
            "created_at" => Some(Self::CreatedAt),
            "id" => Some(Self::Id),
            _ => None,
        }
    }
}

/// Structured filter for transaction queries.
///
/// Scalar fields and their collection-valued variants combine with AND; an
/// empty collection means "no constraint".
#[derive(Debug, Clone)]
pub struct TransactionFilter {
    pub id: Option<i64>,
    pub ids: Vec<i64>,
    pub portfolio_id: Option<String>,
    pub portfolio_ids: Vec<String>,
    pub security_id: Option<String>,
    pub security_ids: Vec<String>,
    pub source_id: Option<String>,
    pub status: Option<TransactionStatus>,
    pub statuses: Vec<TransactionStatus>,
    pub transaction_type: Option<TransactionType>,
    pub transaction_types: Vec<TransactionType>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub min_quantity: Option<Decimal>,
    pub max_quantity: Option<Decimal>,
    pub sort: Vec<SortKey<TransactionSortField>>,
    pub offset: i64,
    pub limit: i64,
}

impl Default for TransactionFilter {
    fn default() -> Self {
        Self {
            id: None,
            ids: Vec::new(),
            portfolio_id: None,
            portfolio_ids: Vec::new(),
            security_id: None,
            security_ids: Vec::new(),
            source_id: None,
            status: None,
            statuses: Vec::new(),
            transaction_type: None,
            transaction_types: Vec::new(),
            date_from: None,
            date_to: None,
            min_quantity: None,
            max_quantity: None,
            sort: Vec::new(),
            offset: 0,
            limit: crate::repos::DEFAULT_LIMIT,
        }
    }
}

impl TransactionFilter {
    fn validate_paging(&self) -> Result<(), TransactionRepoError> {
        if self.limit <= 0 || self.limit > MAX_LIMIT || self.offset < 0 {
            return Err(TransactionRepoError::InvalidPagination {
                limit: self.limit,
                offset: self.offset,
            });
        }
        Ok(())
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &TransactionFilter) {
    qb.push(" WHERE TRUE");
    if let Some(id) = filter.id {
        qb.push(" AND id = ").push_bind(id);
    }
    if !filter.ids.is_empty() {
        qb.push(" AND id = ANY(").push_bind(filter.ids.clone()).push(")");
    }
    if let Some(ref p) = filter.portfolio_id {
        qb.push(" AND portfolio_id = ").push_bind(p.clone());
    }
    if !filter.portfolio_ids.is_empty() {
        qb.push(" AND portfolio_id = ANY(")
            .push_bind(filter.portfolio_ids.clone())
            .push(")");
    }
    if let Some(ref s) = filter.security_id {
        qb.push(" AND security_id = ").push_bind(s.clone());
    }
    if !filter.security_ids.is_empty() {
        qb.push(" AND security_id = ANY(")
            .push_bind(filter.security_ids.clone())
            .push(")");
    }
    if let Some(ref s) = filter.source_id {
        qb.push(" AND source_id = ").push_bind(s.clone());
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if !filter.statuses.is_empty() {
        let statuses: Vec<String> = filter.statuses.iter().map(|s| s.as_str().to_string()).collect();
        qb.push(" AND status = ANY(").push_bind(statuses).push(")");
    }
    if let Some(t) = filter.transaction_type {
        qb.push(" AND transaction_type = ").push_bind(t.as_str());
    }
    if !filter.transaction_types.is_empty() {
        let types: Vec<String> = filter
            .transaction_types
            .iter()
            .map(|t| t.as_str().to_string())
            .collect();
        qb.push(" AND transaction_type = ANY(").push_bind(types).push(")");
    }
    if let Some(from) = filter.date_from {
        qb.push(" AND transaction_date >= ").push_bind(from);
    }
    if let Some(to) = filter.date_to {
        qb.push(" AND transaction_date <= ").push_bind(to);
    }
    if let Some(min) = filter.min_quantity {
        qb.push(" AND quantity >= ").push_bind(min);
    }
    if let Some(max) = filter.max_quantity {
        qb.push(" AND quantity <= ").push_bind(max);
    }
}

fn push_order_by(qb: &mut QueryBuilder<'_, Postgres>, sort: &[SortKey<TransactionSortField>]) {
    qb.push(" ORDER BY ");
    if sort.is_empty() {
        // Default sort: newest trade date first, stable by id.
        qb.push("transaction_date DESC, id ASC");
        return;
    }
    for (i, key) in sort.iter().enumerate() {
        if i > 0 {
            qb.push(", ");
        }
        qb.push(key.field.column());
        qb.push(key.direction.sql());
    }
}

/// List transactions matching the filter, paginated and ordered.
pub async fn list(
    pool: &PgPool,
    filter: &TransactionFilter,
) -> Result<Vec<Transaction>, TransactionRepoError> {
    filter.validate_paging()?;

    let mut qb = QueryBuilder::new(format!("SELECT {COLUMNS} FROM transactions"));
    push_filters(&mut qb, filter);
    push_order_by(&mut qb, &filter.sort);
    qb.push(" LIMIT ").push_bind(filter.limit);
    qb.push(" OFFSET ").push_bind(filter.offset);

    let rows = qb
        .build_query_as::<Transaction>()
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

/// Cardinality of the filter without pagination.
pub async fn count(
    pool: &PgPool,
    filter: &TransactionFilter,
) -> Result<i64, TransactionRepoError> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM transactions");
    push_filters(&mut qb, filter);
    let total = qb.build_query_scalar::<i64>().fetch_one(pool).await?;
    Ok(total)
}

/// Version-checked status update within an open transaction.
pub async fn tx_update_status(
    tx: &mut PgTransaction<'_, Postgres>,
    id: i64,
    status: TransactionStatus,
    error_message: Option<&str>,
    expected_version: i32,
) -> Result<Transaction, TransactionRepoError> {
    let updated = sqlx::query_as::<_, Transaction>(&format!(
        r#"
        UPDATE transactions
        SET status = $2, error_message = $3, version = version + 1, updated_at = NOW()
        WHERE id = $1 AND version = $4
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(status)
    .bind(error_message)
    .bind(expected_version)
    .fetch_optional(&mut **tx)
    .await?;

    match updated {
        Some(row) => Ok(row),
        None => Err(lock_failure(&mut **tx, id, expected_version).await?),
    }
}

/// Version-checked status update.
///
/// Fails with [`TransactionRepoError::OptimisticLock`] without mutating when
/// the stored version no longer matches.
pub async fn update_status(
    pool: &PgPool,
    id: i64,
    status: TransactionStatus,
    error_message: Option<&str>,
    expected_version: i32,
) -> Result<Transaction, TransactionRepoError> {
    let updated = sqlx::query_as::<_, Transaction>(&format!(
        r#"
        UPDATE transactions
        SET status = $2, error_message = $3, version = version + 1, updated_at = NOW()
        WHERE id = $1 AND version = $4
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(status)
    .bind(error_message)
    .bind(expected_version)
    .fetch_optional(pool)
    .await?;

    match updated {
        Some(row) => Ok(row),
        None => Err(lock_failure(pool, id, expected_version).await?),
    }
}

/// Atomic attempt-counter increment with version bump.
pub async fn increment_attempts(
    pool: &PgPool,
    id: i64,
    expected_version: i32,
) -> Result<Transaction, TransactionRepoError> {
    let updated = sqlx::query_as::<_, Transaction>(&format!(
        r#"
        UPDATE transactions
        SET reprocessing_attempts = reprocessing_attempts + 1,
            version = version + 1,
            updated_at = NOW()
        WHERE id = $1 AND version = $2
        RETURNING {COLUMNS}
        "#
    ))
    .bind(id)
    .bind(expected_version)
    .fetch_optional(pool)
    .await?;

    match updated {
        Some(row) => Ok(row),
        None => Err(lock_failure(pool, id, expected_version).await?),
    }
}

/// Distinguish a version mismatch from a missing row after a zero-row update.
async fn lock_failure<'e, E>(
    executor: E,
    id: i64,
    expected: i32,
) -> Result<TransactionRepoError, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    let actual = sqlx::query_scalar::<_, i32>("SELECT version FROM transactions WHERE id = $1")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    Ok(match actual {
        Some(actual) => TransactionRepoError::OptimisticLock {
            id,
            expected,
            actual,
        },
        None => TransactionRepoError::NotFound(id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_field_whitelist() {
        assert_eq!(
            TransactionSortField::parse("transaction_date"),
            Some(TransactionSortField::TransactionDate)
        );
        assert_eq!(TransactionSortField::parse("quantity"), None);
        assert_eq!(TransactionSortField::parse("source_id"), None);
        assert_eq!(TransactionSortField::parse(""), None);
    }

    #[test]
    fn test_paging_validation() {
        let mut filter = TransactionFilter::default();
        assert!(filter.validate_paging().is_ok());

        filter.limit = 0;
        assert!(matches!(
            filter.validate_paging(),
            Err(TransactionRepoError::InvalidPagination { .. })
        ));

        filter.limit = MAX_LIMIT + 1;
        assert!(filter.validate_paging().is_err());

        filter.limit = MAX_LIMIT;
        filter.offset = -1;
        assert!(filter.validate_paging().is_err());
    }

    #[test]
    fn test_filter_sql_uses_bound_parameters() {
        let filter = TransactionFilter {
            portfolio_id: Some("PORTFOLIO123456789012345".to_string()),
            statuses: vec![TransactionStatus::New, TransactionStatus::Error],
            min_quantity: Some(Decimal::ONE),
            ..Default::default()
        };
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM transactions");
        push_filters(&mut qb, &filter);
        let sql = qb.sql();
        assert!(sql.contains("portfolio_id = $1"));
        assert!(sql.contains("status = ANY($2)"));
        assert!(sql.contains("quantity >= $3"));
        // The raw value never appears in the SQL text.
        assert!(!sql.contains("PORTFOLIO123456789012345"));
    }

    #[test]
    fn test_default_order_by() {
        let mut qb = QueryBuilder::new("SELECT 1");
        push_order_by(&mut qb, &[]);
        assert!(qb.sql().ends_with("ORDER BY transaction_date DESC, id ASC"));

        let mut qb = QueryBuilder::new("SELECT 1");
        push_order_by(
            &mut qb,
            &[
                SortKey {
                    field: TransactionSortField::PortfolioId,
                    direction: SortDirection::Asc,
                },
                SortKey {
                    field: TransactionSortField::CreatedAt,
                    direction: SortDirection::Desc,
                },
            ],
        );
        assert!(qb.sql().ends_with("ORDER BY portfolio_id ASC, created_at DESC"));
    }
}
