//! Repository for balance rows
//!
//! Balances are the concurrency-control unit: the upsert path takes a row
//! lock (`FOR UPDATE`) inside the caller's transaction, so two writers
//! touching the same (portfolio, security) pair serialize on the database.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder, Transaction as PgTransaction};
use thiserror::Error;

use crate::domain::balance::Balance;
use crate::domain::ids::{PortfolioId, SecurityId};
use crate::repos::{SortDirection, SortKey, MAX_LIMIT};

/// Errors that can occur during balance repository operations
#[derive(Debug, Error)]
pub enum BalanceRepoError {
    #[error("balance not found: {0}")]
    NotFound(i64),

    #[error("balance not found for portfolio {portfolio_id}, security {security_id:?}")]
    KeyNotFound {
        portfolio_id: String,
        security_id: Option<String>,
    },

    #[error("invalid balance state: {0}")]
    InvalidState(String),

    /// Two workers raced to create the same balance row; the loser sees the
    /// unique-index violation and should retry, at which point the row exists
    /// and the locked-update path applies.
    #[error("concurrent balance creation for portfolio {portfolio_id}, security {security_id:?}")]
    UpsertRace {
        portfolio_id: String,
        security_id: Option<String>,
    },

    #[error("invalid pagination parameters: limit={limit}, offset={offset}")]
    InvalidPagination { limit: i64, offset: i64 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

const COLUMNS: &str =
    "id, portfolio_id, security_id, quantity_long, quantity_short, last_updated, version";

/// Apply a delta to the (portfolio, security?) balance within a transaction.
///
/// Locates the row with `FOR UPDATE` so concurrent appliers serialize;
/// inserts the row with `version = 1` on first observation, otherwise adds
/// the deltas and bumps the version. Rejects any update that would leave a
/// non-zero short quantity on a cash balance.
pub async fn tx_upsert(
    tx: &mut PgTransaction<'_, Postgres>,
    portfolio_id: &PortfolioId,
    security_id: Option<&SecurityId>,
    long_delta: Decimal,
    short_delta: Decimal,
) -> Result<Balance, BalanceRepoError> {
    let existing = sqlx::query_as::<_, Balance>(&format!(
        r#"
        SELECT {COLUMNS}
        FROM balances
        WHERE portfolio_id = $1 AND security_id IS NOT DISTINCT FROM $2
        FOR UPDATE
        "#
    ))
    .bind(portfolio_id)
    .bind(security_id)
    .fetch_optional(&mut **tx)
    .await?;

    if security_id.is_none() && short_delta != Decimal::ZERO {
        return Err(BalanceRepoError::InvalidState(format!(
            "cash balance for portfolio {portfolio_id} cannot take a short delta of {short_delta}"
        )));
    }

    match existing {
        Some(current) => {
            let updated = sqlx::query_as::<_, Balance>(&format!(
                r#"
                UPDATE balances
                SET quantity_long = quantity_long + $2,
                    quantity_short = quantity_short + $3,
                    version = version + 1,
                    last_updated = NOW()
                WHERE id = $1
                RETURNING {COLUMNS}
                "#
            ))
            .bind(current.id)
            .bind(long_delta)
            .bind(short_delta)
            .fetch_one(&mut **tx)
            .await
            .map_err(classify_write_error)?;
            Ok(updated)
        }
        None => {
            let inserted = sqlx::query_as::<_, Balance>(&format!(
                r#"
                INSERT INTO balances (portfolio_id, security_id, quantity_long, quantity_short)
                VALUES ($1, $2, $3, $4)
                RETURNING {COLUMNS}
                "#
            ))
            .bind(portfolio_id)
            .bind(security_id)
            .bind(long_delta)
            .bind(short_delta)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| classify_insert_error(e, portfolio_id, security_id))?;
            Ok(inserted)
        }
    }
}

fn classify_insert_error(
    e: sqlx::Error,
    portfolio_id: &PortfolioId,
    security_id: Option<&SecurityId>,
) -> BalanceRepoError {
    if let sqlx::Error::Database(ref db_err) = e {
        match db_err.code().as_deref() {
            Some("23505") => {
                return BalanceRepoError::UpsertRace {
                    portfolio_id: portfolio_id.to_string(),
                    security_id: security_id.map(|s| s.to_string()),
                }
            }
            Some("23514") => {
                return BalanceRepoError::InvalidState(db_err.message().to_string())
            }
            _ => {}
        }
    }
    BalanceRepoError::Database(e)
}

fn classify_write_error(e: sqlx::Error) -> BalanceRepoError {
    if let sqlx::Error::Database(ref db_err) = e {
        if db_err.code().as_deref() == Some("23514") {
            return BalanceRepoError::InvalidState(db_err.message().to_string());
        }
    }
    BalanceRepoError::Database(e)
}

pub async fn get_by_id(pool: &PgPool, id: i64) -> Result<Balance, BalanceRepoError> {
    sqlx::query_as::<_, Balance>(&format!("SELECT {COLUMNS} FROM balances WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or(BalanceRepoError::NotFound(id))
}

/// Keyed lookup; `None` security selects the portfolio's cash balance.
pub async fn get_by_keys(
    pool: &PgPool,
    portfolio_id: &PortfolioId,
    security_id: Option<&SecurityId>,
) -> Result<Balance, BalanceRepoError> {
    sqlx::query_as::<_, Balance>(&format!(
        "SELECT {COLUMNS} FROM balances WHERE portfolio_id = $1 AND security_id IS NOT DISTINCT FROM $2"
    ))
    .bind(portfolio_id)
    .bind(security_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| BalanceRepoError::KeyNotFound {
        portfolio_id: portfolio_id.to_string(),
        security_id: security_id.map(|s| s.to_string()),
    })
}

/// Whitelisted sort fields for balance queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceSortField {
    PortfolioId,
    SecurityId,
    LastUpdated,
    QuantityLong,
    QuantityShort,
}

impl BalanceSortField {
    pub fn column(&self) -> &'static str {
        match self {
            BalanceSortField::PortfolioId => "portfolio_id",
            BalanceSortField::SecurityId => "security_id",
            BalanceSortField::LastUpdated => "last_updated",
            BalanceSortField::QuantityLong => "quantity_long",
            BalanceSortField::QuantityShort => "quantity_short",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "portfolio_id" => Some(Self::PortfolioId),
            "security_id" => Some(Self::SecurityId),
            "last_updated" => Some(Self::LastUpdated),
            "quantity_long" => Some(Self::QuantityLong),
            "quantity_short" => Some(Self::QuantityShort),
            _ => None,
        }
    }
}

/// Structured filter for balance queries.
///
/// `cash_only` is tri-state: `None` selects all rows, `Some(true)` cash rows
/// only, `Some(false)` security rows only. `non_zero_only = Some(true)`
/// keeps rows where either quantity is non-zero.
#[derive(Debug, Clone)]
pub struct BalanceFilter {
    pub portfolio_id: Option<String>,
    pub portfolio_ids: Vec<String>,
    pub security_id: Option<String>,
    pub security_ids: Vec<String>,
    pub cash_only: Option<bool>,
    pub non_zero_only: Option<bool>,
    pub updated_from: Option<DateTime<Utc>>,
    pub updated_to: Option<DateTime<Utc>>,
    pub sort: Vec<SortKey<BalanceSortField>>,
    pub offset: i64,
    pub limit: i64,
}

impl Default for BalanceFilter {
    fn default() -> Self {
        Self {
            portfolio_id: None,
            portfolio_ids: Vec::new(),
            security_id: None,
            security_ids: Vec::new(),
            cash_only: None,
            non_zero_only: None,
            updated_from: None,
            updated_to: None,
            sort: Vec::new(),
            offset: 0,
            limit: crate::repos::DEFAULT_LIMIT,
        }
    }
}

impl BalanceFilter {
    fn validate_paging(&self) -> Result<(), BalanceRepoError> {
        if self.limit <= 0 || self.limit > MAX_LIMIT || self.offset < 0 {
            return Err(BalanceRepoError::InvalidPagination {
                limit: self.limit,
                offset: self.offset,
            });
        }
        Ok(())
    }
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &BalanceFilter) {
    qb.push(" WHERE TRUE");
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
    match filter.cash_only {
        Some(true) => {
            qb.push(" AND security_id IS NULL");
        }
        Some(false) => {
            qb.push(" AND security_id IS NOT NULL");
        }
        None => {}
    }
    match filter.non_zero_only {
        Some(true) => {
            qb.push(" AND (quantity_long <> 0 OR quantity_short <> 0)");
        }
        Some(false) => {
            qb.push(" AND quantity_long = 0 AND quantity_short = 0");
        }
        None => {}
    }
    if let Some(from) = filter.updated_from {
        qb.push(" AND last_updated >= ").push_bind(from);
    }
    if let Some(to) = filter.updated_to {
        qb.push(" AND last_updated <= ").push_bind(to);
    }
}

fn push_order_by(qb: &mut QueryBuilder<'_, Postgres>, sort: &[SortKey<BalanceSortField>]) {
    qb.push(" ORDER BY ");
    if sort.is_empty() {
        qb.push("portfolio_id ASC, security_id ASC NULLS FIRST");
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

/// List balances matching the filter, paginated and ordered.
pub async fn list(
    pool: &PgPool,
    filter: &BalanceFilter,
) -> Result<Vec<Balance>, BalanceRepoError> {
    filter.validate_paging()?;

    let mut qb = QueryBuilder::new(format!("SELECT {COLUMNS} FROM balances"));
    push_filters(&mut qb, filter);
    push_order_by(&mut qb, &filter.sort);
    qb.push(" LIMIT ").push_bind(filter.limit);
    qb.push(" OFFSET ").push_bind(filter.offset);

    let rows = qb.build_query_as::<Balance>().fetch_all(pool).await?;
    Ok(rows)
}

/// Cardinality of the filter without pagination.
pub async fn count(pool: &PgPool, filter: &BalanceFilter) -> Result<i64, BalanceRepoError> {
    let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM balances");
    push_filters(&mut qb, filter);
    let total = qb.build_query_scalar::<i64>().fetch_one(pool).await?;
    Ok(total)
}

/// All balance rows for a portfolio (cash first, then securities), used to
/// assemble the portfolio summary.
pub async fn list_for_portfolio(
    pool: &PgPool,
    portfolio_id: &PortfolioId,
) -> Result<Vec<Balance>, BalanceRepoError> {
    let rows = sqlx::query_as::<_, Balance>(&format!(
        r#"
        SELECT {COLUMNS}
        FROM balances
        WHERE portfolio_id = $1
        ORDER BY security_id ASC NULLS FIRST
        "#
    ))
    .bind(portfolio_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
