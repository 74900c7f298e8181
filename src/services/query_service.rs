//! Query surface over transactions, balances, and portfolio summaries
//!
//! Parses raw query parameters into structured repository filters, enforcing
//! the sort-field whitelists and pagination caps, and maps rows onto wire
//! DTOs.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::PgPool;
use std::str::FromStr;
use thiserror::Error;

use crate::contracts::balance_v1::{
    BalanceListResponseV1, BalanceResponseV1, PortfolioSummaryV1, SecurityPositionV1,
};
use crate::contracts::transaction_v1::{
    PaginationV1, TransactionListResponseV1, TransactionResponseV1,
};
use crate::domain::ids::PortfolioId;
use crate::domain::transaction::{TransactionStatus, TransactionType, DATE_FORMAT};
use crate::repos::balance_repo::{self, BalanceFilter, BalanceRepoError, BalanceSortField};
use crate::repos::transaction_repo::{
    self, TransactionFilter, TransactionRepoError, TransactionSortField,
};
use crate::repos::{SortDirection, SortKey, DEFAULT_LIMIT, MAX_LIMIT};

/// Errors raised while composing or running queries
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("invalid filter parameter {field}: {message}")]
    InvalidFilter { field: &'static str, message: String },

    #[error("unknown sort field: {0:?}")]
    UnknownSortField(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    TransactionRepo(TransactionRepoError),

    #[error(transparent)]
    BalanceRepo(BalanceRepoError),
}

impl From<TransactionRepoError> for QueryError {
    fn from(e: TransactionRepoError) -> Self {
        match e {
            TransactionRepoError::NotFound(_) | TransactionRepoError::SourceNotFound(_) => {
                QueryError::NotFound(e.to_string())
            }
            TransactionRepoError::InvalidPagination { .. } => QueryError::InvalidFilter {
                field: "limit",
                message: e.to_string(),
            },
            other => QueryError::TransactionRepo(other),
        }
    }
}

impl From<BalanceRepoError> for QueryError {
    fn from(e: BalanceRepoError) -> Self {
        match e {
            BalanceRepoError::NotFound(_) | BalanceRepoError::KeyNotFound { .. } => {
                QueryError::NotFound(e.to_string())
            }
            BalanceRepoError::InvalidPagination { .. } => QueryError::InvalidFilter {
                field: "limit",
                message: e.to_string(),
            },
            other => QueryError::BalanceRepo(other),
        }
    }
}

/// Raw query parameters for `GET /transactions` (lower_snake_case on the wire).
#[derive(Debug, Default, Clone, Deserialize)]
pub struct TransactionQueryParams {
    pub id: Option<i64>,
    pub ids: Option<String>,
    pub portfolio_id: Option<String>,
    pub portfolio_ids: Option<String>,
    pub security_id: Option<String>,
    pub security_ids: Option<String>,
    pub source_id: Option<String>,
    pub status: Option<String>,
    pub statuses: Option<String>,
    pub transaction_type: Option<String>,
    pub transaction_types: Option<String>,
    pub date_from: Option<String>,
    pub date_to: Option<String>,
    pub min_quantity: Option<String>,
    pub max_quantity: Option<String>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
    pub sortby: Option<String>,
}

/// Raw query parameters for `GET /balances`.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct BalanceQueryParams {
    pub portfolio_id: Option<String>,
    pub portfolio_ids: Option<String>,
    pub security_id: Option<String>,
    pub security_ids: Option<String>,
    pub cash_only: Option<bool>,
    pub non_zero_only: Option<bool>,
    pub updated_from: Option<DateTime<Utc>>,
    pub updated_to: Option<DateTime<Utc>>,
    pub offset: Option<i64>,
    pub limit: Option<i64>,
    pub sortby: Option<String>,
}

fn parse_paging(offset: Option<i64>, limit: Option<i64>) -> Result<(i64, i64), QueryError> {
    let offset = offset.unwrap_or(0);
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    if offset < 0 {
        return Err(QueryError::InvalidFilter {
            field: "offset",
            message: format!("must be non-negative, got {offset}"),
        });
    }
    if limit <= 0 || limit > MAX_LIMIT {
        return Err(QueryError::InvalidFilter {
            field: "limit",
            message: format!("must be between 1 and {MAX_LIMIT}, got {limit}"),
        });
    }
    Ok((offset, limit))
}

fn split_csv(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Parse `sortby=field1,-field2` into whitelisted sort keys. A leading `-`
/// selects descending order.
fn parse_sort<F>(
    raw: &str,
    parse_field: impl Fn(&str) -> Option<F>,
) -> Result<Vec<SortKey<F>>, QueryError> {
    split_csv(raw)
        .map(|token| {
            let (name, direction) = match token.strip_prefix('-') {
                Some(rest) => (rest, SortDirection::Desc),
                None => (token, SortDirection::Asc),
            };
            parse_field(name)
                .map(|field| SortKey { field, direction })
                .ok_or_else(|| QueryError::UnknownSortField(name.to_string()))
        })
        .collect()
}

fn parse_date(field: &'static str, raw: &str) -> Result<NaiveDate, QueryError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|_| QueryError::InvalidFilter {
        field,
        message: format!("must be a calendar date in YYYYMMDD format, got {raw:?}"),
    })
}

fn parse_decimal(field: &'static str, raw: &str) -> Result<Decimal, QueryError> {
    Decimal::from_str(raw).map_err(|_| QueryError::InvalidFilter {
        field,
        message: format!("must be a decimal number, got {raw:?}"),
    })
}

/// Compose a repository filter from raw transaction query parameters.
pub fn build_transaction_filter(
    params: &TransactionQueryParams,
) -> Result<TransactionFilter, QueryError> {
    let (offset, limit) = parse_paging(params.offset, params.limit)?;

    let mut filter = TransactionFilter {
        id: params.id,
        portfolio_id: params.portfolio_id.clone(),
        security_id: params.security_id.clone(),
        source_id: params.source_id.clone(),
        offset,
        limit,
        ..Default::default()
    };

    if let Some(raw) = &params.ids {
        filter.ids = split_csv(raw)
            .map(|s| {
                s.parse::<i64>().map_err(|_| QueryError::InvalidFilter {
                    field: "ids",
                    message: format!("must be a comma-separated list of integers, got {s:?}"),
                })
            })
            .collect::<Result<_, _>>()?;
    }
    if let Some(raw) = &params.portfolio_ids {
        filter.portfolio_ids = split_csv(raw).map(str::to_string).collect();
    }
    if let Some(raw) = &params.security_ids {
        filter.security_ids = split_csv(raw).map(str::to_string).collect();
    }
    if let Some(raw) = &params.status {
        filter.status = Some(TransactionStatus::from_str(raw).ok_or_else(|| {
            QueryError::InvalidFilter {
                field: "status",
                message: format!("unknown status {raw:?}"),
            }
        })?);
    }
    if let Some(raw) = &params.statuses {
        filter.statuses = split_csv(raw)
            .map(|s| {
                TransactionStatus::from_str(s).ok_or_else(|| QueryError::InvalidFilter {
                    field: "statuses",
                    message: format!("unknown status {s:?}"),
                })
            })
            .collect::<Result<_, _>>()?;
    }
    if let Some(raw) = &params.transaction_type {
        filter.transaction_type = Some(TransactionType::from_str(raw).ok_or_else(|| {
            QueryError::InvalidFilter {
                field: "transaction_type",
                message: format!("unknown transaction type {raw:?}"),
            }
        })?);
    }
    if let Some(raw) = &params.transaction_types {
        filter.transaction_types = split_csv(raw)
            .map(|s| {
                TransactionType::from_str(s).ok_or_else(|| QueryError::InvalidFilter {
                    field: "transaction_types",
                    message: format!("unknown transaction type {s:?}"),
                })
            })
            .collect::<Result<_, _>>()?;
    }
    if let Some(raw) = &params.date_from {
        filter.date_from = Some(parse_date("date_from", raw)?);
    }
    if let Some(raw) = &params.date_to {
        filter.date_to = Some(parse_date("date_to", raw)?);
    }
    if let Some(raw) = &params.min_quantity {
        filter.min_quantity = Some(parse_decimal("min_quantity", raw)?);
    }
    if let Some(raw) = &params.max_quantity {
        filter.max_quantity = Some(parse_decimal("max_quantity", raw)?);
    }
    if let Some(raw) = &params.sortby {
        filter.sort = parse_sort(raw, TransactionSortField::parse)?;
    }

    Ok(filter)
}

/// Compose a repository filter from raw balance query parameters.
pub fn build_balance_filter(params: &BalanceQueryParams) -> Result<BalanceFilter, QueryError> {
    let (offset, limit) = parse_paging(params.offset, params.limit)?;

    let mut filter = BalanceFilter {
        portfolio_id: params.portfolio_id.clone(),
        security_id: params.security_id.clone(),
        cash_only: params.cash_only,
        non_zero_only: params.non_zero_only,
        updated_from: params.updated_from,
        updated_to: params.updated_to,
        offset,
        limit,
        ..Default::default()
    };

    if let Some(raw) = &params.portfolio_ids {
        filter.portfolio_ids = split_csv(raw).map(str::to_string).collect();
    }
    if let Some(raw) = &params.security_ids {
        filter.security_ids = split_csv(raw).map(str::to_string).collect();
    }
    if let Some(raw) = &params.sortby {
        filter.sort = parse_sort(raw, BalanceSortField::parse)?;
    }

    Ok(filter)
}

/// `GET /transactions`
pub async fn list_transactions(
    pool: &PgPool,
    params: &TransactionQueryParams,
) -> Result<TransactionListResponseV1, QueryError> {
    let filter = build_transaction_filter(params)?;
    let rows = transaction_repo::list(pool, &filter).await?;
    let total = transaction_repo::count(pool, &filter).await?;
    Ok(TransactionListResponseV1 {
        transactions: rows.iter().map(TransactionResponseV1::from).collect(),
        pagination: PaginationV1 {
            offset: filter.offset,
            limit: filter.limit,
            total,
        },
    })
}

/// `GET /transaction/{id}`
pub async fn get_transaction(
    pool: &PgPool,
    id: i64,
) -> Result<TransactionResponseV1, QueryError> {
    let row = transaction_repo::get_by_id(pool, id).await?;
    Ok(TransactionResponseV1::from(&row))
}

/// `GET /balances`
pub async fn list_balances(
    pool: &PgPool,
    params: &BalanceQueryParams,
) -> Result<BalanceListResponseV1, QueryError> {
    let filter = build_balance_filter(params)?;
    let rows = balance_repo::list(pool, &filter).await?;
    let total = balance_repo::count(pool, &filter).await?;
    Ok(BalanceListResponseV1 {
        balances: rows.iter().map(BalanceResponseV1::from).collect(),
        pagination: PaginationV1 {
            offset: filter.offset,
            limit: filter.limit,
            total,
        },
    })
}

/// `GET /balance/{id}`
pub async fn get_balance(pool: &PgPool, id: i64) -> Result<BalanceResponseV1, QueryError> {
    let row = balance_repo::get_by_id(pool, id).await?;
    Ok(BalanceResponseV1::from(&row))
}

/// `GET /portfolios/{id}/summary`
///
/// A malformed portfolio id cannot match any row, so it reports NotFound
/// like an unknown one.
pub async fn portfolio_summary(
    pool: &PgPool,
    raw_portfolio_id: &str,
) -> Result<PortfolioSummaryV1, QueryError> {
    let portfolio_id = PortfolioId::new(raw_portfolio_id)
        .map_err(|_| QueryError::NotFound(format!("portfolio not found: {raw_portfolio_id:?}")))?;

    let rows = balance_repo::list_for_portfolio(pool, &portfolio_id).await?;
    if rows.is_empty() {
        return Err(QueryError::NotFound(format!(
            "portfolio not found: {raw_portfolio_id:?}"
        )));
    }

    let cash_balance = rows
        .iter()
        .find(|b| b.is_cash())
        .map(|b| b.quantity_long)
        .unwrap_or(Decimal::ZERO);

    let securities: Vec<SecurityPositionV1> = rows
        .iter()
        .filter_map(|b| {
            b.security_id.as_ref().map(|security_id| SecurityPositionV1 {
                security_id: security_id.to_string(),
                quantity_long: b.quantity_long,
                quantity_short: b.quantity_short,
                net_quantity: b.net_quantity(),
                last_updated: b.last_updated,
            })
        })
        .collect();

    let last_updated = rows
        .iter()
        .map(|b| b.last_updated)
        .max()
        .unwrap_or_else(Utc::now);

    Ok(PortfolioSummaryV1 {
        portfolio_id: portfolio_id.to_string(),
        cash_balance,
        security_count: securities.len(),
        last_updated,
        securities,
    })
}
