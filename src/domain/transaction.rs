//! Transaction domain model
//!
//! A transaction is append-only once persisted; only its status, error
//! message, attempt counter, and version evolve. The type enum is the single
//! source of truth for balance delta signs.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::ids::{PortfolioId, SecurityId, SourceId};

/// Wire/date format for transaction dates.
pub const DATE_FORMAT: &str = "%Y%m%d";

/// The eight supported transaction types.
///
/// Sign predicates below define how each type moves the long, short, and
/// cash quantities; the delta calculator reads them directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum TransactionType {
    Buy,
    Sell,
    Short,
    Cover,
    Dep,
    Wd,
    In,
    Out,
}

impl TransactionType {
    pub const ALL: [TransactionType; 8] = [
        TransactionType::Buy,
        TransactionType::Sell,
        TransactionType::Short,
        TransactionType::Cover,
        TransactionType::Dep,
        TransactionType::Wd,
        TransactionType::In,
        TransactionType::Out,
    ];

    /// Cash movements (DEP, WD) carry no security and trade at unit price.
    pub fn is_cash(&self) -> bool {
        matches!(self, TransactionType::Dep | TransactionType::Wd)
    }

    /// Every non-cash type must reference a security.
    pub fn requires_security(&self) -> bool {
        !self.is_cash()
    }

    /// Sign applied to the security long quantity.
    pub fn long_sign(&self) -> i32 {
        match self {
            TransactionType::Buy | TransactionType::In => 1,
            TransactionType::Sell | TransactionType::Out => -1,
            _ => 0,
        }
    }

    /// Sign applied to the security short quantity.
    pub fn short_sign(&self) -> i32 {
        match self {
            TransactionType::Short => 1,
            TransactionType::Cover => -1,
            _ => 0,
        }
    }

    /// Sign applied to the portfolio cash quantity (notional = quantity * price).
    pub fn cash_sign(&self) -> i32 {
        match self {
            TransactionType::Sell | TransactionType::Short | TransactionType::Dep => 1,
            TransactionType::Buy | TransactionType::Cover | TransactionType::Wd => -1,
            TransactionType::In | TransactionType::Out => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Buy => "BUY",
            TransactionType::Sell => "SELL",
            TransactionType::Short => "SHORT",
            TransactionType::Cover => "COVER",
            TransactionType::Dep => "DEP",
            TransactionType::Wd => "WD",
            TransactionType::In => "IN",
            TransactionType::Out => "OUT",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == value)
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Processing status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum TransactionStatus {
    New,
    Proc,
    Error,
    Fatal,
}

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 4] = [
        TransactionStatus::New,
        TransactionStatus::Proc,
        TransactionStatus::Error,
        TransactionStatus::Fatal,
    ];

    /// PROC (applied) and FATAL (permanently rejected) accept no further
    /// transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Proc | TransactionStatus::Fatal)
    }

    /// Allowed transitions: NEW -> {PROC, ERROR, FATAL},
    /// ERROR -> {PROC, ERROR, FATAL}.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        match self {
            TransactionStatus::New | TransactionStatus::Error => {
                next != TransactionStatus::New
            }
            TransactionStatus::Proc | TransactionStatus::Fatal => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::New => "NEW",
            TransactionStatus::Proc => "PROC",
            TransactionStatus::Error => "ERROR",
            TransactionStatus::Fatal => "FATAL",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.as_str() == value)
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Attempted status transition out of a terminal state (or back to NEW).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("illegal status transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: TransactionStatus,
    pub to: TransactionStatus,
}

/// Composite-invariant failures raised by the builder
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidTransaction {
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("transaction date must be YYYYMMDD, got {0:?}")]
    BadDate(String),

    #[error("price must be strictly positive, got {0}")]
    NonPositivePrice(Decimal),

    #[error("cash transaction type {0} must not reference a security")]
    CashWithSecurity(TransactionType),

    #[error("cash transaction type {0} must have price 1, got {1}")]
    CashPriceNotOne(TransactionType, Decimal),

    #[error("transaction type {0} requires a security id")]
    SecurityRequired(TransactionType),
}

/// A validated transaction that has not been persisted yet.
///
/// Construct via [`NewTransaction::builder`]; the builder is the only way to
/// obtain one, so every value of this type satisfies the composite
/// invariants (cash/security coherence, unit price for cash, positive price).
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub portfolio_id: PortfolioId,
    pub security_id: Option<SecurityId>,
    pub source_id: SourceId,
    pub transaction_type: TransactionType,
    pub quantity: Decimal,
    pub price: Decimal,
    pub transaction_date: NaiveDate,
}

impl NewTransaction {
    pub fn builder() -> TransactionBuilder {
        TransactionBuilder::default()
    }
}

/// Builder for [`NewTransaction`]
#[derive(Debug, Default, Clone)]
pub struct TransactionBuilder {
    portfolio_id: Option<PortfolioId>,
    security_id: Option<SecurityId>,
    source_id: Option<SourceId>,
    transaction_type: Option<TransactionType>,
    quantity: Option<Decimal>,
    price: Option<Decimal>,
    transaction_date: Option<NaiveDate>,
    bad_date: Option<String>,
}

impl TransactionBuilder {
    pub fn portfolio_id(mut self, id: PortfolioId) -> Self {
        self.portfolio_id = Some(id);
        self
    }

    pub fn security_id(mut self, id: Option<SecurityId>) -> Self {
        self.security_id = id;
        self
    }

    pub fn source_id(mut self, id: SourceId) -> Self {
        self.source_id = Some(id);
        self
    }

    pub fn transaction_type(mut self, t: TransactionType) -> Self {
        self.transaction_type = Some(t);
        self
    }

    pub fn quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    pub fn transaction_date(mut self, date: NaiveDate) -> Self {
        self.transaction_date = Some(date);
        self
    }

    /// Parse a `YYYYMMDD` wire date. A parse failure is deferred to [`build`]
    /// so callers can chain unconditionally.
    ///
    /// [`build`]: TransactionBuilder::build
    pub fn transaction_date_yyyymmdd(mut self, raw: &str) -> Self {
        match NaiveDate::parse_from_str(raw, DATE_FORMAT) {
            Ok(date) => {
                self.transaction_date = Some(date);
                self.bad_date = None;
            }
            Err(_) => {
                self.transaction_date = None;
                self.bad_date = Some(raw.to_string());
            }
        }
        self
    }

    pub fn build(self) -> Result<NewTransaction, InvalidTransaction> {
        if let Some(raw) = self.bad_date {
            return Err(InvalidTransaction::BadDate(raw));
        }
        let portfolio_id = self
            .portfolio_id
            .ok_or(InvalidTransaction::MissingField("portfolio_id"))?;
        let source_id = self
            .source_id
            .ok_or(InvalidTransaction::MissingField("source_id"))?;
        let transaction_type = self
            .transaction_type
            .ok_or(InvalidTransaction::MissingField("transaction_type"))?;
        let quantity = self
            .quantity
            .ok_or(InvalidTransaction::MissingField("quantity"))?;
        let price = self
            .price
            .ok_or(InvalidTransaction::MissingField("price"))?;
        let transaction_date = self
            .transaction_date
            .ok_or(InvalidTransaction::MissingField("transaction_date"))?;

        if price <= Decimal::ZERO {
            return Err(InvalidTransaction::NonPositivePrice(price));
        }

        if transaction_type.is_cash() {
            if self.security_id.is_some() {
                return Err(InvalidTransaction::CashWithSecurity(transaction_type));
            }
            if price != Decimal::ONE {
                return Err(InvalidTransaction::CashPriceNotOne(transaction_type, price));
            }
        } else if self.security_id.is_none() {
            return Err(InvalidTransaction::SecurityRequired(transaction_type));
        }

        Ok(NewTransaction {
            portfolio_id,
            security_id: self.security_id,
            source_id,
            transaction_type,
            quantity,
            price,
            transaction_date,
        })
    }
}

/// A persisted transaction row.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct Transaction {
    pub id: i64,
    pub portfolio_id: PortfolioId,
    pub security_id: Option<SecurityId>,
    pub source_id: SourceId,
    pub status: TransactionStatus,
    pub transaction_type: TransactionType,
    pub quantity: Decimal,
    pub price: Decimal,
    pub transaction_date: NaiveDate,
    pub reprocessing_attempts: i32,
    pub error_message: Option<String>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// Return a copy in the requested status.
    ///
    /// Callers never write `status` directly; the repository bumps `version`
    /// when the change is persisted.
    pub fn with_status(
        &self,
        next: TransactionStatus,
        error_message: Option<String>,
    ) -> Result<Transaction, InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        Ok(Transaction {
            status: next,
            error_message,
            updated_at: Utc::now(),
            ..self.clone()
        })
    }

    /// Re-check the composite invariants against a persisted row.
    ///
    /// The engine runs this before applying balances; a row that fails here
    /// indicates corruption upstream of the engine and is marked FATAL.
    pub fn check_invariants(&self) -> Result<(), InvalidTransaction> {
        if self.price <= Decimal::ZERO {
            return Err(InvalidTransaction::NonPositivePrice(self.price));
        }
        if self.transaction_type.is_cash() {
            if self.security_id.is_some() {
                return Err(InvalidTransaction::CashWithSecurity(self.transaction_type));
            }
            if self.price != Decimal::ONE {
                return Err(InvalidTransaction::CashPriceNotOne(
                    self.transaction_type,
                    self.price,
                ));
            }
        } else if self.security_id.is_none() {
            return Err(InvalidTransaction::SecurityRequired(self.transaction_type));
        }
        Ok(())
    }
}
