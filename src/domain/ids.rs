//! Identifier value objects
//!
//! Portfolio, security, and source identifiers are validated at construction
//! so the rest of the crate can treat them as well-formed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Fixed width of portfolio and security identifiers.
pub const ID_WIDTH: usize = 24;

/// Maximum length of a caller-supplied source identifier.
pub const SOURCE_ID_MAX: usize = 50;

/// Errors raised by the identifier smart constructors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidIdentifier {
    #[error("portfolio id must be exactly {ID_WIDTH} alphanumeric characters, got {0:?}")]
    Portfolio(String),

    #[error("security id must be exactly {ID_WIDTH} alphanumeric characters, got {0:?}")]
    Security(String),

    #[error("source id must be 1..={SOURCE_ID_MAX} alphanumeric characters, got {0:?}")]
    Source(String),
}

fn is_alphanumeric(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Portfolio identifier: exactly 24 characters, `[A-Za-z0-9]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct PortfolioId(String);

impl PortfolioId {
    pub fn new(value: impl Into<String>) -> Result<Self, InvalidIdentifier> {
        let value = value.into();
        if value.len() != ID_WIDTH || !is_alphanumeric(&value) {
            return Err(InvalidIdentifier::Portfolio(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for PortfolioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Security identifier: exactly 24 characters, `[A-Za-z0-9]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct SecurityId(String);

impl SecurityId {
    pub fn new(value: impl Into<String>) -> Result<Self, InvalidIdentifier> {
        let value = value.into();
        if value.len() != ID_WIDTH || !is_alphanumeric(&value) {
            return Err(InvalidIdentifier::Security(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for SecurityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller-chosen source identifier: 1..=50 characters, `[A-Za-z0-9]`.
///
/// Globally unique across all transactions (enforced by a unique index);
/// this is what makes ingestion idempotent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct SourceId(String);

impl SourceId {
    pub fn new(value: impl Into<String>) -> Result<Self, InvalidIdentifier> {
        let value = value.into();
        if value.is_empty() || value.len() > SOURCE_ID_MAX || !is_alphanumeric(&value) {
            return Err(InvalidIdentifier::Source(value));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
