pub mod balance_repo;
pub mod transaction_repo;

/// Sort direction for whitelisted sort fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => " ASC",
            SortDirection::Desc => " DESC",
        }
    }
}

/// A single `(field, direction)` sort key.
///
/// `F` is a closed per-entity field enum, so the column name pushed into the
/// query is never user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey<F> {
    pub field: F,
    pub direction: SortDirection,
}

/// Hard cap on page size across all list endpoints.
pub const MAX_LIMIT: i64 = 1000;

/// Default page size when the caller does not specify one.
pub const DEFAULT_LIMIT: i64 = 50;
