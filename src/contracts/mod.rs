pub mod balance_v1;
pub mod error_v1;
pub mod transaction_v1;
