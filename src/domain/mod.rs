pub mod balance;
pub mod ids;
pub mod transaction;
