pub mod batch_service;
pub mod deltas;
pub mod engine;
pub mod query_service;
pub mod retry;
