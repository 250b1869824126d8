//! Storage adapters behind the repository ports.

pub mod in_memory;
pub mod postgres;

pub use in_memory::{InMemoryLedger, InMemoryPaymentRequests};
pub use postgres::PostgresStore;
