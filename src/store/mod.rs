//! Store layer: the only shared mutable state in the exchange
//!
//! Each store owns its records exclusively and is reached through a trait
//! seam, so a durable backend can be substituted without touching callers.
//! The in-memory implementations guard their maps with `tokio::sync::RwLock`
//! and never hold a lock across an await of anything that suspends.

pub mod account;
pub mod consumer;
pub mod disbursement;
pub mod query;

pub use account::{AccountStore, InMemoryAccountStore};
pub use consumer::{ConsumerRegistry, InMemoryConsumerRegistry};
pub use disbursement::{
    DisbursementLog, InMemoryDisbursementLog, LedgerError, SqliteDisbursementLog,
};
pub use query::{InMemoryQueryLedger, QueryLedger};
