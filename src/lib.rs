//! Brokered data-exchange core
//!
//! Producers contribute profile attributes and behavioral events under a
//! pseudonymous account identity; consumers run aggregate queries over the
//! pooled data; the first result view settles payment to every contributing
//! producer exactly once.
//!
//! # Architecture
//!
//! ```text
//! Request Gateway (external) → DataExchange
//!     ↓
//! IdentityVerifier (ed25519 + IdentityDirectory capability)
//!     ↓
//! AccountStore / QueryLedger / ConsumerRegistry
//!     ↓
//! SettlementCoordinator (PaymentProvider capability + DisbursementLog)
//!     ↓
//! AggregationEngine → ViewOutcome
//! ```
//!
//! HTTP routing and request parsing live outside this crate; the gateway
//! hands in typed requests and serializes typed results back out. The two
//! network-facing concerns (key lookup and fund transfer) are capability
//! traits with HTTP implementations and in-memory stand-ins for tests.

#[cfg(test)]
mod tests;

pub mod aggregate;
pub mod config;
pub mod error;
pub mod exchange;
pub mod identity;
pub mod settlement;
pub mod store;
pub mod types;

pub use aggregate::AggregationEngine;
pub use config::{ConfigError, RuntimeConfig};
pub use error::ExchangeError;
pub use exchange::{DataExchange, ExchangeOptions};
pub use identity::{HttpIdentityDirectory, IdentityDirectory, IdentityVerifier, StaticIdentityDirectory};
pub use settlement::{HttpPaymentProvider, PaymentProvider, RecordingPaymentProvider, SettlementCoordinator};
pub use store::{
    AccountStore, ConsumerRegistry, DisbursementLog, InMemoryAccountStore,
    InMemoryConsumerRegistry, InMemoryDisbursementLog, InMemoryQueryLedger, QueryLedger,
    SqliteDisbursementLog,
};
pub use types::{
    AggregateCounts, AttributeMap, AttributePredicate, AttributeValue, AuthSignature,
    ConsumerRecord, EventRecord, NewEvent, Query, ViewOutcome,
};
