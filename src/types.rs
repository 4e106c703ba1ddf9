//! Core record types shared across the exchange
//!
//! Producers are keyed by an externally issued, opaque account identifier.
//! Queries freeze the set of matching accounts at creation time; settlement
//! and aggregation both run against that frozen snapshot, never against the
//! live store.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A single declared profile attribute value.
///
/// Absence of an attribute is meaningful: an account that never declared
/// `income` is skipped for that key during aggregation, it is not counted
/// as a null value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Int(i64),
    Flag(bool),
    Text(String),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Int(n) => write!(f, "{}", n),
            AttributeValue::Flag(b) => write!(f, "{}", b),
            AttributeValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Declared profile attributes, keyed by attribute name.
pub type AttributeMap = HashMap<String, AttributeValue>;

/// One key/value equality predicate of a query filter.
///
/// A query carries a set of these; an empty set means "all accounts".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributePredicate {
    pub key: String,
    pub value: AttributeValue,
}

/// A behavioral event as submitted by a producer.
///
/// The store stamps `recorded_at` on append, so callers only supply the
/// type tag and the opaque payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub event_type: String,
    pub data: serde_json::Value,
}

/// A behavioral event as stored: append-only, ordered, timestamped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_type: String,
    pub data: serde_json::Value,
    /// Unix seconds, stamped by the store on append.
    pub recorded_at: i64,
}

/// A single-use signed assertion of account ownership.
///
/// Verified per request and discarded; never persisted. The signature is an
/// ed25519 signature (hex) by `public_key` (hex, 32 bytes) over the decimal
/// ASCII rendering of `block_height`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSignature {
    pub account_id: String,
    pub public_key: String,
    pub block_height: u64,
    pub signed_block_height: String,
}

/// A created query as tracked by the query ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub query_id: String,
    /// Organization identifier of the consumer that created the query.
    pub consumer_id: String,
    pub filter: Vec<AttributePredicate>,
    /// Quoted cost; never debited by this core.
    pub estimated_cost: f64,
    /// Account identifiers matching the filter at creation time. Frozen:
    /// consumers are billed and producers paid against this set, not
    /// against the population at result-view time.
    pub snapshot: Vec<String>,
    pub settled: bool,
    pub created_at: i64,
}

/// A registered consumer organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsumerRecord {
    pub organization_id: String,
    pub name: String,
    pub contract_id: String,
    pub public_key: String,
    /// Quoted starting balance; this core never debits it.
    pub balance: f64,
    pub registered_at: i64,
}

/// Aggregate counts keyed `"attributeKey:attributeValue"`.
pub type AggregateCounts = HashMap<String, u64>;

/// Outcome of a result view: the aggregate plus settlement bookkeeping.
///
/// `settled_now` is true only for the view that performed the
/// false-to-true settlement transition. `failed_disbursements` lists
/// snapshot accounts whose transfer failed; the next view retries exactly
/// those, so a non-empty list is a degraded success rather than an error.
#[derive(Debug, Clone, Serialize)]
pub struct ViewOutcome {
    pub query_id: String,
    pub counts: AggregateCounts,
    pub estimated_cost: f64,
    pub settled_now: bool,
    pub failed_disbursements: Vec<String>,
}

/// Current Unix timestamp in seconds.
pub fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
