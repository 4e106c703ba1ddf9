//! Query ledger: every created query, its frozen snapshot, and its
//! settlement state
//!
//! Query identifiers are drawn from a 128-bit random space and
//! existence-checked under the write lock, so creation never collides even
//! under concurrency. `mark_settled` is the linchpin of exactly-once
//! settlement: it performs the false-to-true transition atomically and
//! reports whether *this* call won it.

use crate::error::ExchangeError;
use crate::types::{current_timestamp, AttributePredicate, Query};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[async_trait]
pub trait QueryLedger: Send + Sync {
    /// Store a new query with a fresh, collision-free identifier and
    /// `settled = false`. The snapshot is taken by the caller at creation
    /// time and is never re-evaluated.
    async fn create(
        &self,
        consumer_id: &str,
        filter: Vec<AttributePredicate>,
        estimated_cost: f64,
        snapshot: Vec<String>,
    ) -> Result<Query, ExchangeError>;

    async fn get(&self, query_id: &str) -> Result<Option<Query>, ExchangeError>;

    /// Atomically transition `settled: false -> true`. Returns `true` only
    /// if this call performed the transition; `false` if the query was
    /// already settled. Errors with `QueryNotFound` for unknown ids.
    async fn mark_settled(&self, query_id: &str) -> Result<bool, ExchangeError>;
}

/// In-memory query ledger guarded by a single `RwLock`.
#[derive(Default)]
pub struct InMemoryQueryLedger {
    queries: RwLock<HashMap<String, Query>>,
}

impl InMemoryQueryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueryLedger for InMemoryQueryLedger {
    async fn create(
        &self,
        consumer_id: &str,
        filter: Vec<AttributePredicate>,
        estimated_cost: f64,
        snapshot: Vec<String>,
    ) -> Result<Query, ExchangeError> {
        let mut queries = self.queries.write().await;

        // 128 bits of entropy makes birthday collisions negligible, but the
        // ledger still refuses to reuse an id that somehow already exists.
        let query_id = loop {
            let candidate = format!("{:032x}", rand::random::<u128>());
            if !queries.contains_key(&candidate) {
                break candidate;
            }
        };

        let query = Query {
            query_id: query_id.clone(),
            consumer_id: consumer_id.to_string(),
            filter,
            estimated_cost,
            snapshot,
            settled: false,
            created_at: current_timestamp(),
        };

        queries.insert(query_id, query.clone());
        log::debug!(
            "created query {} for {} over {} accounts",
            query.query_id,
            query.consumer_id,
            query.snapshot.len()
        );
        Ok(query)
    }

    async fn get(&self, query_id: &str) -> Result<Option<Query>, ExchangeError> {
        let queries = self.queries.read().await;
        Ok(queries.get(query_id).cloned())
    }

    async fn mark_settled(&self, query_id: &str) -> Result<bool, ExchangeError> {
        let mut queries = self.queries.write().await;
        let query = queries
            .get_mut(query_id)
            .ok_or_else(|| ExchangeError::QueryNotFound(query_id.to_string()))?;

        if query.settled {
            Ok(false)
        } else {
            query.settled = true;
            Ok(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn create_assigns_unique_ids() {
        let ledger = InMemoryQueryLedger::new();
        let a = ledger.create("org-1", Vec::new(), 10.0, Vec::new()).await.unwrap();
        let b = ledger.create("org-1", Vec::new(), 10.0, Vec::new()).await.unwrap();
        assert_ne!(a.query_id, b.query_id);
        assert_eq!(a.query_id.len(), 32);
    }

    #[tokio::test]
    async fn mark_settled_reports_the_transition_exactly_once() {
        let ledger = InMemoryQueryLedger::new();
        let query = ledger.create("org-1", Vec::new(), 10.0, Vec::new()).await.unwrap();

        assert!(ledger.mark_settled(&query.query_id).await.unwrap());
        assert!(!ledger.mark_settled(&query.query_id).await.unwrap());

        let stored = ledger.get(&query.query_id).await.unwrap().unwrap();
        assert!(stored.settled);
    }

    #[tokio::test]
    async fn mark_settled_unknown_query_fails() {
        let ledger = InMemoryQueryLedger::new();
        let result = ledger.mark_settled("missing").await;
        assert!(matches!(result, Err(ExchangeError::QueryNotFound(_))));
    }

    #[tokio::test]
    async fn concurrent_mark_settled_has_a_single_winner() {
        let ledger = Arc::new(InMemoryQueryLedger::new());
        let query = ledger.create("org-1", Vec::new(), 10.0, Vec::new()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let ledger = ledger.clone();
            let query_id = query.query_id.clone();
            handles.push(tokio::spawn(
                async move { ledger.mark_settled(&query_id).await.unwrap() },
            ));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
