//! Aggregation engine: attribute-value frequency counts over a snapshot
//!
//! The only observable output is aggregate counts keyed
//! `"attributeKey:attributeValue"`; individual records never leave the
//! store. Accounts that never declared an attribute are skipped for that
//! key rather than counted as a null value. Identical input snapshots and
//! stored attributes always yield identical output.

use crate::error::ExchangeError;
use crate::store::AccountStore;
use crate::types::{AggregateCounts, AttributeMap, AttributePredicate};

/// Computes frequency counts, optionally suppressing entries whose count
/// falls below a configured floor (small counts can re-identify
/// individuals).
pub struct AggregationEngine {
    min_count_threshold: Option<u64>,
}

impl AggregationEngine {
    pub fn new(min_count_threshold: Option<u64>) -> Self {
        Self { min_count_threshold }
    }

    /// Count every declared `(key, value)` pair across the given accounts.
    ///
    /// Snapshot ids missing from the store contribute nothing; order of
    /// `account_ids` is irrelevant to the result.
    pub async fn aggregate(
        &self,
        account_ids: &[String],
        store: &dyn AccountStore,
    ) -> Result<AggregateCounts, ExchangeError> {
        let mut counts = AggregateCounts::new();

        for account_id in account_ids {
            let Some(attributes) = store.get_attributes(account_id).await? else {
                continue;
            };
            for (key, value) in &attributes {
                *counts.entry(format!("{}:{}", key, value)).or_insert(0) += 1;
            }
        }

        if let Some(floor) = self.min_count_threshold {
            counts.retain(|_, count| *count >= floor);
        }

        Ok(counts)
    }
}

/// Whether an attribute map satisfies every predicate of a filter. An
/// empty filter matches all accounts.
pub fn matches_filter(attributes: &AttributeMap, filter: &[AttributePredicate]) -> bool {
    filter
        .iter()
        .all(|predicate| attributes.get(&predicate.key) == Some(&predicate.value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryAccountStore;
    use crate::types::AttributeValue;
    use std::collections::HashMap;

    fn attrs(pairs: &[(&str, AttributeValue)]) -> AttributeMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    async fn seeded_store() -> InMemoryAccountStore {
        let store = InMemoryAccountStore::new();
        store
            .register_or_update(
                "acct-a",
                attrs(&[
                    ("age", AttributeValue::Int(30)),
                    ("gender", AttributeValue::Flag(true)),
                ]),
            )
            .await
            .unwrap();
        store
            .register_or_update("acct-b", attrs(&[("age", AttributeValue::Int(30))]))
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn counts_present_pairs_and_skips_absent_attributes() {
        let store = seeded_store().await;
        let engine = AggregationEngine::new(None);

        let counts = engine
            .aggregate(&["acct-a".to_string(), "acct-b".to_string()], &store)
            .await
            .unwrap();

        let mut expected = HashMap::new();
        expected.insert("age:30".to_string(), 2);
        expected.insert("gender:true".to_string(), 1);
        assert_eq!(counts, expected);
    }

    #[tokio::test]
    async fn order_independent() {
        let store = seeded_store().await;
        let engine = AggregationEngine::new(None);

        let forward = engine
            .aggregate(&["acct-a".to_string(), "acct-b".to_string()], &store)
            .await
            .unwrap();
        let reverse = engine
            .aggregate(&["acct-b".to_string(), "acct-a".to_string()], &store)
            .await
            .unwrap();

        assert_eq!(forward, reverse);
    }

    #[tokio::test]
    async fn min_count_floor_suppresses_small_counts() {
        let store = seeded_store().await;
        let engine = AggregationEngine::new(Some(2));

        let counts = engine
            .aggregate(&["acct-a".to_string(), "acct-b".to_string()], &store)
            .await
            .unwrap();

        assert_eq!(counts.get("age:30"), Some(&2));
        assert!(!counts.contains_key("gender:true"));
    }

    #[tokio::test]
    async fn unknown_snapshot_ids_contribute_nothing() {
        let store = seeded_store().await;
        let engine = AggregationEngine::new(None);

        let counts = engine
            .aggregate(&["acct-a".to_string(), "ghost".to_string()], &store)
            .await
            .unwrap();

        assert_eq!(counts.get("age:30"), Some(&1));
    }

    #[test]
    fn empty_filter_matches_everything() {
        let attributes = attrs(&[("age", AttributeValue::Int(30))]);
        assert!(matches_filter(&attributes, &[]));
        assert!(matches_filter(&AttributeMap::new(), &[]));
    }

    #[test]
    fn filter_requires_every_predicate() {
        let attributes = attrs(&[
            ("age", AttributeValue::Int(30)),
            ("gender", AttributeValue::Flag(true)),
        ]);

        let matching = vec![
            AttributePredicate {
                key: "age".to_string(),
                value: AttributeValue::Int(30),
            },
            AttributePredicate {
                key: "gender".to_string(),
                value: AttributeValue::Flag(true),
            },
        ];
        assert!(matches_filter(&attributes, &matching));

        let mismatched = vec![
            AttributePredicate {
                key: "age".to_string(),
                value: AttributeValue::Int(30),
            },
            AttributePredicate {
                key: "location".to_string(),
                value: AttributeValue::Text("austin".to_string()),
            },
        ];
        assert!(!matches_filter(&attributes, &mismatched));
    }
}
