//! Consumer registry: organizations that create queries and view results

use crate::error::ExchangeError;
use crate::types::{current_timestamp, ConsumerRecord};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Quoted starting balance attached to a registration receipt. This core
/// never debits it.
pub const STARTING_BALANCE: f64 = 100.0;

#[async_trait]
pub trait ConsumerRegistry: Send + Sync {
    /// Register an organization and issue its identifier.
    async fn register(
        &self,
        name: &str,
        contract_id: &str,
        public_key: &str,
    ) -> Result<ConsumerRecord, ExchangeError>;

    async fn get(&self, organization_id: &str) -> Result<Option<ConsumerRecord>, ExchangeError>;
}

/// In-memory consumer registry.
#[derive(Default)]
pub struct InMemoryConsumerRegistry {
    consumers: RwLock<HashMap<String, ConsumerRecord>>,
}

impl InMemoryConsumerRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConsumerRegistry for InMemoryConsumerRegistry {
    async fn register(
        &self,
        name: &str,
        contract_id: &str,
        public_key: &str,
    ) -> Result<ConsumerRecord, ExchangeError> {
        let mut consumers = self.consumers.write().await;

        let organization_id = loop {
            let candidate = format!("{}-{:08x}", name, rand::random::<u32>());
            if !consumers.contains_key(&candidate) {
                break candidate;
            }
        };

        let record = ConsumerRecord {
            organization_id: organization_id.clone(),
            name: name.to_string(),
            contract_id: contract_id.to_string(),
            public_key: public_key.to_string(),
            balance: STARTING_BALANCE,
            registered_at: current_timestamp(),
        };

        consumers.insert(organization_id, record.clone());
        log::info!("registered consumer {}", record.organization_id);
        Ok(record)
    }

    async fn get(&self, organization_id: &str) -> Result<Option<ConsumerRecord>, ExchangeError> {
        let consumers = self.consumers.read().await;
        Ok(consumers.get(organization_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_then_get() {
        let registry = InMemoryConsumerRegistry::new();
        let record = registry.register("acme", "contract-9", "aabbcc").await.unwrap();

        assert!(record.organization_id.starts_with("acme-"));
        assert_eq!(record.balance, STARTING_BALANCE);

        let fetched = registry.get(&record.organization_id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "acme");
        assert_eq!(fetched.contract_id, "contract-9");
    }

    #[tokio::test]
    async fn get_unknown_returns_none() {
        let registry = InMemoryConsumerRegistry::new();
        assert!(registry.get("nobody-00000000").await.unwrap().is_none());
    }
}
