//! Exchange service: the one-call-per-operation surface consumed by the
//! request gateway
//!
//! The gateway delivers already-parsed, typed requests; everything here
//! returns typed results. Identity verification is a mandatory
//! precondition enforced uniformly for every identity-bearing operation.
//! Producer operations additionally require the assertion's account to
//! match the acted-on account, and result views require the query to belong
//! to the presenting organization.

use crate::aggregate::{matches_filter, AggregationEngine};
use crate::config::RuntimeConfig;
use crate::error::ExchangeError;
use crate::identity::{HttpIdentityDirectory, IdentityDirectory, IdentityVerifier};
use crate::settlement::{HttpPaymentProvider, PaymentProvider, SettlementCoordinator};
use crate::store::{
    AccountStore, ConsumerRegistry, DisbursementLog, InMemoryAccountStore,
    InMemoryConsumerRegistry, InMemoryDisbursementLog, InMemoryQueryLedger, QueryLedger,
    SqliteDisbursementLog,
};
use crate::types::{
    AttributeMap, AttributePredicate, AuthSignature, ConsumerRecord, EventRecord, NewEvent, Query,
    ViewOutcome,
};
use std::sync::Arc;

/// Tunables for pricing, payout, and the aggregate count floor.
#[derive(Debug, Clone)]
pub struct ExchangeOptions {
    pub payout_per_account: f64,
    pub cost_base: f64,
    pub cost_per_account: f64,
    pub min_count_threshold: Option<u64>,
}

impl Default for ExchangeOptions {
    fn default() -> Self {
        Self {
            payout_per_account: 1.0,
            cost_base: 10.0,
            cost_per_account: 2.0,
            min_count_threshold: None,
        }
    }
}

pub struct DataExchange {
    accounts: Arc<dyn AccountStore>,
    queries: Arc<dyn QueryLedger>,
    consumers: Arc<dyn ConsumerRegistry>,
    verifier: IdentityVerifier,
    coordinator: SettlementCoordinator,
    cost_base: f64,
    cost_per_account: f64,
}

impl DataExchange {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        queries: Arc<dyn QueryLedger>,
        consumers: Arc<dyn ConsumerRegistry>,
        directory: Arc<dyn IdentityDirectory>,
        payments: Arc<dyn PaymentProvider>,
        disbursements: Arc<dyn DisbursementLog>,
        options: ExchangeOptions,
    ) -> Self {
        let coordinator = SettlementCoordinator::new(
            accounts.clone(),
            queries.clone(),
            disbursements,
            payments,
            AggregationEngine::new(options.min_count_threshold),
            options.payout_per_account,
        );

        Self {
            accounts,
            queries,
            consumers,
            verifier: IdentityVerifier::new(directory),
            coordinator,
            cost_base: options.cost_base,
            cost_per_account: options.cost_per_account,
        }
    }

    /// Wire the exchange from environment configuration: HTTP identity
    /// directory and payment capability, in-memory stores, and a SQLite
    /// disbursement log when `DISBURSEMENT_DB` is set.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let directory = Arc::new(HttpIdentityDirectory::new(&config.directory_url)?);
        let payments = Arc::new(HttpPaymentProvider::new(&config.payment_url)?);

        let disbursements: Arc<dyn DisbursementLog> = match &config.disbursement_db {
            Some(path) => Arc::new(SqliteDisbursementLog::open(path)?),
            None => Arc::new(InMemoryDisbursementLog::new()),
        };

        Ok(Self::new(
            Arc::new(InMemoryAccountStore::new()),
            Arc::new(InMemoryQueryLedger::new()),
            Arc::new(InMemoryConsumerRegistry::new()),
            directory,
            payments,
            disbursements,
            ExchangeOptions {
                payout_per_account: config.payout_per_account,
                cost_base: config.cost_base,
                cost_per_account: config.cost_per_account,
                min_count_threshold: config.min_count_threshold,
            },
        ))
    }

    /// Verify the assertion and require it to be issued for `acting_account`.
    async fn authenticate(
        &self,
        signature: &AuthSignature,
        acting_account: &str,
    ) -> Result<(), ExchangeError> {
        if signature.account_id != acting_account {
            return Err(ExchangeError::AuthenticationFailed);
        }
        if self.verifier.verify(signature).await? {
            Ok(())
        } else {
            Err(ExchangeError::AuthenticationFailed)
        }
    }

    /// Verify an assertion that stands for itself (consumer operations).
    async fn authenticate_bearer(&self, signature: &AuthSignature) -> Result<(), ExchangeError> {
        if self.verifier.verify(signature).await? {
            Ok(())
        } else {
            Err(ExchangeError::AuthenticationFailed)
        }
    }

    pub async fn register_producer(
        &self,
        signature: &AuthSignature,
        account_id: &str,
        attributes: AttributeMap,
    ) -> Result<(), ExchangeError> {
        self.authenticate(signature, account_id).await?;
        self.accounts.register_or_update(account_id, attributes).await
    }

    pub async fn report_events(
        &self,
        signature: &AuthSignature,
        account_id: &str,
        events: Vec<NewEvent>,
    ) -> Result<usize, ExchangeError> {
        self.authenticate(signature, account_id).await?;
        self.accounts.append_events(account_id, events).await
    }

    pub async fn get_producer_profile(
        &self,
        signature: &AuthSignature,
        account_id: &str,
    ) -> Result<AttributeMap, ExchangeError> {
        self.authenticate(signature, account_id).await?;
        self.accounts
            .get_attributes(account_id)
            .await?
            .ok_or_else(|| ExchangeError::AccountNotFound(account_id.to_string()))
    }

    pub async fn get_producer_events(
        &self,
        signature: &AuthSignature,
        account_id: &str,
    ) -> Result<Vec<EventRecord>, ExchangeError> {
        self.authenticate(signature, account_id).await?;
        self.accounts
            .get_events(account_id)
            .await?
            .ok_or_else(|| ExchangeError::AccountNotFound(account_id.to_string()))
    }

    pub async fn register_consumer(
        &self,
        name: &str,
        contract_id: &str,
        public_key: &str,
    ) -> Result<ConsumerRecord, ExchangeError> {
        self.consumers.register(name, contract_id, public_key).await
    }

    pub async fn get_consumer(
        &self,
        organization_id: &str,
    ) -> Result<ConsumerRecord, ExchangeError> {
        self.consumers
            .get(organization_id)
            .await?
            .ok_or_else(|| ExchangeError::ConsumerNotFound(organization_id.to_string()))
    }

    /// Create a query: freeze the set of matching accounts now and quote a
    /// cost against that set. The snapshot is never re-evaluated.
    pub async fn create_query(
        &self,
        signature: &AuthSignature,
        organization_id: &str,
        filter: Vec<AttributePredicate>,
    ) -> Result<Query, ExchangeError> {
        self.consumers
            .get(organization_id)
            .await?
            .ok_or_else(|| ExchangeError::ConsumerNotFound(organization_id.to_string()))?;
        self.authenticate_bearer(signature).await?;

        let mut snapshot = Vec::new();
        for account_id in self.accounts.all_account_ids().await? {
            if let Some(attributes) = self.accounts.get_attributes(&account_id).await? {
                if matches_filter(&attributes, &filter) {
                    snapshot.push(account_id);
                }
            }
        }
        snapshot.sort();

        let estimated_cost = self.cost_base + self.cost_per_account * snapshot.len() as f64;
        self.queries
            .create(organization_id, filter, estimated_cost, snapshot)
            .await
    }

    /// View results: triggers settlement on first access, retries unpaid
    /// accounts on later ones, and always returns the aggregate.
    pub async fn view_results(
        &self,
        signature: &AuthSignature,
        organization_id: &str,
        query_id: &str,
    ) -> Result<ViewOutcome, ExchangeError> {
        self.consumers
            .get(organization_id)
            .await?
            .ok_or_else(|| ExchangeError::ConsumerNotFound(organization_id.to_string()))?;
        self.authenticate_bearer(signature).await?;

        let query = self
            .queries
            .get(query_id)
            .await?
            .ok_or_else(|| ExchangeError::QueryNotFound(query_id.to_string()))?;
        if query.consumer_id != organization_id {
            return Err(ExchangeError::AuthenticationFailed);
        }

        self.coordinator.settle_and_aggregate(query_id).await
    }
}
