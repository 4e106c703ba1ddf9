//! Settlement coordinator: exactly-once payout per query
//!
//! The first result view for a query wins the `mark_settled` transition and
//! disburses payment to every account in the query's frozen snapshot. The
//! disbursement log is the idempotency key: an account with a recorded
//! successful transfer is never paid again for the same query, so failed
//! transfers can be retried on a later view without double-issuing the ones
//! that succeeded.
//!
//! Disbursement runs inside a spawned task holding a per-query gate: a
//! caller that disconnects after the transition cannot abort in-flight
//! transfers, and concurrent viewers serialize behind the gate instead of
//! racing the log.

use crate::aggregate::AggregationEngine;
use crate::error::ExchangeError;
use crate::store::{AccountStore, DisbursementLog, QueryLedger};
use crate::types::ViewOutcome;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug)]
pub enum PaymentError {
    Http(String),
    Rejected(String),
}

impl std::fmt::Display for PaymentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentError::Http(e) => write!(f, "payment request failed: {}", e),
            PaymentError::Rejected(e) => write!(f, "payment rejected: {}", e),
        }
    }
}

impl std::error::Error for PaymentError {}

/// Fund-transfer capability. Delivery is at-least-once from the provider's
/// perspective; the coordinator dedupes through the disbursement log.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn transfer(&self, target_account_id: &str, amount: f64) -> Result<(), PaymentError>;
}

/// HTTP payment client.
pub struct HttpPaymentProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPaymentProvider {
    pub fn new(base_url: &str) -> Result<Self, PaymentError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| PaymentError::Http(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl PaymentProvider for HttpPaymentProvider {
    async fn transfer(&self, target_account_id: &str, amount: f64) -> Result<(), PaymentError> {
        let url = format!("{}/transfers", self.base_url);
        let body = serde_json::json!({
            "target_account_id": target_account_id,
            "amount": amount,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PaymentError::Http(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PaymentError::Rejected(format!(
                "provider returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// In-memory payment provider for tests and demos: records every transfer
/// and can be told to fail specific accounts.
#[derive(Default)]
pub struct RecordingPaymentProvider {
    transfers: Mutex<Vec<(String, f64)>>,
    failing: Mutex<HashSet<String>>,
}

impl RecordingPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn fail_account(&self, account_id: &str) {
        self.failing.lock().await.insert(account_id.to_string());
    }

    pub async fn clear_failures(&self) {
        self.failing.lock().await.clear();
    }

    pub async fn transfers(&self) -> Vec<(String, f64)> {
        self.transfers.lock().await.clone()
    }

    pub async fn transfer_count(&self, account_id: &str) -> usize {
        self.transfers
            .lock()
            .await
            .iter()
            .filter(|(a, _)| a == account_id)
            .count()
    }
}

#[async_trait]
impl PaymentProvider for RecordingPaymentProvider {
    async fn transfer(&self, target_account_id: &str, amount: f64) -> Result<(), PaymentError> {
        if self.failing.lock().await.contains(target_account_id) {
            return Err(PaymentError::Rejected(format!(
                "scripted failure for {}",
                target_account_id
            )));
        }
        self.transfers
            .lock()
            .await
            .push((target_account_id.to_string(), amount));
        Ok(())
    }
}

/// Drives settlement and computes the aggregate for a result view.
pub struct SettlementCoordinator {
    accounts: Arc<dyn AccountStore>,
    queries: Arc<dyn QueryLedger>,
    log: Arc<dyn DisbursementLog>,
    payments: Arc<dyn PaymentProvider>,
    engine: AggregationEngine,
    payout_per_account: f64,
    gates: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SettlementCoordinator {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        queries: Arc<dyn QueryLedger>,
        log: Arc<dyn DisbursementLog>,
        payments: Arc<dyn PaymentProvider>,
        engine: AggregationEngine,
        payout_per_account: f64,
    ) -> Self {
        Self {
            accounts,
            queries,
            log,
            payments,
            engine,
            payout_per_account,
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Settle (first view) or retry unpaid accounts (later views), then
    /// return the aggregate over the query's frozen snapshot. The `settled`
    /// flag is never reverted once set, even when transfers fail.
    pub async fn settle_and_aggregate(&self, query_id: &str) -> Result<ViewOutcome, ExchangeError> {
        let query = self
            .queries
            .get(query_id)
            .await?
            .ok_or_else(|| ExchangeError::QueryNotFound(query_id.to_string()))?;

        let settled_now = self.queries.mark_settled(query_id).await?;
        if settled_now {
            log::info!(
                "💸 settling query {} across {} accounts",
                query.query_id,
                query.snapshot.len()
            );
        }

        let gate = self.gate_for(query_id).await;
        let task = {
            let log = self.log.clone();
            let payments = self.payments.clone();
            let snapshot = query.snapshot.clone();
            let query_id = query.query_id.clone();
            let amount = self.payout_per_account;
            tokio::spawn(async move {
                let _guard = gate.lock().await;
                disburse(&query_id, &snapshot, amount, log.as_ref(), payments.as_ref()).await
            })
        };
        let failed_disbursements = task
            .await
            .map_err(|e| ExchangeError::Ledger(format!("settlement task failed: {}", e)))??;

        if !failed_disbursements.is_empty() {
            log::warn!(
                "query {}: {} transfers failed, retry-safe on next view",
                query.query_id,
                failed_disbursements.len()
            );
        }

        let counts = self
            .engine
            .aggregate(&query.snapshot, self.accounts.as_ref())
            .await?;

        Ok(ViewOutcome {
            query_id: query.query_id,
            counts,
            estimated_cost: query.estimated_cost,
            settled_now,
            failed_disbursements,
        })
    }

    async fn gate_for(&self, query_id: &str) -> Arc<Mutex<()>> {
        let mut gates = self.gates.lock().await;
        gates
            .entry(query_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Pay every snapshot account that has no recorded disbursement yet.
/// Returns the accounts whose transfer failed this round.
async fn disburse(
    query_id: &str,
    snapshot: &[String],
    amount: f64,
    log: &dyn DisbursementLog,
    payments: &dyn PaymentProvider,
) -> Result<Vec<String>, ExchangeError> {
    let already_paid = log.disbursed_accounts(query_id).await?;
    let mut failed = Vec::new();

    for account_id in snapshot {
        if already_paid.contains(account_id) {
            continue;
        }
        match payments.transfer(account_id, amount).await {
            Ok(()) => {
                log.record(query_id, account_id, amount).await?;
                log::debug!("paid {} for query {}", account_id, query_id);
            }
            Err(e) => {
                log::warn!("transfer to {} failed: {}", account_id, e);
                failed.push(account_id.clone());
            }
        }
    }

    Ok(failed)
}
