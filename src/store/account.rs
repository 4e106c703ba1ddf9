//! Account store: declared attributes plus append-only behavioral events

use crate::error::ExchangeError;
use crate::types::{current_timestamp, AttributeMap, EventRecord, NewEvent};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Durable mapping from account identifier to profile and events.
///
/// `register_or_update` replaces the attribute map wholesale: a
/// re-registration overwrites the entire set, never a silent partial merge.
/// Appends are atomic per call; concurrent appends from the same account
/// must not lose events.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Create the account or replace its attribute map atomically.
    async fn register_or_update(
        &self,
        account_id: &str,
        attributes: AttributeMap,
    ) -> Result<(), ExchangeError>;

    /// Append events in order, stamping `recorded_at`. Returns the new
    /// total event count for the account.
    async fn append_events(
        &self,
        account_id: &str,
        events: Vec<NewEvent>,
    ) -> Result<usize, ExchangeError>;

    async fn get_attributes(&self, account_id: &str) -> Result<Option<AttributeMap>, ExchangeError>;

    async fn get_events(&self, account_id: &str) -> Result<Option<Vec<EventRecord>>, ExchangeError>;

    /// Snapshot of every known account identifier. Not a live view:
    /// registrations after the call do not appear in the returned set.
    async fn all_account_ids(&self) -> Result<Vec<String>, ExchangeError>;
}

#[derive(Debug, Clone, Default)]
struct AccountRecord {
    attributes: AttributeMap,
    events: Vec<EventRecord>,
}

/// In-memory account store guarded by a single `RwLock`.
///
/// The write lock linearizes attribute replacement and event appends; no
/// await happens while it is held.
#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: RwLock<HashMap<String, AccountRecord>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn register_or_update(
        &self,
        account_id: &str,
        attributes: AttributeMap,
    ) -> Result<(), ExchangeError> {
        let mut accounts = self.accounts.write().await;
        let record = accounts.entry(account_id.to_string()).or_default();
        record.attributes = attributes;
        log::debug!("registered account {}", account_id);
        Ok(())
    }

    async fn append_events(
        &self,
        account_id: &str,
        events: Vec<NewEvent>,
    ) -> Result<usize, ExchangeError> {
        let mut accounts = self.accounts.write().await;
        let record = accounts
            .get_mut(account_id)
            .ok_or_else(|| ExchangeError::AccountNotFound(account_id.to_string()))?;

        let recorded_at = current_timestamp();
        record.events.extend(events.into_iter().map(|e| EventRecord {
            event_type: e.event_type,
            data: e.data,
            recorded_at,
        }));

        Ok(record.events.len())
    }

    async fn get_attributes(&self, account_id: &str) -> Result<Option<AttributeMap>, ExchangeError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(account_id).map(|r| r.attributes.clone()))
    }

    async fn get_events(&self, account_id: &str) -> Result<Option<Vec<EventRecord>>, ExchangeError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(account_id).map(|r| r.events.clone()))
    }

    async fn all_account_ids(&self) -> Result<Vec<String>, ExchangeError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.keys().cloned().collect())
    }
}
