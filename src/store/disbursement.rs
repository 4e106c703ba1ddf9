//! Per-(query, account) disbursement log
//!
//! A query's `settled` flag alone cannot make retries safe: a transfer that
//! fails mid-settlement would either be skipped forever or double-issued on
//! retry. The log records each successful transfer under its
//! `(query_id, account_id)` key, which is the actual idempotency key for
//! settlement: before paying an account the coordinator checks the log, and
//! after a successful transfer it records the fact.

use crate::types::current_timestamp;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;
use tokio::sync::RwLock;

#[derive(Debug)]
pub enum LedgerError {
    Io(std::io::Error),
    Database(String),
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Io(err)
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        LedgerError::Database(err.to_string())
    }
}

impl std::fmt::Display for LedgerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerError::Io(e) => write!(f, "IO error: {}", e),
            LedgerError::Database(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for LedgerError {}

impl From<LedgerError> for crate::error::ExchangeError {
    fn from(err: LedgerError) -> Self {
        crate::error::ExchangeError::Ledger(err.to_string())
    }
}

#[async_trait]
pub trait DisbursementLog: Send + Sync {
    /// Record a successful transfer. Recording the same `(query, account)`
    /// pair twice is a no-op, not an error.
    async fn record(
        &self,
        query_id: &str,
        account_id: &str,
        amount: f64,
    ) -> Result<(), LedgerError>;

    /// The set of accounts already paid for this query.
    async fn disbursed_accounts(&self, query_id: &str) -> Result<HashSet<String>, LedgerError>;
}

/// In-memory disbursement log.
#[derive(Default)]
pub struct InMemoryDisbursementLog {
    entries: RwLock<HashMap<(String, String), f64>>,
}

impl InMemoryDisbursementLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DisbursementLog for InMemoryDisbursementLog {
    async fn record(
        &self,
        query_id: &str,
        account_id: &str,
        amount: f64,
    ) -> Result<(), LedgerError> {
        let mut entries = self.entries.write().await;
        entries
            .entry((query_id.to_string(), account_id.to_string()))
            .or_insert(amount);
        Ok(())
    }

    async fn disbursed_accounts(&self, query_id: &str) -> Result<HashSet<String>, LedgerError> {
        let entries = self.entries.read().await;
        Ok(entries
            .keys()
            .filter(|(q, _)| q == query_id)
            .map(|(_, a)| a.clone())
            .collect())
    }
}

/// SQLite-backed disbursement log (WAL mode), so settlement facts survive a
/// process restart.
pub struct SqliteDisbursementLog {
    conn: Mutex<Connection>,
}

impl SqliteDisbursementLog {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS disbursements (
                query_id TEXT NOT NULL,
                account_id TEXT NOT NULL,
                amount REAL NOT NULL,
                transferred_at INTEGER NOT NULL,
                PRIMARY KEY (query_id, account_id)
            )",
            [],
        )?;

        log::info!("✅ Disbursement log initialized with WAL mode");

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

#[async_trait]
impl DisbursementLog for SqliteDisbursementLog {
    async fn record(
        &self,
        query_id: &str,
        account_id: &str,
        amount: f64,
    ) -> Result<(), LedgerError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| LedgerError::Database("connection lock poisoned".to_string()))?;

        conn.execute(
            "INSERT OR IGNORE INTO disbursements (query_id, account_id, amount, transferred_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![query_id, account_id, amount, current_timestamp()],
        )?;
        Ok(())
    }

    async fn disbursed_accounts(&self, query_id: &str) -> Result<HashSet<String>, LedgerError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| LedgerError::Database("connection lock poisoned".to_string()))?;

        let mut stmt =
            conn.prepare("SELECT account_id FROM disbursements WHERE query_id = ?1")?;
        let rows = stmt.query_map(params![query_id], |row| row.get::<_, String>(0))?;

        let mut accounts = HashSet::new();
        for row in rows {
            accounts.insert(row?);
        }
        Ok(accounts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn in_memory_record_is_idempotent() {
        let log = InMemoryDisbursementLog::new();

        log.record("q1", "acct-1", 1.0).await.unwrap();
        log.record("q1", "acct-1", 1.0).await.unwrap();
        log.record("q1", "acct-2", 1.0).await.unwrap();
        log.record("q2", "acct-1", 1.0).await.unwrap();

        let paid = log.disbursed_accounts("q1").await.unwrap();
        assert_eq!(paid.len(), 2);
        assert!(paid.contains("acct-1"));
        assert!(paid.contains("acct-2"));
    }

    #[tokio::test]
    async fn sqlite_record_is_idempotent() {
        let dir = tempdir().unwrap();
        let log = SqliteDisbursementLog::open(dir.path().join("disbursements.db")).unwrap();

        log.record("q1", "acct-1", 1.0).await.unwrap();
        log.record("q1", "acct-1", 1.0).await.unwrap();

        let paid = log.disbursed_accounts("q1").await.unwrap();
        assert_eq!(paid.len(), 1);
    }

    #[tokio::test]
    async fn sqlite_log_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("disbursements.db");

        {
            let log = SqliteDisbursementLog::open(&path).unwrap();
            log.record("q1", "acct-1", 2.5).await.unwrap();
        }

        let log = SqliteDisbursementLog::open(&path).unwrap();
        let paid = log.disbursed_accounts("q1").await.unwrap();
        assert!(paid.contains("acct-1"));
    }

    #[tokio::test]
    async fn wal_mode_enabled() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("disbursements.db");
        let _log = SqliteDisbursementLog::open(&path).unwrap();

        let conn = Connection::open(&path).unwrap();
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode", [], |row| row.get(0))
            .unwrap();
        assert_eq!(journal_mode.to_lowercase(), "wal");
    }
}
