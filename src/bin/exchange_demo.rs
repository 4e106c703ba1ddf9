//! Exchange Demo - Scripted End-to-End Run
//!
//! Registers a handful of producers under freshly generated signing keys,
//! pools their profiles, then creates and views a query twice to show the
//! exactly-once settlement behavior.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin exchange_demo
//! ```
//!
//! ## Environment Variables
//!
//! - PAYOUT_PER_ACCOUNT - Amount disbursed per snapshot account (default: 1.0)
//! - MIN_COUNT_THRESHOLD - Drop aggregate entries below this count (default: off)
//! - DISBURSEMENT_DB - SQLite path for the disbursement log (default: in-memory)
//! - RUST_LOG - Logging level (optional, default: info)

use databroker::{
    AttributeMap, AttributePredicate, AttributeValue, AuthSignature, DataExchange,
    DisbursementLog, ExchangeOptions, InMemoryAccountStore, InMemoryConsumerRegistry,
    InMemoryDisbursementLog, InMemoryQueryLedger, NewEvent, RecordingPaymentProvider,
    SqliteDisbursementLog, StaticIdentityDirectory,
};
use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use std::sync::Arc;

#[derive(Debug)]
struct DemoConfig {
    payout_per_account: f64,
    min_count_threshold: Option<u64>,
    disbursement_db: Option<String>,
}

impl DemoConfig {
    fn from_env() -> Self {
        Self {
            payout_per_account: std::env::var("PAYOUT_PER_ACCOUNT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1.0),
            min_count_threshold: std::env::var("MIN_COUNT_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok()),
            disbursement_db: std::env::var("DISBURSEMENT_DB").ok(),
        }
    }
}

fn sign_assertion(account_id: &str, signing_key: &SigningKey, block_height: u64) -> AuthSignature {
    let signature = signing_key.sign(block_height.to_string().as_bytes());
    AuthSignature {
        account_id: account_id.to_string(),
        public_key: hex::encode(signing_key.verifying_key().to_bytes()),
        block_height,
        signed_block_height: hex::encode(signature.to_bytes()),
    }
}

fn attrs(pairs: &[(&str, AttributeValue)]) -> AttributeMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    dotenv::dotenv().ok();

    let config = DemoConfig::from_env();

    log::info!("🚀 Starting exchange demo");
    log::info!("   Payout per account: {}", config.payout_per_account);
    log::info!("   Min count threshold: {:?}", config.min_count_threshold);
    log::info!(
        "   Disbursement log: {}",
        config.disbursement_db.as_deref().unwrap_or("in-memory")
    );

    let directory = Arc::new(StaticIdentityDirectory::new());
    let payments = Arc::new(RecordingPaymentProvider::new());
    let disbursements: Arc<dyn DisbursementLog> = match &config.disbursement_db {
        Some(path) => Arc::new(SqliteDisbursementLog::open(path)?),
        None => Arc::new(InMemoryDisbursementLog::new()),
    };

    let exchange = DataExchange::new(
        Arc::new(InMemoryAccountStore::new()),
        Arc::new(InMemoryQueryLedger::new()),
        Arc::new(InMemoryConsumerRegistry::new()),
        directory.clone(),
        payments.clone(),
        disbursements,
        ExchangeOptions {
            payout_per_account: config.payout_per_account,
            min_count_threshold: config.min_count_threshold,
            ..ExchangeOptions::default()
        },
    );

    // Producers contribute profiles under their own signing keys.
    let producers = [
        (
            "producer-alpha",
            attrs(&[
                ("age", AttributeValue::Int(30)),
                ("gender", AttributeValue::Flag(true)),
                ("location", AttributeValue::Text("austin".to_string())),
            ]),
        ),
        (
            "producer-beta",
            attrs(&[
                ("age", AttributeValue::Int(30)),
                ("location", AttributeValue::Text("austin".to_string())),
            ]),
        ),
        (
            "producer-gamma",
            attrs(&[("age", AttributeValue::Int(44))]),
        ),
    ];

    for (account_id, attributes) in &producers {
        let signing_key = SigningKey::generate(&mut OsRng);
        let assertion = sign_assertion(account_id, &signing_key, 1000);
        directory.authorize(account_id, &assertion.public_key).await;

        exchange
            .register_producer(&assertion, account_id, attributes.clone())
            .await?;

        let count = exchange
            .report_events(
                &assertion,
                account_id,
                vec![NewEvent {
                    event_type: "signup".to_string(),
                    data: serde_json::json!({ "source": "demo" }),
                }],
            )
            .await?;
        log::info!("📥 {} registered ({} events)", account_id, count);
    }

    // A consumer organization joins and queries the pool.
    let consumer_key = SigningKey::generate(&mut OsRng);
    let consumer = exchange
        .register_consumer(
            "acme-research",
            "contract-42",
            &hex::encode(consumer_key.verifying_key().to_bytes()),
        )
        .await?;
    let consumer_assertion = sign_assertion("acme-settlement-acct", &consumer_key, 1001);
    directory
        .authorize("acme-settlement-acct", &consumer_assertion.public_key)
        .await;

    let filter = vec![AttributePredicate {
        key: "age".to_string(),
        value: AttributeValue::Int(30),
    }];
    let query = exchange
        .create_query(&consumer_assertion, &consumer.organization_id, filter)
        .await?;
    log::info!(
        "🔍 Query {} quoted at {} over {} accounts",
        query.query_id,
        query.estimated_cost,
        query.snapshot.len()
    );

    // First view settles; producers in the snapshot get paid exactly once.
    let first = exchange
        .view_results(&consumer_assertion, &consumer.organization_id, &query.query_id)
        .await?;
    let mut entries: Vec<_> = first.counts.iter().collect();
    entries.sort();
    log::info!("📊 Aggregate (settled_now={}):", first.settled_now);
    for (key, count) in entries {
        log::info!("   {} = {}", key, count);
    }
    log::info!("💸 Transfers so far: {:?}", payments.transfers().await);

    // Second view is read-only: same aggregate, no further transfers.
    let second = exchange
        .view_results(&consumer_assertion, &consumer.organization_id, &query.query_id)
        .await?;
    log::info!(
        "✅ Second view settled_now={} (transfers still {})",
        second.settled_now,
        payments.transfers().await.len()
    );

    Ok(())
}
