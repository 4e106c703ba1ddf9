//! End-to-end properties exercised through the full exchange surface.

use crate::exchange::{DataExchange, ExchangeOptions};
use crate::identity::{signed_assertion, StaticIdentityDirectory};
use crate::settlement::RecordingPaymentProvider;
use crate::store::{
    InMemoryAccountStore, InMemoryConsumerRegistry, InMemoryDisbursementLog, InMemoryQueryLedger,
};
use crate::types::{AttributeMap, AttributeValue, AuthSignature, NewEvent};
use std::sync::Arc;

struct Fixture {
    exchange: Arc<DataExchange>,
    directory: Arc<StaticIdentityDirectory>,
    payments: Arc<RecordingPaymentProvider>,
}

fn fixture() -> Fixture {
    let directory = Arc::new(StaticIdentityDirectory::new());
    let payments = Arc::new(RecordingPaymentProvider::new());
    let exchange = Arc::new(DataExchange::new(
        Arc::new(InMemoryAccountStore::new()),
        Arc::new(InMemoryQueryLedger::new()),
        Arc::new(InMemoryConsumerRegistry::new()),
        directory.clone(),
        payments.clone(),
        Arc::new(InMemoryDisbursementLog::new()),
        ExchangeOptions::default(),
    ));
    Fixture {
        exchange,
        directory,
        payments,
    }
}

fn attrs(pairs: &[(&str, AttributeValue)]) -> AttributeMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

async fn register(fx: &Fixture, account_id: &str, attributes: AttributeMap) -> AuthSignature {
    let (assertion, public_key) = signed_assertion(account_id, 100);
    fx.directory.authorize(account_id, &public_key).await;
    fx.exchange
        .register_producer(&assertion, account_id, attributes)
        .await
        .unwrap();
    assertion
}

async fn consumer(fx: &Fixture) -> (String, AuthSignature) {
    let record = fx
        .exchange
        .register_consumer("acme", "contract-1", "deadbeef")
        .await
        .unwrap();
    let (assertion, public_key) = signed_assertion("consumer-acct", 7);
    fx.directory.authorize("consumer-acct", &public_key).await;
    (record.organization_id, assertion)
}

/// Two producers, one shared attribute: {age:30, gender:true} + {age:30}
/// aggregates to {"age:30": 2, "gender:true": 1}.
#[tokio::test]
async fn two_producer_aggregate_scenario() {
    let fx = fixture();
    register(
        &fx,
        "producer-a",
        attrs(&[
            ("age", AttributeValue::Int(30)),
            ("gender", AttributeValue::Flag(true)),
        ]),
    )
    .await;
    register(&fx, "producer-b", attrs(&[("age", AttributeValue::Int(30))])).await;

    let (org, consumer_sig) = consumer(&fx).await;
    let query = fx
        .exchange
        .create_query(&consumer_sig, &org, Vec::new())
        .await
        .unwrap();

    let outcome = fx
        .exchange
        .view_results(&consumer_sig, &org, &query.query_id)
        .await
        .unwrap();

    assert_eq!(outcome.counts.len(), 2);
    assert_eq!(outcome.counts.get("age:30"), Some(&2));
    assert_eq!(outcome.counts.get("gender:true"), Some(&1));
}

/// N concurrent reporters through the public surface lose no events.
#[tokio::test]
async fn concurrent_event_reports_lose_nothing() {
    let fx = fixture();
    let assertion = register(&fx, "producer-a", AttributeMap::new()).await;

    let mut handles = Vec::new();
    for i in 0..10 {
        let exchange = fx.exchange.clone();
        let assertion = assertion.clone();
        handles.push(tokio::spawn(async move {
            for j in 0..20 {
                exchange
                    .report_events(
                        &assertion,
                        "producer-a",
                        vec![NewEvent {
                            event_type: format!("evt-{}-{}", i, j),
                            data: serde_json::Value::Null,
                        }],
                    )
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let events = fx
        .exchange
        .get_producer_events(&assertion, "producer-a")
        .await
        .unwrap();
    assert_eq!(events.len(), 10 * 20);
}

/// Two simultaneous views of the same query: both get the same aggregate,
/// each snapshot account is paid exactly once.
#[tokio::test]
async fn concurrent_views_settle_exactly_once() {
    let fx = fixture();
    register(&fx, "producer-a", attrs(&[("age", AttributeValue::Int(30))])).await;
    register(&fx, "producer-b", attrs(&[("age", AttributeValue::Int(30))])).await;

    let (org, consumer_sig) = consumer(&fx).await;
    let query = fx
        .exchange
        .create_query(&consumer_sig, &org, Vec::new())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..6 {
        let exchange = fx.exchange.clone();
        let consumer_sig = consumer_sig.clone();
        let org = org.clone();
        let query_id = query.query_id.clone();
        handles.push(tokio::spawn(async move {
            exchange
                .view_results(&consumer_sig, &org, &query_id)
                .await
                .unwrap()
        }));
    }

    let mut outcomes = Vec::new();
    for handle in handles {
        outcomes.push(handle.await.unwrap());
    }

    let transitions = outcomes.iter().filter(|o| o.settled_now).count();
    assert_eq!(transitions, 1);
    for outcome in &outcomes {
        assert_eq!(outcome.counts, outcomes[0].counts);
    }
    assert_eq!(fx.payments.transfer_count("producer-a").await, 1);
    assert_eq!(fx.payments.transfer_count("producer-b").await, 1);
}

/// A settled query viewed again returns the same aggregate and moves no
/// further funds.
#[tokio::test]
async fn second_view_is_read_only() {
    let fx = fixture();
    register(&fx, "producer-a", attrs(&[("age", AttributeValue::Int(30))])).await;

    let (org, consumer_sig) = consumer(&fx).await;
    let query = fx
        .exchange
        .create_query(&consumer_sig, &org, Vec::new())
        .await
        .unwrap();

    let first = fx
        .exchange
        .view_results(&consumer_sig, &org, &query.query_id)
        .await
        .unwrap();
    let second = fx
        .exchange
        .view_results(&consumer_sig, &org, &query.query_id)
        .await
        .unwrap();

    assert!(first.settled_now);
    assert!(!second.settled_now);
    assert_eq!(first.counts, second.counts);
    assert_eq!(fx.payments.transfers().await.len(), 1);
}
