//! Integration tests for the asset event pipeline
//!
//! Producer -> in-memory durable queue -> connection manager -> aggregate ->
//! query surface, exercised through the public API only.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::Request;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower::util::ServiceExt;

use asset_events::api::{collector_router, CollectorState};
use asset_events::{
    Aggregator, AssetEvent, BackoffPolicy, ConnectionManager, ConnectionState, ConsumerSettings,
    EventPublisher, EventQuery, InMemoryBroker,
};

const QUEUE: &str = "asset_events";

struct Pipeline {
    broker: InMemoryBroker,
    publisher: EventPublisher,
    query: EventQuery,
    status: watch::Receiver<ConnectionState>,
    shutdown: watch::Sender<bool>,
    consumer: JoinHandle<()>,
}

impl Pipeline {
    fn start(capacity: usize) -> Self {
        let broker = InMemoryBroker::new();
        let aggregator = Aggregator::new(capacity);
        let query = aggregator.query();

        let settings = ConsumerSettings {
            queue: QUEUE.to_string(),
            prefetch: 10,
            consumer_tag: "pipeline-test".to_string(),
            dead_letter_queue: None,
        };
        let backoff = BackoffPolicy {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(50),
            multiplier: 2.0,
        };
        let manager = ConnectionManager::new(Arc::new(broker.clone()), settings, backoff, aggregator);
        let status = manager.status();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let consumer = tokio::spawn(manager.run(shutdown_rx));

        Pipeline {
            publisher: EventPublisher::new(Arc::new(broker.clone()), QUEUE),
            broker,
            query,
            status,
            shutdown,
            consumer,
        }
    }

    async fn publish(&self, asset_id: &str, event_type: &str) {
        let event = AssetEvent::new(asset_id, event_type, json!({"source": "test"}), "node-1");
        self.publisher.publish(&event).await.unwrap();
    }

    async fn wait_for_total(&self, total: u64) {
        wait_until(&format!("{} events", total), || {
            self.query.current_stats().total_events_processed == total
        })
        .await;
    }

    async fn stop(self) -> ConnectionState {
        self.shutdown.send(true).unwrap();
        self.consumer.await.unwrap();
        let state = *self.status.borrow();
        state
    }
}

async fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(tokio::time::Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

fn kinds(query: &EventQuery, limit: i64) -> Vec<(String, String)> {
    query
        .recent_events(limit)
        .iter()
        .map(|e| (e.asset_id.clone(), e.event_type.clone()))
        .collect()
}

#[tokio::test]
async fn test_login_logout_scenario_end_to_end() {
    let pipeline = Pipeline::start(1000);

    pipeline.publish("A", "login").await;
    pipeline.publish("B", "login").await;
    pipeline.publish("A", "logout").await;
    pipeline.wait_for_total(3).await;

    assert_eq!(
        kinds(&pipeline.query, 10),
        vec![
            ("A".to_string(), "login".to_string()),
            ("B".to_string(), "login".to_string()),
            ("A".to_string(), "logout".to_string()),
        ]
    );
    let stats = pipeline.query.current_stats();
    assert_eq!(stats.total_events_processed, 3);
    assert_eq!(stats.count_for("login"), 2);
    assert_eq!(stats.count_for("logout"), 1);
    assert!(stats.last_processed.is_some());

    assert_eq!(pipeline.stop().await, ConnectionState::Closed);
}

#[tokio::test]
async fn test_retention_keeps_last_n_in_arrival_order() {
    let pipeline = Pipeline::start(2);

    pipeline.publish("e1", "tick").await;
    pipeline.publish("e2", "tick").await;
    pipeline.publish("e3", "tick").await;
    pipeline.wait_for_total(3).await;

    let retained: Vec<String> = pipeline
        .query
        .recent_events(10)
        .iter()
        .map(|e| e.asset_id.clone())
        .collect();
    assert_eq!(retained, vec!["e2", "e3"]);
    assert_eq!(pipeline.query.current_stats().total_events_processed, 3);

    pipeline.stop().await;
}

#[tokio::test]
async fn test_malformed_messages_do_not_disturb_aggregate() {
    let pipeline = Pipeline::start(100);

    pipeline.publish("A", "login").await;
    pipeline.broker.publish_raw(QUEUE, "definitely not json");
    pipeline.broker.publish_raw(
        QUEUE,
        json!({"asset_id": "", "event_type": "login", "timestamp": "2024-01-01T00:00:00Z",
               "data": {}, "node_id": "n"})
        .to_string(),
    );
    pipeline.publish("B", "logout").await;

    pipeline.wait_for_total(2).await;
    wait_until("queue drained", || {
        pipeline.broker.depth(QUEUE) == 0 && pipeline.broker.unacked_count(QUEUE) == 0
    })
    .await;

    let stats = pipeline.query.current_stats();
    assert!(stats.is_consistent());
    assert_eq!(pipeline.query.rejected_messages(), 2);
    assert_eq!(pipeline.query.retained(), 2);

    pipeline.stop().await;
}

#[tokio::test]
async fn test_duplicate_delivery_counts_twice() {
    let pipeline = Pipeline::start(100);
    let body = AssetEvent::new("A", "login", json!({}), "node-1")
        .to_wire()
        .unwrap();

    pipeline.broker.publish_raw(QUEUE, body.clone());
    pipeline.broker.publish_raw(QUEUE, body);
    pipeline.wait_for_total(2).await;

    assert_eq!(pipeline.query.current_stats().count_for("login"), 2);
    assert_eq!(pipeline.query.retained(), 2);

    pipeline.stop().await;
}

#[tokio::test]
async fn test_consumer_survives_broker_outage() {
    let pipeline = Pipeline::start(100);
    wait_until("connected", || pipeline.status.borrow().is_connected()).await;

    pipeline.publish("A", "before").await;
    pipeline.wait_for_total(1).await;

    // Producers fail fast while the broker is down; the consumer keeps retrying
    pipeline.broker.set_reachable(false);
    pipeline.broker.drop_connections();
    let event = AssetEvent::new("A", "during", json!({}), "node-1");
    assert!(pipeline.publisher.publish(&event).await.is_err());
    wait_until("reconnecting", || !pipeline.status.borrow().is_connected()).await;

    pipeline.broker.set_reachable(true);
    pipeline.publish("A", "after").await;
    pipeline.wait_for_total(2).await;
    assert!(pipeline.status.borrow().is_connected());

    let mut acked = pipeline.broker.acked_ids();
    let total = acked.len();
    acked.sort_unstable();
    acked.dedup();
    assert_eq!(acked.len(), total, "a message was acknowledged twice");
    assert_eq!(pipeline.query.current_stats().count_for("during"), 0);

    pipeline.stop().await;
}

#[tokio::test]
async fn test_queries_answer_while_disconnected() {
    let pipeline = Pipeline::start(100);
    pipeline.publish("A", "login").await;
    pipeline.wait_for_total(1).await;

    pipeline.broker.set_reachable(false);
    pipeline.broker.drop_connections();
    wait_until("disconnected", || !pipeline.status.borrow().is_connected()).await;

    assert_eq!(pipeline.query.recent_events(5).len(), 1);
    assert_eq!(pipeline.query.current_stats().total_events_processed, 1);

    pipeline.stop().await;
}

#[tokio::test]
async fn test_collector_http_over_live_pipeline() {
    let pipeline = Pipeline::start(100);
    pipeline.publish("A", "login").await;
    pipeline.publish("B", "login").await;
    pipeline.wait_for_total(2).await;
    wait_until("connected", || pipeline.status.borrow().is_connected()).await;

    let app = collector_router(Arc::new(CollectorState::new(
        pipeline.query.clone(),
        pipeline.status.clone(),
    )));

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/events?limit=1").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let events: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(events.as_array().unwrap().len(), 1);
    assert_eq!(events[0]["asset_id"], "B");

    let response = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let health: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(health["status"], "healthy");

    pipeline.stop().await;
}
