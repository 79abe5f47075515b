//! Integration tests for zenoh-bridge-assets.
//!
//! Drives the poll/publish cycle and the runner against in-memory bus and
//! source doubles, with a paused clock for deterministic tick timing.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use tracksight_common::{AssetRecord, AssetSnapshot, Format};
use zenoh_bridge_assets::bus::{
    BusConnection, ConnectError, ConnectionStatus, OutboundMessage, PublishError, StatusHandler,
    StatusReason, StatusTracker, PROP_ASSET_NAME, PROP_ASSET_UID,
};
use zenoh_bridge_assets::config::RunConfig;
use zenoh_bridge_assets::poller::AssetPoller;
use zenoh_bridge_assets::runner::BridgeRunner;
use zenoh_bridge_assets::source::{AssetSource, FetchError};
use zenoh_bridge_assets::status::BridgeStatus;

/// Bus double recording published messages. Publish calls listed in
/// `fail_on` (0-based call index) fail with a transport error.
#[derive(Default)]
struct MockBus {
    tracker: StatusTracker,
    published: Mutex<Vec<OutboundMessage>>,
    statuses: Mutex<Vec<String>>,
    fail_on: HashSet<usize>,
    calls: AtomicUsize,
    closed: AtomicBool,
}

impl MockBus {
    fn failing_on(indices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            fail_on: indices.into_iter().collect(),
            ..Self::default()
        }
    }

    fn published(&self) -> Vec<OutboundMessage> {
        self.published.lock().unwrap().clone()
    }
}

impl BusConnection for MockBus {
    fn on_status_change(&self, handler: StatusHandler) {
        self.tracker.set_handler(handler);
        self.tracker
            .report(ConnectionStatus::Connected, StatusReason::ConnectionOk);
    }

    async fn publish(&self, message: &OutboundMessage) -> Result<(), PublishError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on.contains(&call) {
            return Err(PublishError::Transport {
                key: "test/assetoutput".to_string(),
                message: "transport failure".to_string(),
            });
        }

        self.published.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn publish_status(&self, status: &BridgeStatus) -> Result<(), PublishError> {
        self.statuses.lock().unwrap().push(status.status.clone());
        Ok(())
    }

    async fn close(&self) -> Result<(), ConnectError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

enum FetchPlan {
    Snapshot(AssetSnapshot),
    Fail,
}

/// Source double replaying a scripted sequence of fetch outcomes; once the
/// script is exhausted it keeps returning empty snapshots.
#[derive(Clone, Default)]
struct MockSource {
    inner: Arc<SourceInner>,
}

#[derive(Default)]
struct SourceInner {
    plan: Mutex<VecDeque<FetchPlan>>,
    fetches: AtomicUsize,
}

impl MockSource {
    fn scripted(plan: impl IntoIterator<Item = FetchPlan>) -> Self {
        Self {
            inner: Arc::new(SourceInner {
                plan: Mutex::new(plan.into_iter().collect()),
                fetches: AtomicUsize::new(0),
            }),
        }
    }

    fn fetches(&self) -> usize {
        self.inner.fetches.load(Ordering::SeqCst)
    }
}

impl AssetSource for MockSource {
    async fn fetch(
        &self,
        _credential: Uuid,
        _location_id: i64,
    ) -> Result<AssetSnapshot, FetchError> {
        self.inner.fetches.fetch_add(1, Ordering::SeqCst);

        match self.inner.plan.lock().unwrap().pop_front() {
            Some(FetchPlan::Snapshot(snapshot)) => Ok(snapshot),
            Some(FetchPlan::Fail) => Err(FetchError::Status {
                status: reqwest::StatusCode::BAD_GATEWAY,
                body: "upstream down".to_string(),
            }),
            None => Ok(Vec::new()),
        }
    }
}

fn run_config(interval_secs: u64) -> RunConfig {
    RunConfig {
        credential: Uuid::nil(),
        location_id: 0,
        poll_interval: Duration::from_secs(interval_secs),
    }
}

fn snapshot(count: usize) -> AssetSnapshot {
    (1..=count)
        .map(|i| AssetRecord::new(format!("A{}", i), format!("Asset {}", i)))
        .collect()
}

fn uid_of(message: &OutboundMessage) -> String {
    message.properties.get(PROP_ASSET_UID).unwrap().clone()
}

/// One failed publish must not block or drop the rest of the snapshot.
#[tokio::test(start_paused = true)]
async fn publish_failure_is_isolated_per_message() {
    let bus = Arc::new(MockBus::failing_on([2])); // third record of five
    let source = MockSource::scripted([FetchPlan::Snapshot(snapshot(5))]);
    let token = CancellationToken::new();

    let poller = AssetPoller::new(source.clone(), bus.clone(), run_config(60), Format::Json);
    let handle = tokio::spawn(poller.run(token.clone()));

    tokio::time::sleep(Duration::from_millis(10)).await;
    token.cancel();
    handle.await.unwrap();

    let uids: Vec<String> = bus.published().iter().map(uid_of).collect();
    assert_eq!(uids, vec!["A1", "A2", "A4", "A5"]);
}

/// A fetch failure produces zero publishes for that tick and the loop keeps
/// going; the following tick performs a fresh fetch.
#[tokio::test(start_paused = true)]
async fn fetch_failure_skips_one_tick() {
    let bus = Arc::new(MockBus::default());
    let source = MockSource::scripted([FetchPlan::Fail, FetchPlan::Snapshot(snapshot(1))]);
    let token = CancellationToken::new();

    let poller = AssetPoller::new(source.clone(), bus.clone(), run_config(5), Format::Json);
    let handle = tokio::spawn(poller.run(token.clone()));

    // First tick: fetch fails, nothing published
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(source.fetches(), 1);
    assert!(bus.published().is_empty());

    // Second tick: fresh fetch succeeds
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(source.fetches(), 2);
    assert_eq!(bus.published().len(), 1);

    token.cancel();
    handle.await.unwrap();
}

/// Cancellation during the inter-tick wait exits the loop before the next
/// fetch.
#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_the_wait() {
    let bus = Arc::new(MockBus::default());
    let source = MockSource::scripted([FetchPlan::Snapshot(snapshot(2))]);
    let token = CancellationToken::new();

    let poller = AssetPoller::new(source.clone(), bus.clone(), run_config(3600), Format::Json);
    let handle = tokio::spawn(poller.run(token.clone()));

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(source.fetches(), 1);

    // Well inside the hour-long wait
    token.cancel();
    handle.await.unwrap();

    assert_eq!(source.fetches(), 1);
    assert_eq!(bus.published().len(), 2);
}

/// A terminal status reason triggers one orderly shutdown, even when the
/// transport reports terminal transitions more than once.
#[tokio::test(start_paused = true)]
async fn terminal_status_triggers_orderly_shutdown() {
    let bus = Arc::new(MockBus::default());
    let source = MockSource::scripted([FetchPlan::Snapshot(snapshot(1))]);

    let mut runner = BridgeRunner::new(bus.clone());
    let token = runner.token();
    runner.wire_status_handler();
    runner.start(AssetPoller::new(
        source.clone(),
        bus.clone(),
        run_config(60),
        Format::Json,
    ));
    let handle = tokio::spawn(runner.run());

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!token.is_cancelled());

    bus.tracker
        .report(ConnectionStatus::Retrying, StatusReason::RetryExpired);
    bus.tracker
        .report(ConnectionStatus::Disconnected, StatusReason::RetryExpired);

    handle.await.unwrap();

    assert!(token.is_cancelled());
    assert!(bus.closed.load(Ordering::SeqCst));
    assert_eq!(
        *bus.statuses.lock().unwrap(),
        vec!["running".to_string(), "offline".to_string()]
    );
}

/// Non-terminal transitions never shut the bridge down.
#[tokio::test(start_paused = true)]
async fn non_terminal_status_is_logged_only() {
    let bus = Arc::new(MockBus::default());

    let runner = BridgeRunner::new(bus.clone());
    let token = runner.token();
    runner.wire_status_handler();

    bus.tracker.report(
        ConnectionStatus::Disconnected,
        StatusReason::CommunicationError,
    );
    bus.tracker
        .report(ConnectionStatus::Retrying, StatusReason::NoNetwork);

    assert!(!token.is_cancelled());
}

/// A published record carries its fields in the JSON body and its identity
/// in the routing properties.
#[tokio::test(start_paused = true)]
async fn published_message_carries_body_and_routing_metadata() {
    let record = AssetRecord::new("A1", "Forklift")
        .with_field("x", 1)
        .with_field("y", 2);

    let bus = Arc::new(MockBus::default());
    let source = MockSource::scripted([FetchPlan::Snapshot(vec![record])]);
    let token = CancellationToken::new();

    let poller = AssetPoller::new(source, bus.clone(), run_config(60), Format::Json);
    let handle = tokio::spawn(poller.run(token.clone()));

    tokio::time::sleep(Duration::from_millis(10)).await;
    token.cancel();
    handle.await.unwrap();

    let published = bus.published();
    assert_eq!(published.len(), 1);

    let message = &published[0];
    assert_eq!(message.content_type, "application/json");
    assert_eq!(message.content_encoding, Some("UTF-8"));
    assert_eq!(message.properties.get(PROP_ASSET_UID).unwrap(), "A1");
    assert_eq!(message.properties.get(PROP_ASSET_NAME).unwrap(), "Forklift");

    let body: serde_json::Value = serde_json::from_slice(&message.body).unwrap();
    assert_eq!(body["uid"], "A1");
    assert_eq!(body["name"], "Forklift");
    assert_eq!(body["x"], 1);
    assert_eq!(body["y"], 2);
}

/// With a 1-second interval, a 2-second run performs exactly two ticks.
#[tokio::test(start_paused = true)]
async fn two_ticks_over_a_two_second_run() {
    let bus = Arc::new(MockBus::default());
    let source = MockSource::scripted([
        FetchPlan::Snapshot(snapshot(1)),
        FetchPlan::Snapshot(snapshot(1)),
    ]);
    let token = CancellationToken::new();

    let poller = AssetPoller::new(source.clone(), bus.clone(), run_config(1), Format::Json);
    let handle = tokio::spawn(poller.run(token.clone()));

    tokio::time::sleep(Duration::from_millis(1950)).await;
    token.cancel();
    handle.await.unwrap();

    assert_eq!(source.fetches(), 2);
    assert_eq!(bus.published().len(), 2);
}
