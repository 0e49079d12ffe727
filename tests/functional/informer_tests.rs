//! Informer state machine: list seeding, watch handling, relist on expired
//! versions, periodic resync and shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use jenkins_sync_operator::client::{ApiError, ListOptions, Store, WatchEvent};
use jenkins_sync_operator::crd::{PipelineConfig, ReconcileKey};
use jenkins_sync_operator::informer::{Informer, InformerPhase, ResourceEvent};

use crate::fixtures::*;

type Event = ResourceEvent<PipelineConfig>;

struct Running {
    api: Arc<FakeApi>,
    store: Arc<Store<PipelineConfig>>,
    informer: Arc<Informer<PipelineConfig>>,
    events: mpsc::UnboundedReceiver<Event>,
    shutdown: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
}

fn start(api: Arc<FakeApi>, resync: Option<Duration>) -> Running {
    let store = Arc::new(Store::new());
    let (events_tx, events) = mpsc::unbounded_channel();
    let informer = Arc::new(Informer::new(
        api.clone() as Arc<dyn jenkins_sync_operator::client::ResourceApi<PipelineConfig>>,
        Arc::clone(&store),
        ListOptions::default(),
        resync,
        events_tx,
    ));
    let (shutdown, shutdown_rx) = watch::channel(false);
    let handle = {
        let informer = Arc::clone(&informer);
        tokio::spawn(async move { informer.run(shutdown_rx).await })
    };
    Running {
        api,
        store,
        informer,
        events,
        shutdown,
        handle,
    }
}

async fn next_event(running: &mut Running) -> Event {
    tokio::time::timeout(Duration::from_secs(5), running.events.recv())
        .await
        .expect("timed out waiting for informer event")
        .expect("informer event channel closed")
}

async fn stop(running: Running) -> Arc<Informer<PipelineConfig>> {
    let _ = running.shutdown.send(true);
    running.handle.await.unwrap();
    running.informer
}

fn versioned(namespace: &str, name: &str, version: &str) -> PipelineConfig {
    let mut pc = pipeline_config(namespace, name);
    pc.metadata.resource_version = Some(version.to_string());
    pc
}

#[tokio::test]
async fn test_initial_list_seeds_store_and_emits_adds() {
    let api = Arc::new(FakeApi::new());
    api.push_list(
        vec![versioned("team-a", "build", "1"), versioned("team-a", "deploy", "2")],
        "10",
    );
    api.push_watch(FakeWatch::EventsThenOpen(vec![]));

    let mut running = start(api, None);

    let first = next_event(&mut running).await;
    let second = next_event(&mut running).await;
    assert_eq!(first.op(), "add");
    assert_eq!(second.op(), "add");

    assert_eq!(running.store.len(), 2);
    assert!(running
        .store
        .get(&ReconcileKey::new("team-a", "build"))
        .is_some());

    let informer = stop(running).await;
    assert_eq!(informer.phase(), InformerPhase::Stopped);
}

#[tokio::test]
async fn test_watch_modification_updates_store_before_notifying() {
    let api = Arc::new(FakeApi::new());
    api.push_list(vec![versioned("team-a", "build", "1")], "10");
    api.push_watch(FakeWatch::EventsThenOpen(vec![Ok(WatchEvent::Modified(
        versioned("team-a", "build", "11"),
    ))]));

    let mut running = start(api, None);

    let added = next_event(&mut running).await;
    assert_eq!(added.op(), "add");

    let updated = next_event(&mut running).await;
    assert_eq!(updated.op(), "update");

    // The index already holds the new version when the event is observed.
    let stored = running
        .store
        .get(&ReconcileKey::new("team-a", "build"))
        .unwrap();
    assert_eq!(stored.metadata.resource_version.as_deref(), Some("11"));

    stop(running).await;
}

#[tokio::test]
async fn test_watch_delete_removes_from_store() {
    let api = Arc::new(FakeApi::new());
    api.push_list(vec![versioned("team-a", "build", "1")], "10");
    api.push_watch(FakeWatch::EventsThenOpen(vec![Ok(WatchEvent::Deleted(
        versioned("team-a", "build", "12"),
    ))]));

    let mut running = start(api, None);

    assert_eq!(next_event(&mut running).await.op(), "add");
    let deleted = next_event(&mut running).await;
    assert_eq!(deleted.op(), "delete");

    assert!(running
        .store
        .get(&ReconcileKey::new("team-a", "build"))
        .is_none());

    stop(running).await;
}

#[tokio::test]
async fn test_expired_watch_relists_and_heals_missed_delete() {
    let api = Arc::new(FakeApi::new());
    api.push_list(
        vec![versioned("team-a", "build", "1"), versioned("team-a", "stale", "2")],
        "10",
    );
    // The watch immediately reports the version as too old...
    api.push_watch(FakeWatch::Events(vec![Err(ApiError::Expired(
        "too old".to_string(),
    ))]));
    // ...and the fresh list no longer contains "stale".
    api.push_list(vec![versioned("team-a", "build", "3")], "20");
    api.push_watch(FakeWatch::EventsThenOpen(vec![]));

    let mut running = start(api, None);

    let mut deletes = 0;
    for _ in 0..4 {
        let event = next_event(&mut running).await;
        if event.op() == "delete" {
            deletes += 1;
            assert_eq!(
                ReconcileKey::from(event.object().as_ref()),
                ReconcileKey::new("team-a", "stale")
            );
        }
    }

    assert_eq!(deletes, 1);
    assert_eq!(running.store.len(), 1);
    assert_eq!(running.api.list_calls(), 2);

    stop(running).await;
}

#[tokio::test]
async fn test_closed_watch_stream_reconnects() {
    let api = Arc::new(FakeApi::new());
    api.push_list(vec![versioned("team-a", "build", "1")], "10");
    // First watch session ends cleanly; the informer re-opens a new one.
    api.push_watch(FakeWatch::Events(vec![]));
    api.push_watch(FakeWatch::EventsThenOpen(vec![Ok(WatchEvent::Modified(
        versioned("team-a", "build", "11"),
    ))]));

    let mut running = start(api, None);

    assert_eq!(next_event(&mut running).await.op(), "add");
    assert_eq!(next_event(&mut running).await.op(), "update");

    stop(running).await;
}

#[tokio::test]
async fn test_periodic_resync_redelivers_known_objects() {
    let api = Arc::new(FakeApi::new());
    api.push_list(vec![versioned("team-a", "build", "1")], "10");
    api.push_watch(FakeWatch::EventsThenOpen(vec![]));

    let mut running = start(api, Some(Duration::from_millis(50)));

    assert_eq!(next_event(&mut running).await.op(), "add");

    // No watch activity at all, yet the object comes around again.
    let resynced = next_event(&mut running).await;
    assert_eq!(resynced.op(), "update");
    assert_eq!(
        ReconcileKey::from(resynced.object().as_ref()),
        ReconcileKey::new("team-a", "build")
    );

    stop(running).await;
}

#[tokio::test]
async fn test_transient_watch_failure_retries_from_same_version() {
    let api = Arc::new(FakeApi::new());
    api.push_list(vec![versioned("team-a", "build", "1")], "10");
    api.push_watch(FakeWatch::Fail(ApiError::Transport(
        "connection refused".to_string(),
    )));
    api.push_watch(FakeWatch::EventsThenOpen(vec![Ok(WatchEvent::Modified(
        versioned("team-a", "build", "11"),
    ))]));

    let mut running = start(api, None);

    assert_eq!(next_event(&mut running).await.op(), "add");
    // The retry opened the second session; only one list was needed.
    assert_eq!(next_event(&mut running).await.op(), "update");
    assert_eq!(running.api.list_calls(), 1);

    stop(running).await;
}
